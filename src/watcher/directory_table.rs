//! WATCHED / DROPPED bookkeeping for registered directories.
//!
//! The table only records state. Talking to the OS facility is the service's
//! job; the table tells it which transitions to make.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Registration state of a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    /// Registered with the OS notification facility.
    Watched,
    /// Known but currently missing; probed every cycle.
    Dropped,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    state: DirectoryState,
    /// When the current state was entered.
    since: Instant,
}

/// Registered directories keyed by absolute path.
#[derive(Debug, Default)]
pub struct DirectoryTable {
    entries: HashMap<PathBuf, Registration>,
}

impl DirectoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, path: &Path) -> Option<DirectoryState> {
        self.entries.get(path).map(|r| r.state)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Record `path` in `state`, returning the previous state.
    pub fn set(&mut self, path: PathBuf, state: DirectoryState) -> Option<DirectoryState> {
        let previous = self.entries.insert(
            path,
            Registration {
                state,
                since: Instant::now(),
            },
        );
        previous.map(|r| r.state)
    }

    pub fn remove(&mut self, path: &Path) -> Option<DirectoryState> {
        self.entries.remove(path).map(|r| r.state)
    }

    /// Time spent in the current state.
    pub fn state_age(&self, path: &Path) -> Option<std::time::Duration> {
        self.entries.get(path).map(|r| r.since.elapsed())
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        self.with_state(DirectoryState::Watched)
    }

    pub fn dropped(&self) -> Vec<PathBuf> {
        self.with_state(DirectoryState::Dropped)
    }

    fn with_state(&self, state: DirectoryState) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut table = DirectoryTable::new();
        let dir = PathBuf::from("/figs");

        assert_eq!(table.set(dir.clone(), DirectoryState::Dropped), None);
        assert_eq!(table.dropped(), vec![dir.clone()]);
        assert!(table.watched().is_empty());

        assert_eq!(
            table.set(dir.clone(), DirectoryState::Watched),
            Some(DirectoryState::Dropped)
        );
        assert_eq!(table.state(&dir), Some(DirectoryState::Watched));
        assert!(table.state_age(&dir).is_some());

        assert_eq!(table.remove(&dir), Some(DirectoryState::Watched));
        assert!(!table.contains(&dir));
        assert!(table.is_empty());
    }

    #[test]
    fn test_listing_is_sorted() {
        let mut table = DirectoryTable::new();
        table.set(PathBuf::from("/b"), DirectoryState::Watched);
        table.set(PathBuf::from("/a"), DirectoryState::Watched);
        table.set(PathBuf::from("/c"), DirectoryState::Dropped);

        assert_eq!(
            table.watched(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert_eq!(table.len(), 3);
    }
}
