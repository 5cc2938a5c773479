//! Change events delivered by the watch service.

use std::fmt;
use std::path::{Path, PathBuf};

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A file or directory appeared inside a watched directory.
    Create,
    /// Contents or metadata of an entry changed.
    Modify,
    /// An entry disappeared from a watched directory.
    Delete,
    /// A watched directory vanished (removed, unmounted, share dropped).
    Dropped,
    /// A dropped directory exists again and is watched again.
    Restored,
    /// A directory was explicitly unregistered.
    Unregistered,
    /// The service shut down. Always the last event delivered.
    Closed,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Modify => "modify",
            ChangeKind::Delete => "delete",
            ChangeKind::Dropped => "dropped",
            ChangeKind::Restored => "restored",
            ChangeKind::Unregistered => "unregistered",
            ChangeKind::Closed => "closed",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single change. `path` is `None` only for [`ChangeKind::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: Option<PathBuf>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: Some(path.into()),
        }
    }

    pub fn closed() -> Self {
        Self {
            kind: ChangeKind::Closed,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} {}", self.kind, path.display()),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// All events produced by one poll cycle, in detection order.
///
/// Immutable once built; listeners receive it by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self { events }
    }

    pub fn single(event: ChangeEvent) -> Self {
        Self {
            events: vec![event],
        }
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True if any event of `kind` targets `path`.
    pub fn contains(&self, kind: ChangeKind, path: &Path) -> bool {
        self.events
            .iter()
            .any(|e| e.kind == kind && e.path() == Some(path))
    }
}

impl<'a> IntoIterator for &'a ChangeBatch {
    type Item = &'a ChangeEvent;
    type IntoIter = std::slice::Iter<'a, ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_contains() {
        let batch = ChangeBatch::new(vec![
            ChangeEvent::new(ChangeKind::Create, "/figs/a.fyp"),
            ChangeEvent::new(ChangeKind::Dropped, "/figs"),
        ]);

        assert_eq!(batch.len(), 2);
        assert!(batch.contains(ChangeKind::Dropped, Path::new("/figs")));
        assert!(!batch.contains(ChangeKind::Delete, Path::new("/figs/a.fyp")));
    }

    #[test]
    fn test_closed_event_has_no_path() {
        let event = ChangeEvent::closed();
        assert_eq!(event.kind, ChangeKind::Closed);
        assert!(event.path().is_none());
        assert_eq!(event.to_string(), "closed");
    }
}
