//! Bounded most-recently-used list.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// Recency-ordered paths, most recent first, never longer than `capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MruList {
    entries: VecDeque<PathBuf>,
    capacity: usize,
}

impl MruList {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Move `path` to the front, inserting it if absent.
    ///
    /// Returns the entry evicted from the tail, if any.
    pub fn touch(&mut self, path: &Path) -> Option<PathBuf> {
        if let Some(pos) = self.position(path) {
            if let Some(existing) = self.entries.remove(pos) {
                self.entries.push_front(existing);
            }
            return None;
        }

        self.entries.push_front(path.to_path_buf());
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    /// Append at the tail (least recent) if there is room and the path is not
    /// already present. Used when reloading a persisted list in order.
    pub fn push_back(&mut self, path: PathBuf) -> bool {
        if self.entries.len() >= self.capacity || self.contains(&path) {
            return false;
        }
        self.entries.push_back(path);
        true
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        match self.position(path) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Swap `old` for `new` keeping its position. Any other occurrence of
    /// `new` is dropped so the list stays free of duplicates.
    pub fn replace(&mut self, old: &Path, new: &Path) -> bool {
        let Some(pos) = self.position(old) else {
            return false;
        };
        self.entries[pos] = new.to_path_buf();
        let mut index = 0;
        self.entries.retain(|p| {
            let keep = index == pos || p != new;
            index += 1;
            keep
        });
        true
    }

    pub fn retain(&mut self, keep: impl FnMut(&PathBuf) -> bool) {
        self.entries.retain(keep);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.position(path).is_some()
    }

    pub fn first(&self) -> Option<&Path> {
        self.entries.front().map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|p| p == path)
    }
}
