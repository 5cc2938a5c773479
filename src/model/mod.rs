//! Render model cache.
//!
//! Keeps the last few in-memory models built from files (or from a named
//! sub-entry of a file) so they need not be re-parsed. An entry is only ever
//! returned while its source file's modification time matches the one
//! captured when it was stored; anything else is evicted on access.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

/// Entries kept by default.
pub const DEFAULT_MODEL_CAPACITY: usize = 10;

/// Identifies a cached model: source file plus optional sub-entry id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub path: PathBuf,
    pub sub_id: Option<String>,
}

impl ModelKey {
    pub fn new(path: impl Into<PathBuf>, sub_id: Option<&str>) -> Self {
        Self {
            path: path.into(),
            sub_id: sub_id.map(str::to_string),
        }
    }

    fn matches(&self, path: &Path, sub_id: Option<&str>) -> bool {
        self.path == path && self.sub_id.as_deref() == sub_id
    }
}

struct ModelEntry<V> {
    key: ModelKey,
    modified: SystemTime,
    value: V,
}

/// Bounded LRU of built models, validated against file modification time.
///
/// Values go in by value and come out as clones, so neither side can
/// observe the other's later mutations.
pub struct ModelCache<V> {
    /// Most recently used first.
    entries: Mutex<VecDeque<ModelEntry<V>>>,
    capacity: usize,
}

impl<V: Clone> ModelCache<V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MODEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Store `value` for `(path, sub_id)` at the front, replacing an existing
    /// entry or evicting the least recently used one when full.
    ///
    /// Nothing is stored if the file's modification time cannot be read.
    pub fn put(&self, path: &Path, sub_id: Option<&str>, value: V) {
        let Some(modified) = modified_time(path) else {
            crate::debug_event!("model-cache", "not cached (no mtime)", "{}", path.display());
            return;
        };
        self.put_as_of(path, sub_id, value, modified);
    }

    /// Like [`put`](Self::put), but validated against `modified`, the
    /// modification time read before `value` was built from the file.
    ///
    /// If the file changed in between, the first [`get`](Self::get) finds the
    /// entry stale.
    pub fn put_as_of(&self, path: &Path, sub_id: Option<&str>, value: V, modified: SystemTime) {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|e| e.key.matches(path, sub_id)) {
            entries.remove(pos);
        } else if entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_back() {
                crate::debug_event!("model-cache", "evicted", "{}", evicted.key.path.display());
            }
        }
        entries.push_front(ModelEntry {
            key: ModelKey::new(path, sub_id),
            modified,
            value,
        });
    }

    /// A copy of the cached value, if present and still fresh.
    ///
    /// A stale entry is evicted and reported as a miss.
    pub fn get(&self, path: &Path, sub_id: Option<&str>) -> Option<V> {
        let current = modified_time(path);
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|e| e.key.matches(path, sub_id))?;

        if current != Some(entries[pos].modified) {
            entries.remove(pos);
            crate::debug_event!("model-cache", "stale", "{}", path.display());
            return None;
        }

        let entry = entries.remove(pos)?;
        let value = entry.value.clone();
        entries.push_front(entry);
        Some(value)
    }

    /// Remove an entry, returning its value only if it was still fresh.
    pub fn remove(&self, path: &Path, sub_id: Option<&str>) -> Option<V> {
        let current = modified_time(path);
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|e| e.key.matches(path, sub_id))?;
        let entry = entries.remove(pos)?;
        (current == Some(entry.modified)).then_some(entry.value)
    }

    /// Drop every entry built from `path`, whatever the sub-entry.
    pub fn invalidate(&self, path: &Path) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.key.path != path);
        before - entries.len()
    }

    /// Keys in recency order, most recent first.
    pub fn keys(&self) -> Vec<ModelKey> {
        self.entries.lock().iter().map(|e| e.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<V: Clone> Default for ModelCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ModelCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("len", &self.entries.lock().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// The file's modification time, if it can be read.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
