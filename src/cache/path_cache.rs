//! Workspace path cache: directory index plus most-recently-used lists.
//!
//! All state lives in `DashMap`s so the watch service's delivery path and
//! direct calls ("I just saved this, add it") can mutate concurrently
//! without one global lock.
//!
//! Missing paths are not dropped on sight. They keep an "unavailable since"
//! timestamp and are purged only once they have been gone for longer than
//! the grace window, so a dropped network share does not erase history.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::config::CacheConfig;
use crate::watcher::{ChangeBatch, ChangeKind, ChangeListener, DirectoryRegistrar};

use super::availability::{Availability, TrackedPath, now_millis};
use super::classify::{Category, FileClassifier};
use super::error::CacheResult;
use super::mru::MruList;
use super::persist::{self, CacheSnapshot, DirectoryRecord, RecentList};

/// Files of interest directly inside one directory, keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    files: IndexMap<String, Category>,
}

impl DirectoryEntry {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.files.get(name)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &Category)> {
        self.files.iter().map(|(n, c)| (n.as_str(), c))
    }

    fn has_category(&self, category: &Category) -> bool {
        self.files.values().any(|c| c == category)
    }
}

/// Index of files of interest per directory plus per-category MRU lists.
pub struct PathCache {
    classifier: Arc<dyn FileClassifier>,
    directories: DashMap<PathBuf, DirectoryEntry>,
    recent: DashMap<Category, MruList>,
    /// Snapshots for every tracked file and directory. Absent = available.
    availability: DashMap<PathBuf, Availability>,
    registrar: RwLock<Option<Arc<dyn DirectoryRegistrar>>>,
    watcher_closed: AtomicBool,
    mru_capacity: usize,
    grace: Duration,
}

impl PathCache {
    pub fn new(classifier: Arc<dyn FileClassifier>, config: &CacheConfig) -> Self {
        Self::with_options(classifier, config.mru_capacity, config.unavailable_grace())
    }

    pub fn with_options(
        classifier: Arc<dyn FileClassifier>,
        mru_capacity: usize,
        grace: Duration,
    ) -> Self {
        Self {
            classifier,
            directories: DashMap::new(),
            recent: DashMap::new(),
            availability: DashMap::new(),
            registrar: RwLock::new(None),
            watcher_closed: AtomicBool::new(false),
            mru_capacity: mru_capacity.max(1),
            grace,
        }
    }

    /// Connect a watch service. Every known directory is registered and
    /// rescanned once.
    pub fn attach_watcher(&self, registrar: Arc<dyn DirectoryRegistrar>) {
        *self.registrar.write() = Some(Arc::clone(&registrar));
        self.watcher_closed.store(false, Ordering::SeqCst);

        for dir in self.known_directories() {
            registrar.register_directory(&dir);
            if dir.is_dir() {
                self.rescan_directory(&dir);
            } else {
                self.probe(&dir, now_millis());
            }
        }
    }

    pub fn detach_watcher(&self) {
        self.registrar.write().take();
    }

    /// True once the attached watch service has reported CLOSED.
    pub fn watcher_closed(&self) -> bool {
        self.watcher_closed.load(Ordering::SeqCst)
    }

    /// Track `path` if the classifier recognizes it and make it the most
    /// recent entry of its category.
    ///
    /// The first file seen in a directory creates its entry, registers the
    /// directory for watching and triggers a one-off rescan.
    pub fn add_file(&self, path: &Path) -> bool {
        let Some(path) = absolute(path) else {
            return false;
        };
        let Some(category) = self.classifier.classify(&path) else {
            return false;
        };
        let (Some(dir), Some(name)) = (path.parent(), file_name(&path)) else {
            return false;
        };

        let new_directory = self.insert_file(dir, name, category.clone());
        self.probe(&path, now_millis());
        self.touch_recent(&category, &path);

        if new_directory {
            crate::debug_event!("path-cache", "new directory", "{}", dir.display());
            if let Some(registrar) = self.registrar() {
                registrar.register_directory(dir);
            }
            self.rescan_directory(dir);
        }
        true
    }

    /// Forget `path`.
    ///
    /// The directory index only drops it when the file is really gone, so a
    /// late DELETE for a file that was recreated is harmless. MRU lists drop
    /// it unconditionally.
    pub fn remove_file(&self, path: &Path) -> bool {
        let Some(path) = absolute(path) else {
            return false;
        };

        let mut removed = false;
        if !path.exists() {
            removed |= self.remove_from_directory(&path);
        }
        for mut list in self.recent.iter_mut() {
            removed |= list.remove(&path);
        }
        if removed && !self.is_tracked_file(&path) {
            self.availability.remove(&path);
        }
        removed
    }

    /// Follow a rename. No-op unless `new_path` exists.
    ///
    /// MRU entries keep their position. Within one directory the index entry
    /// is renamed in place; across directories it moves, creating the target
    /// directory entry if needed.
    pub fn rename_file(&self, old_path: &Path, new_path: &Path) -> bool {
        let (Some(old_path), Some(new_path)) = (absolute(old_path), absolute(new_path)) else {
            return false;
        };
        if !new_path.exists() {
            return false;
        }

        let Some(category) = self.classifier.classify(&new_path) else {
            // Renamed to something we do not track.
            self.remove_from_directory(&old_path);
            for mut list in self.recent.iter_mut() {
                list.remove(&old_path);
            }
            self.availability.remove(&old_path);
            return true;
        };

        let (Some(old_dir), Some(new_dir), Some(new_name)) =
            (old_path.parent(), new_path.parent(), file_name(&new_path))
        else {
            return false;
        };

        let new_directory = if old_dir == new_dir {
            let created = !self.directories.contains_key(old_dir);
            let old_name = file_name(&old_path).unwrap_or_default();
            let mut entry = self.directories.entry(old_dir.to_path_buf()).or_default();
            let files = &mut entry.files;
            files.shift_remove(new_name);
            match files.shift_remove_full(old_name) {
                Some((index, _, _)) => {
                    files.shift_insert(index, new_name.to_string(), category.clone());
                }
                None => {
                    files.insert(new_name.to_string(), category.clone());
                }
            }
            created
        } else {
            self.remove_from_directory(&old_path);
            self.insert_file(new_dir, new_name, category.clone())
        };

        let mut was_recent = false;
        let mut placed = false;
        for mut list in self.recent.iter_mut() {
            if *list.key() == category {
                placed |= list.replace(&old_path, &new_path);
            } else {
                was_recent |= list.remove(&old_path);
            }
        }
        if was_recent && !placed {
            self.touch_recent(&category, &new_path);
        }

        self.availability.remove(&old_path);
        self.probe(&new_path, now_millis());

        if new_directory {
            if let Some(registrar) = self.registrar() {
                registrar.register_directory(new_dir);
            }
            self.rescan_directory(new_dir);
        }

        crate::debug_event!(
            "path-cache",
            "renamed",
            "{} -> {}",
            old_path.display(),
            new_path.display()
        );
        true
    }

    /// Directories holding at least one file of `category`, sorted by path.
    ///
    /// Probes every directory: availability timestamps are updated and
    /// directories missing past the grace window are purged.
    pub fn directories(&self, category: &Category) -> Vec<TrackedPath> {
        self.scan_directories();

        let mut dirs: Vec<TrackedPath> = self
            .directories
            .iter()
            .filter(|e| e.value().has_category(category))
            .map(|e| TrackedPath {
                path: e.key().clone(),
                availability: self.availability_of(e.key()),
            })
            .collect();
        dirs.sort_by(|a, b| a.path.cmp(&b.path));
        dirs
    }

    /// Files of `category` directly inside `directory`, in index order.
    pub fn files(&self, directory: &Path, category: &Category) -> Vec<TrackedPath> {
        let names: Vec<String> = match self.directories.get(directory) {
            Some(entry) => entry
                .files
                .iter()
                .filter(|(_, c)| *c == category)
                .map(|(n, _)| n.clone())
                .collect(),
            None => return Vec::new(),
        };

        let now = now_millis();
        let mut result = Vec::with_capacity(names.len());
        let mut expired = Vec::new();
        for name in names {
            let path = directory.join(&name);
            let availability = self.probe(&path, now);
            if availability.is_expired(now, self.grace) {
                expired.push(name);
            } else {
                result.push(TrackedPath { path, availability });
            }
        }

        if !expired.is_empty() {
            for name in &expired {
                self.remove_from_directory(&directory.join(name));
            }
            crate::debug_event!(
                "path-cache",
                "purged files",
                "{} from {}",
                expired.len(),
                directory.display()
            );
        }
        result
    }

    /// The most recent entry of `category` that is currently available.
    pub fn most_recent_file(&self, category: &Category) -> Option<PathBuf> {
        self.recent_files(category)
            .into_iter()
            .find(TrackedPath::is_available)
            .map(|t| t.path)
    }

    /// MRU list of `category`, most recent first. Unavailable entries still
    /// inside the grace window are included.
    pub fn recent_files(&self, category: &Category) -> Vec<TrackedPath> {
        let paths: Vec<PathBuf> = match self.recent.get(category) {
            Some(list) => list.iter().map(Path::to_path_buf).collect(),
            None => return Vec::new(),
        };

        let now = now_millis();
        let mut result = Vec::with_capacity(paths.len());
        let mut expired = Vec::new();
        for path in paths {
            let availability = self.probe(&path, now);
            if availability.is_expired(now, self.grace) {
                expired.push(path);
            } else {
                result.push(TrackedPath { path, availability });
            }
        }

        if !expired.is_empty() {
            if let Some(mut list) = self.recent.get_mut(category) {
                list.retain(|p| !expired.contains(p));
            }
            for path in &expired {
                if !self.is_tracked_file(path) {
                    self.availability.remove(path);
                }
            }
            crate::debug_event!("path-cache", "purged recent", "{} entries", expired.len());
        }
        result
    }

    /// Parent directories of the MRU entries of `category`, most recent
    /// first, without duplicates.
    pub fn recent_directories(&self, category: &Category) -> Vec<TrackedPath> {
        let now = now_millis();
        let mut dirs: Vec<TrackedPath> = Vec::new();
        for file in self.recent_files(category) {
            let Some(parent) = file.path.parent() else {
                continue;
            };
            if dirs.iter().any(|d| d.path == parent) {
                continue;
            }
            let availability = self.probe(parent, now);
            dirs.push(TrackedPath {
                path: parent.to_path_buf(),
                availability,
            });
        }
        dirs
    }

    /// Probe everything and purge entries missing past the grace window.
    pub fn scan(&self) {
        self.scan_directories();
        let categories: Vec<Category> = self.recent.iter().map(|e| e.key().clone()).collect();
        for category in categories {
            self.recent_files(&category);
        }
    }

    /// Rebuild a directory's entry from its current contents.
    ///
    /// A directory with no files of interest is pruned and unregistered.
    pub fn rescan_directory(&self, dir: &Path) {
        let read = match fs::read_dir(dir) {
            Ok(read) => read,
            Err(e) => {
                crate::debug_event!("path-cache", "rescan failed", "{}: {e}", dir.display());
                self.mark_unavailable(dir);
                return;
            }
        };

        let mut found: Vec<(String, Category)> = Vec::new();
        for entry in read.flatten() {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }
            let path = entry.path();
            let (Some(category), Some(name)) = (self.classifier.classify(&path), file_name(&path))
            else {
                continue;
            };
            found.push((name.to_string(), category));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));

        let now = now_millis();
        self.probe(dir, now);

        let previous = self.directories.get(dir).map(|e| e.value().clone());
        if let Some(previous) = previous {
            for (name, _) in previous.files() {
                if !found.iter().any(|(n, _)| n == name) {
                    let path = dir.join(name);
                    if !self.in_recent(&path) {
                        self.availability.remove(&path);
                    }
                }
            }
        }

        for (name, _) in &found {
            self.availability.remove(&dir.join(name));
        }
        let mut files: IndexMap<String, Category> = found.into_iter().collect();

        // Files added since read_dir are kept. The guard is released before
        // any registrar call.
        let count = match self.directories.entry(dir.to_path_buf()) {
            Entry::Occupied(mut occupied) => {
                for (name, category) in occupied.get().files() {
                    if !files.contains_key(name) && dir.join(name).is_file() {
                        files.insert(name.to_string(), category.clone());
                    }
                }
                files.sort_keys();
                let count = files.len();
                occupied.get_mut().files = files;
                count
            }
            Entry::Vacant(vacant) => {
                let count = files.len();
                if count > 0 {
                    vacant.insert(DirectoryEntry { files });
                }
                count
            }
        };

        if count == 0 {
            crate::debug_event!("path-cache", "nothing of interest", "{}", dir.display());
            self.prune_if_empty(dir);
            return;
        }
        crate::debug_event!("path-cache", "rescanned", "{} ({count} files)", dir.display());
    }

    /// Record `path` as missing unless it already is.
    pub fn mark_unavailable(&self, path: &Path) {
        let now = now_millis();
        let mut snapshot = self.availability.entry(path.to_path_buf()).or_default();
        if snapshot.is_available() {
            *snapshot = Availability::unavailable_since(now);
        }
    }

    pub fn availability_of(&self, path: &Path) -> Availability {
        self.availability.get(path).map(|a| *a).unwrap_or_default()
    }

    /// Clone of the index entry for `dir`.
    pub fn directory_entry(&self, dir: &Path) -> Option<DirectoryEntry> {
        self.directories.get(dir).map(|e| e.value().clone())
    }

    pub fn known_directories(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.directories.iter().map(|e| e.key().clone()).collect();
        dirs.sort();
        dirs
    }

    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Persist to `path`. On failure the previous file is left in place.
    pub fn save(&self, path: &Path) -> CacheResult<()> {
        persist::write_atomic(path, &self.snapshot())?;
        crate::debug_event!("path-cache", "saved", "{}", path.display());
        Ok(())
    }

    /// Merge a persisted cache into this one, skipping entries missing past
    /// the grace window. Returns the number of entries loaded.
    pub fn load(&self, path: &Path) -> CacheResult<usize> {
        let Some(snapshot) = persist::read(path)? else {
            return Ok(0);
        };
        Ok(self.restore(snapshot))
    }

    /// Current state as a persistable snapshot, in a stable order.
    pub fn snapshot(&self) -> CacheSnapshot {
        let mut recent: Vec<RecentList> = self
            .recent
            .iter()
            .filter(|e| !e.value().is_empty())
            .map(|e| RecentList {
                category: e.key().clone(),
                entries: e
                    .value()
                    .iter()
                    .map(|p| TrackedPath {
                        path: p.to_path_buf(),
                        availability: self.availability_of(p),
                    })
                    .collect(),
            })
            .collect();
        recent.sort_by(|a, b| a.category.cmp(&b.category));

        let mut directories: Vec<DirectoryRecord> = self
            .directories
            .iter()
            .map(|e| DirectoryRecord {
                path: e.key().clone(),
                availability: self.availability_of(e.key()),
                files: e
                    .value()
                    .files
                    .iter()
                    .map(|(n, c)| (c.clone(), n.clone()))
                    .collect(),
            })
            .collect();
        directories.sort_by(|a, b| a.path.cmp(&b.path));

        CacheSnapshot {
            recent,
            directories,
        }
    }

    fn restore(&self, snapshot: CacheSnapshot) -> usize {
        let now = now_millis();
        let mut loaded = 0;

        for list in snapshot.recent {
            let mut mru = self
                .recent
                .entry(list.category)
                .or_insert_with(|| MruList::new(self.mru_capacity));
            for entry in list.entries {
                if entry.availability.is_expired(now, self.grace) {
                    continue;
                }
                if mru.push_back(entry.path.clone()) {
                    loaded += 1;
                    if !entry.availability.is_available() {
                        self.availability.insert(entry.path, entry.availability);
                    }
                }
            }
        }

        for record in snapshot.directories {
            if record.availability.is_expired(now, self.grace) || record.files.is_empty() {
                continue;
            }
            if !record.availability.is_available() {
                self.availability
                    .insert(record.path.clone(), record.availability);
            }
            let mut entry = self.directories.entry(record.path).or_default();
            for (category, name) in record.files {
                entry.files.entry(name).or_insert(category);
            }
            loaded += 1;
        }

        crate::debug_event!("path-cache", "loaded", "{loaded} entries");
        loaded
    }

    fn registrar(&self) -> Option<Arc<dyn DirectoryRegistrar>> {
        self.registrar.read().clone()
    }

    /// Insert into the directory index. Returns true if the directory entry
    /// was created by this call.
    fn insert_file(&self, dir: &Path, name: &str, category: Category) -> bool {
        match self.directories.entry(dir.to_path_buf()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().files.insert(name.to_string(), category);
                false
            }
            Entry::Vacant(entry) => {
                let mut files = IndexMap::new();
                files.insert(name.to_string(), category);
                entry.insert(DirectoryEntry { files });
                true
            }
        }
    }

    /// Remove from the directory index, pruning the directory if it empties.
    fn remove_from_directory(&self, path: &Path) -> bool {
        let (Some(dir), Some(name)) = (path.parent(), file_name(path)) else {
            return false;
        };

        let (removed, now_empty) = match self.directories.get_mut(dir) {
            Some(mut entry) => {
                let removed = entry.files.shift_remove(name).is_some();
                (removed, entry.files.is_empty())
            }
            None => return false,
        };

        if now_empty {
            self.prune_if_empty(dir);
        }
        removed
    }

    /// Prune `dir` unless a concurrent `add_file` has put something in it.
    fn prune_if_empty(&self, dir: &Path) {
        let removed = self.directories.remove_if(dir, |_, entry| entry.is_empty());
        if removed.is_none() && self.directories.contains_key(dir) {
            return;
        }
        self.forget_directory(dir, removed.map(|(_, entry)| entry));
    }

    fn prune_directory(&self, dir: &Path) {
        let removed = self.directories.remove(dir);
        self.forget_directory(dir, removed.map(|(_, entry)| entry));
    }

    fn forget_directory(&self, dir: &Path, removed: Option<DirectoryEntry>) {
        self.availability.remove(dir);
        if let Some(entry) = removed {
            for (name, _) in entry.files() {
                let path = dir.join(name);
                if !self.in_recent(&path) {
                    self.availability.remove(&path);
                }
            }
        }
        if let Some(registrar) = self.registrar() {
            registrar.unregister_directory(dir);
        }
        crate::debug_event!("path-cache", "pruned", "{}", dir.display());
    }

    /// Drop directories missing past the grace window; probe the rest.
    fn scan_directories(&self) {
        let now = now_millis();
        let expired: Vec<PathBuf> = self
            .known_directories()
            .into_iter()
            .filter(|dir| self.probe(dir, now).is_expired(now, self.grace))
            .collect();

        for dir in expired {
            crate::log_event!("path-cache", "purged directory", "{}", dir.display());
            self.prune_directory(&dir);
        }
    }

    fn touch_recent(&self, category: &Category, path: &Path) {
        let evicted = self
            .recent
            .entry(category.clone())
            .or_insert_with(|| MruList::new(self.mru_capacity))
            .touch(path);
        if let Some(evicted) = evicted {
            if !self.is_tracked_file(&evicted) {
                self.availability.remove(&evicted);
            }
        }
    }

    /// Probe the file system and replace the snapshot if it changed.
    fn probe(&self, path: &Path, now: u64) -> Availability {
        let exists = path.exists();
        if exists && !self.availability.contains_key(path) {
            return Availability::AVAILABLE;
        }
        let mut snapshot = self.availability.entry(path.to_path_buf()).or_default();
        let next = snapshot.after_probe(exists, now);
        *snapshot = next;
        drop(snapshot);
        if next.is_available() {
            self.availability.remove(path);
        }
        next
    }

    fn in_recent(&self, path: &Path) -> bool {
        self.recent.iter().any(|list| list.contains(path))
    }

    fn is_tracked_file(&self, path: &Path) -> bool {
        if self.in_recent(path) {
            return true;
        }
        match (path.parent(), file_name(path)) {
            (Some(dir), Some(name)) => self
                .directories
                .get(dir)
                .is_some_and(|entry| entry.contains(name)),
            _ => false,
        }
    }
}

impl ChangeListener for PathCache {
    fn name(&self) -> &str {
        "path-cache"
    }

    fn on_changes(&self, batch: &ChangeBatch) {
        for event in batch {
            let path = event.path();
            match (event.kind, path) {
                (ChangeKind::Create, Some(path)) => {
                    if self.add_file(path) {
                        crate::debug_event!("path-cache", "added", "{}", path.display());
                    }
                }
                (ChangeKind::Delete, Some(path)) => {
                    if self.remove_file(path) {
                        crate::debug_event!("path-cache", "removed", "{}", path.display());
                    }
                }
                (ChangeKind::Dropped, Some(path)) => {
                    self.mark_unavailable(path);
                }
                (ChangeKind::Restored, Some(path)) => {
                    self.rescan_directory(path);
                }
                (ChangeKind::Closed, _) => {
                    // Restarting is the owner's call; see Workspace::restart_watch_service.
                    self.detach_watcher();
                    self.watcher_closed.store(true, Ordering::SeqCst);
                    tracing::warn!("[path-cache] watch service closed");
                }
                (kind, path) => {
                    crate::debug_event!("path-cache", "ignored", "{kind} {path:?}");
                }
            }
        }
    }
}

impl std::fmt::Debug for PathCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathCache")
            .field("directories", &self.directories.len())
            .field("recent_lists", &self.recent.len())
            .field("grace", &self.grace)
            .finish()
    }
}

fn absolute(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        Some(path.to_path_buf())
    } else {
        std::path::absolute(path).ok()
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}
