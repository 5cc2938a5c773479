//! Workspace facade.
//!
//! Owns one path cache, one render model cache and (when the platform allows
//! it) a watch service feeding the path cache. Meant to be created once on
//! the main thread, next to the [`MainContext`](crate::context::MainContext)
//! whose handle it is given.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cache::{CacheResult, FileClassifier, PathCache};
use crate::config::{Settings, WatchConfig};
use crate::context::ContextHandle;
use crate::model::ModelCache;
use crate::watcher::{ChangeBatch, ChangeListener, DirectoryRegistrar, WatchService};

pub struct Workspace<V> {
    settings: Settings,
    cache_file: PathBuf,
    path_cache: Arc<PathCache>,
    models: ModelCache<V>,
    watch: Mutex<Option<WatchService>>,
    relay: Arc<Relay>,
    context: ContextHandle,
}

/// The watch service's listener: the path cache first, then an optional
/// observer.
struct Relay {
    cache: Arc<PathCache>,
    observer: RwLock<Option<Arc<dyn ChangeListener>>>,
}

/// What the path cache sees of the watch service. Directories named in the
/// configuration stay watched even when the cache has nothing left in them.
struct PinnedRegistrar {
    service: WatchService,
    pinned: Vec<PathBuf>,
}

impl DirectoryRegistrar for PinnedRegistrar {
    fn register_directory(&self, path: &Path) -> bool {
        self.service.register_directory(path)
    }

    fn unregister_directory(&self, path: &Path) {
        if !self.pinned.iter().any(|p| p == path) {
            self.service.unregister_directory(path);
        }
    }
}

impl ChangeListener for Relay {
    fn name(&self) -> &str {
        "workspace"
    }

    fn on_changes(&self, batch: &ChangeBatch) {
        self.cache.on_changes(batch);
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_changes(batch);
        }
    }
}

impl<V: Clone> Workspace<V> {
    /// Load the persisted path cache and start watching every configured and
    /// known directory.
    ///
    /// An unreadable cache file starts an empty cache; a missing OS watch
    /// facility leaves the workspace without a watcher. Neither is fatal.
    pub fn open(
        settings: Settings,
        classifier: Arc<dyn FileClassifier>,
        context: ContextHandle,
    ) -> Self {
        let cache_file = settings.cache.cache_file_path();
        let path_cache = Arc::new(PathCache::new(classifier, &settings.cache));

        match path_cache.load(&cache_file) {
            Ok(loaded) => {
                crate::log_event!(
                    "workspace",
                    "cache loaded",
                    "{loaded} entries from {}",
                    cache_file.display()
                );
            }
            Err(e) => {
                tracing::warn!("[workspace] starting with an empty cache: {e}");
            }
        }

        let models = ModelCache::with_capacity(settings.cache.model_capacity);
        let relay = Arc::new(Relay {
            cache: Arc::clone(&path_cache),
            observer: RwLock::new(None),
        });
        let workspace = Self {
            settings,
            cache_file,
            path_cache,
            models,
            watch: Mutex::new(None),
            relay,
            context,
        };
        workspace.start_watch_service();
        workspace
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path_cache(&self) -> &Arc<PathCache> {
        &self.path_cache
    }

    pub fn model_cache(&self) -> &ModelCache<V> {
        &self.models
    }

    /// The running watch service, if any.
    pub fn watch_service(&self) -> Option<WatchService> {
        self.watch.lock().clone()
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Also hand every batch to `observer`, after the path cache has seen it.
    pub fn set_observer(&self, observer: Arc<dyn ChangeListener>) {
        *self.relay.observer.write() = Some(observer);
    }

    /// Cached model for `(path, sub_id)`, building and caching it on a miss.
    ///
    /// A file that yields a model is also recorded as recently used.
    pub fn model_for<E>(
        &self,
        path: &Path,
        sub_id: Option<&str>,
        build: impl FnOnce(&Path) -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(model) = self.models.get(path, sub_id) {
            return Ok(model);
        }

        // Read before building: a save during the build must leave the entry
        // stale rather than fresh.
        let modified = crate::model::modified_time(path);
        let model = build(path)?;
        match modified {
            Some(modified) => self.models.put_as_of(path, sub_id, model.clone(), modified),
            None => {
                crate::debug_event!("workspace", "model not cached (no mtime)", "{}", path.display());
            }
        }
        self.path_cache.add_file(path);
        Ok(model)
    }

    /// Start a fresh watch service if the current one is gone.
    ///
    /// Returns true if a service is running afterwards.
    pub fn restart_watch_service(&self) -> bool {
        // A queued CLOSED from the old service must land before the new one
        // is attached.
        self.context.flush();
        let running = self
            .watch
            .lock()
            .as_ref()
            .is_some_and(|service| !service.is_closed());
        if running {
            return true;
        }
        self.start_watch_service()
    }

    /// Persist the path cache to the configured cache file.
    pub fn save(&self) -> CacheResult<()> {
        self.path_cache.save(&self.cache_file)
    }

    /// Stop watching and persist the path cache.
    pub fn shutdown(&self) -> CacheResult<()> {
        // CLOSED may reach the observer inline, which may call back in.
        let service = self.watch.lock().take();
        if let Some(service) = service {
            service.stop();
        }
        self.path_cache.detach_watcher();
        self.save()
    }

    fn start_watch_service(&self) -> bool {
        let mut directories = self.settings.watch.directories.clone();
        for dir in self.path_cache.known_directories() {
            if !directories.contains(&dir) {
                directories.push(dir);
            }
        }
        let config = WatchConfig {
            directories,
            ..self.settings.watch.clone()
        };

        let listener = Arc::clone(&self.relay);
        let Some(service) = WatchService::start(&config, listener, self.context.clone()) else {
            *self.watch.lock() = None;
            return false;
        };

        *self.watch.lock() = Some(service.clone());
        self.path_cache.attach_watcher(Arc::new(PinnedRegistrar {
            service,
            pinned: self.settings.watch.directories.clone(),
        }));
        true
    }
}

impl<V> std::fmt::Debug for Workspace<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("cache_file", &self.cache_file)
            .field("path_cache", &self.path_cache)
            .field("models", &self.models)
            .field("watching", &self.watch.lock().is_some())
            .finish()
    }
}
