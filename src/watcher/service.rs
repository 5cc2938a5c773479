//! Directory watch service with a single background poll loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};

use crate::config::WatchConfig;
use crate::context::ContextHandle;

use super::directory_table::{DirectoryState, DirectoryTable};
use super::error::{WatchError, WatchResult};
use super::event::{ChangeBatch, ChangeEvent, ChangeKind};
use super::filter::EventFilter;
use super::handler::{ChangeListener, DirectoryRegistrar};

/// Lower bound for the poll timeout, in seconds.
pub const MIN_POLLING_TIMEOUT_SECS: u64 = 1;
/// Upper bound for the poll timeout, in seconds.
pub const MAX_POLLING_TIMEOUT_SECS: u64 = 60;

/// Clamp a poll timeout into the supported range.
pub fn clamp_polling_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_POLLING_TIMEOUT_SECS, MAX_POLLING_TIMEOUT_SECS)
}

type RawEvent = notify::Result<Event>;

/// Watches a set of directories (including ones that do not exist yet) and
/// reports changes to a single listener on the main context.
///
/// Cloning yields another handle to the same service.
///
/// # Lifecycle
///
/// [`WatchService::start`] spawns the poll thread. [`WatchService::stop`]
/// (or a fatal facility error) ends it and delivers a final
/// [`ChangeKind::Closed`]. A stopped service cannot be restarted; start a new
/// one instead.
#[derive(Clone)]
pub struct WatchService {
    shared: Arc<Shared>,
}

struct Shared {
    /// The OS facility. `None` once stopped.
    watcher: Mutex<Option<RecommendedWatcher>>,
    /// Lock order: `table` before `watcher`.
    table: Mutex<DirectoryTable>,
    filter: RwLock<EventFilter>,
    timeout_secs: AtomicU64,
    closed: AtomicBool,
    notifier: Notifier,
}

/// Delivers batches to the listener through the main context.
struct Notifier {
    context: ContextHandle,
    /// Taken on close so nothing can be delivered after CLOSED.
    listener: Mutex<Option<Arc<dyn ChangeListener>>>,
}

impl WatchService {
    /// Start the service, returning `None` if the OS notification facility
    /// is unavailable (common in sandboxes).
    pub fn start(
        config: &WatchConfig,
        listener: Arc<dyn ChangeListener>,
        context: ContextHandle,
    ) -> Option<Self> {
        match Self::try_start(config, listener, context) {
            Ok(service) => Some(service),
            Err(e) => {
                tracing::warn!("[watcher] unavailable: {e}");
                None
            }
        }
    }

    /// Like [`WatchService::start`] but reports why construction failed.
    pub fn try_start(
        config: &WatchConfig,
        listener: Arc<dyn ChangeListener>,
        context: ContextHandle,
    ) -> WatchResult<Self> {
        let (tx, rx) = unbounded();
        let watcher = notify::recommended_watcher(move |res: RawEvent| {
            let _ = tx.send(res);
        })?;

        let shared = Arc::new(Shared {
            watcher: Mutex::new(Some(watcher)),
            table: Mutex::new(DirectoryTable::new()),
            filter: RwLock::new(config.filter()),
            timeout_secs: AtomicU64::new(clamp_polling_timeout(config.polling_timeout_secs)),
            closed: AtomicBool::new(false),
            notifier: Notifier {
                context,
                listener: Mutex::new(Some(listener)),
            },
        });

        for dir in &config.directories {
            if let Err(e) = shared.register(dir) {
                tracing::warn!("[watcher] {e}");
            }
        }

        let loop_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("figcache-watch".to_string())
            .spawn(move || poll_loop(loop_shared, rx))?;

        crate::log_event!(
            "watcher",
            "started",
            "{} directories, timeout {}s",
            config.directories.len(),
            shared.timeout_secs.load(Ordering::Relaxed)
        );

        Ok(Self { shared })
    }

    /// Register `path` for watching.
    ///
    /// An existing directory is handed to the OS facility and marked
    /// WATCHED. A missing path, or one that is a regular file, is recorded as
    /// DROPPED so its later appearance is reported as RESTORED. Registering
    /// an already-registered path succeeds without changing anything.
    ///
    /// Returns `false` for relative/empty paths, OS registration failures,
    /// or a stopped service.
    pub fn register_directory(&self, path: &Path) -> bool {
        match self.shared.register(path) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("[watcher] {e}");
                false
            }
        }
    }

    /// Stop watching `path` and emit UNREGISTERED. No-op if never registered.
    pub fn unregister_directory(&self, path: &Path) {
        let previous = {
            let mut table = self.shared.table.lock();
            let previous = table.remove(path);
            if previous == Some(DirectoryState::Watched) {
                self.shared.unwatch_os(path);
            }
            previous
        };

        if previous.is_some() {
            crate::debug_event!("watcher", "unregistered", "{}", path.display());
            self.shared
                .notifier
                .deliver(ChangeBatch::single(ChangeEvent::new(
                    ChangeKind::Unregistered,
                    path,
                )));
        }
    }

    pub fn set_ignore_dot_files(&self, ignore: bool) {
        self.shared.filter.write().ignore_dot_files = ignore;
    }

    pub fn set_ignore_subdirectories(&self, ignore: bool) {
        self.shared.filter.write().ignore_subdirectories = ignore;
    }

    pub fn set_extensions(&self, extensions: impl IntoIterator<Item = impl AsRef<str>>) {
        self.shared.filter.write().set_extensions(extensions);
    }

    /// Set the poll timeout, clamped to `[1, 60]` seconds. Effective from the
    /// next cycle.
    pub fn set_polling_timeout(&self, secs: u64) {
        self.shared
            .timeout_secs
            .store(clamp_polling_timeout(secs), Ordering::Relaxed);
    }

    pub fn polling_timeout(&self) -> Duration {
        self.shared.polling_timeout()
    }

    pub fn filter(&self) -> EventFilter {
        self.shared.filter.read().clone()
    }

    /// Stop the service. Safe from any thread and idempotent.
    ///
    /// Does not wait for the poll loop; wait for the CLOSED notification for
    /// a clean shutdown.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self, path: &Path) -> Option<DirectoryState> {
        self.shared.table.lock().state(path)
    }

    /// Directories currently registered with the OS facility.
    pub fn watched(&self) -> Vec<PathBuf> {
        self.shared.table.lock().watched()
    }

    /// Directories currently missing.
    pub fn dropped(&self) -> Vec<PathBuf> {
        self.shared.table.lock().dropped()
    }
}

impl DirectoryRegistrar for WatchService {
    fn register_directory(&self, path: &Path) -> bool {
        WatchService::register_directory(self, path)
    }

    fn unregister_directory(&self, path: &Path) {
        WatchService::unregister_directory(self, path)
    }
}

impl std::fmt::Debug for WatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.shared.table.lock();
        f.debug_struct("WatchService")
            .field("watched", &table.watched().len())
            .field("dropped", &table.dropped().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Shared {
    fn polling_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.load(Ordering::Relaxed))
    }

    fn register(&self, path: &Path) -> WatchResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WatchError::Closed);
        }
        if path.as_os_str().is_empty() || !path.is_absolute() {
            return Err(WatchError::InvalidPath {
                path: path.to_path_buf(),
                reason: "directory paths must be absolute".to_string(),
            });
        }

        let mut table = self.table.lock();
        if table.contains(path) {
            return Ok(());
        }

        if path.is_dir() {
            self.watch_os(path)?;
            table.set(path.to_path_buf(), DirectoryState::Watched);
            crate::debug_event!("watcher", "watching", "{}", path.display());
        } else {
            table.set(path.to_path_buf(), DirectoryState::Dropped);
            crate::debug_event!("watcher", "waiting for", "{}", path.display());
        }
        Ok(())
    }

    fn watch_os(&self, path: &Path) -> WatchResult<()> {
        let mut guard = self.watcher.lock();
        let watcher = guard.as_mut().ok_or(WatchError::Closed)?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::RegistrationFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Best effort: the registration may already be gone with the directory.
    fn unwatch_os(&self, path: &Path) {
        if let Some(watcher) = self.watcher.lock().as_mut() {
            if let Err(e) = watcher.unwatch(path) {
                crate::debug_event!("watcher", "unwatch failed", "{}: {e}", path.display());
            }
        }
    }

    fn stop(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the OS watcher disconnects the raw event channel, which
        // ends the poll loop if it is waiting.
        self.watcher.lock().take();
        crate::log_event!("watcher", "stopped");
        self.notifier.close();
    }

    /// Turn one cycle's raw events into change events, then probe
    /// directory existence.
    fn process_cycle(&self, raw: Vec<RawEvent>) -> Vec<ChangeEvent> {
        let filter = self.filter.read().clone();
        let mut events = Vec::new();
        let mut invalidated = Vec::new();

        let mut table = self.table.lock();

        for res in raw {
            match res {
                Ok(event) => {
                    if event.need_rescan() {
                        crate::debug_event!("watcher", "rescan requested", "{:?}", event.paths);
                    }
                    for (kind, path) in classify(event) {
                        if table.contains(&path) {
                            // The watched directory itself went away.
                            if kind == ChangeKind::Delete {
                                invalidated.push(path);
                            }
                            continue;
                        }
                        let parent_watched = path
                            .parent()
                            .is_some_and(|p| table.state(p) == Some(DirectoryState::Watched));
                        if !parent_watched || !filter.accepts(kind, &path) {
                            continue;
                        }
                        let event = ChangeEvent::new(kind, path);
                        if !events.contains(&event) {
                            events.push(event);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[watcher] file watch error: {e}");
                }
            }
        }

        // Registrations reported invalid plus directories that vanished
        // without a notification (e.g. an unmounted share).
        for dir in table.watched() {
            if invalidated.contains(&dir) || !dir.is_dir() {
                self.unwatch_os(&dir);
                table.set(dir.clone(), DirectoryState::Dropped);
                crate::log_event!("watcher", "dropped", "{}", dir.display());
                events.push(ChangeEvent::new(ChangeKind::Dropped, dir));
            }
        }

        for dir in table.dropped() {
            if !dir.is_dir() {
                continue;
            }
            let missing_for = table.state_age(&dir).unwrap_or_default();
            match self.watch_os(&dir) {
                Ok(()) => {
                    table.set(dir.clone(), DirectoryState::Watched);
                    crate::log_event!(
                        "watcher",
                        "restored",
                        "{} after {:.1}s",
                        dir.display(),
                        missing_for.as_secs_f32()
                    );
                    events.push(ChangeEvent::new(ChangeKind::Restored, dir));
                }
                Err(e) => {
                    crate::debug_event!("watcher", "restore deferred", "{e}");
                }
            }
        }

        events
    }
}

impl Notifier {
    fn deliver(&self, batch: ChangeBatch) {
        if self.context.is_current() {
            // A CLOSED queued by another thread runs first; the listener is
            // looked up only afterwards.
            self.context.flush();
            let listener = self.listener.lock().clone();
            match listener {
                Some(listener) => listener.on_changes(&batch),
                None => Self::log_discarded(&batch),
            }
            return;
        }

        let guard = self.listener.lock();
        let Some(listener) = guard.clone() else {
            Self::log_discarded(&batch);
            return;
        };
        // Posting under the lock keeps every batch ahead of CLOSED.
        self.context.post(move || listener.on_changes(&batch));
    }

    fn log_discarded(batch: &ChangeBatch) {
        crate::debug_event!("watcher", "dropped batch", "{} events after close", batch.len());
    }

    fn close(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            self.context.dispatch(move || {
                listener.on_changes(&ChangeBatch::single(ChangeEvent::closed()))
            });
        }
    }
}

/// Map a raw notify event onto CREATE / MODIFY / DELETE.
fn classify(event: Event) -> Vec<(ChangeKind, PathBuf)> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(_) => paths.into_iter().map(|p| (ChangeKind::Create, p)).collect(),
        EventKind::Remove(_) => paths.into_iter().map(|p| (ChangeKind::Delete, p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(|p| (ChangeKind::Delete, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(|p| (ChangeKind::Create, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            let mut paths = paths.into_iter();
            if let Some(from) = paths.next() {
                out.push((ChangeKind::Delete, from));
            }
            if let Some(to) = paths.next() {
                out.push((ChangeKind::Create, to));
            }
            out
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Create
                } else {
                    ChangeKind::Delete
                };
                (kind, p)
            })
            .collect(),
        EventKind::Modify(_) => paths.into_iter().map(|p| (ChangeKind::Modify, p)).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn poll_loop(shared: Arc<Shared>, rx: Receiver<RawEvent>) {
    crate::debug_event!("watcher", "poll loop running");

    loop {
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        let mut raw = Vec::new();
        match rx.recv_timeout(shared.polling_timeout()) {
            Ok(res) => raw.push(res),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if !shared.closed.load(Ordering::SeqCst) {
                    tracing::error!("[watcher] notification facility closed unexpectedly");
                }
                break;
            }
        }
        raw.extend(rx.try_iter());

        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        let events = shared.process_cycle(raw);
        if !events.is_empty() {
            crate::debug_event!("watcher", "cycle", "{} events", events.len());
            shared.notifier.deliver(ChangeBatch::new(events));
        }
    }

    shared.stop();
    crate::debug_event!("watcher", "poll loop exited");
}
