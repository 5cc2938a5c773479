//! Listener and registrar traits connecting the watch service to its owner.

use std::path::Path;

use super::event::ChangeBatch;

/// Consumer of change notifications.
///
/// The service has exactly one listener. Calls are marshaled onto the main
/// context, so implementations never run concurrently with each other.
pub trait ChangeListener: Send + Sync {
    /// Listener name for logging.
    fn name(&self) -> &str {
        "listener"
    }

    /// Handle one poll cycle's worth of events.
    fn on_changes(&self, batch: &ChangeBatch);
}

/// Directory registration, as seen by collaborators of the watch service.
///
/// The path cache holds one of these instead of the whole service so it can
/// start or stop watching directories as its index changes.
pub trait DirectoryRegistrar: Send + Sync {
    /// Start watching `path`. See [`crate::WatchService::register_directory`].
    fn register_directory(&self, path: &Path) -> bool;

    /// Stop watching `path`. No-op for unknown paths.
    fn unregister_directory(&self, path: &Path);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeBatch) + Send + Sync,
{
    fn on_changes(&self, batch: &ChangeBatch) {
        self(batch)
    }
}
