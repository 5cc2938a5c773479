//! Directory watch service.
//!
//! Watches an arbitrary set of directories, including ones that do not exist
//! yet, and reports changes to a single listener on the main context.
//!
//! # Architecture
//!
//! ```text
//! WatchService
//!   - notify::RecommendedWatcher (non-recursive, one per directory)
//!   - DirectoryTable (WATCHED / DROPPED)
//!   - EventFilter (dot-files, extensions, subdirectories)
//!   - poll thread: wait(timeout) -> classify -> filter -> probe -> deliver
//!         |
//!    ContextHandle (main context)
//!         |
//!    ChangeListener (e.g. PathCache)
//! ```

mod directory_table;
mod error;
mod event;
mod filter;
mod handler;
mod service;

pub use directory_table::{DirectoryState, DirectoryTable};
pub use error::{WatchError, WatchResult};
pub use event::{ChangeBatch, ChangeEvent, ChangeKind};
pub use filter::EventFilter;
pub use handler::{ChangeListener, DirectoryRegistrar};
pub use service::{
    MAX_POLLING_TIMEOUT_SECS, MIN_POLLING_TIMEOUT_SECS, WatchService, clamp_polling_timeout,
};
