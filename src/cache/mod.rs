//! Workspace path cache.
//!
//! Tracks files of interest per directory and per-category
//! most-recently-used lists, kept in sync by watch service notifications and
//! persisted between runs.

mod availability;
mod classify;
mod error;
mod mru;
mod path_cache;
pub mod persist;

use std::time::Duration;

pub use availability::{Availability, TrackedPath, now_millis};
pub use classify::{Category, ExtensionClassifier, FileClassifier};
pub use error::{CacheError, CacheResult};
pub use mru::MruList;
pub use path_cache::{DirectoryEntry, PathCache};

/// Entries kept per most-recently-used list.
pub const DEFAULT_MRU_CAPACITY: usize = 20;

/// How long a missing path is remembered before it is purged: 7 days.
pub const DEFAULT_UNAVAILABLE_GRACE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
