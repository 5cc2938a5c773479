//! Error types for the directory watch service.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watch service operations.
///
/// Most of these never cross the public boundary: registration failures
/// surface as `false` and construction failures as `None`. They exist so the
/// internals can use `?` and so the reason can be logged.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch directory {path}: {reason}")]
    RegistrationFailed { path: PathBuf, reason: String },

    #[error("Invalid directory path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Watch service is closed")]
    Closed,

    #[error("Failed to spawn poll thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

pub type WatchResult<T> = Result<T, WatchError>;
