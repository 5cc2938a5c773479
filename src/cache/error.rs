use std::path::PathBuf;
use thiserror::Error;

/// Errors from path cache persistence.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cannot read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot replace cache file {path}: {source}")]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },

    #[error("Unsupported cache file version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Cache file has no version header")]
    MissingVersion,
}

pub type CacheResult<T> = Result<T, CacheError>;
