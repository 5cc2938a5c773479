//! Availability snapshots for tracked paths.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Whether a path was present at its last probe, and if not, since when it
/// has been missing.
///
/// Snapshots are immutable values; the cache replaces them wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Availability {
    unavailable_since: Option<u64>,
}

impl Availability {
    pub const AVAILABLE: Availability = Availability {
        unavailable_since: None,
    };

    /// Missing since `millis` (epoch ms).
    pub fn unavailable_since(millis: u64) -> Self {
        Self {
            unavailable_since: Some(millis),
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable_since.is_none()
    }

    pub fn since(&self) -> Option<u64> {
        self.unavailable_since
    }

    /// The snapshot after a probe at `now`.
    ///
    /// Finding the path clears the timestamp. Missing it starts the clock
    /// unless it is already running.
    pub fn after_probe(self, exists: bool, now: u64) -> Self {
        match (exists, self.unavailable_since) {
            (true, _) => Self::AVAILABLE,
            (false, Some(_)) => self,
            (false, None) => Self::unavailable_since(now),
        }
    }

    /// Missing for strictly longer than `grace` as of `now`.
    pub fn is_expired(&self, now: u64, grace: Duration) -> bool {
        match self.unavailable_since {
            Some(since) => u128::from(now.saturating_sub(since)) > grace.as_millis(),
            None => false,
        }
    }
}

/// A path plus its availability, as returned by the cache getters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPath {
    pub path: PathBuf,
    pub availability: Availability,
}

impl TrackedPath {
    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }
}
