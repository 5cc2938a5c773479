//! On-disk format of the path cache.
//!
//! ```text
//! version=1
//! doc: OK /home/ana/figs/a.fyp                 most-recently-used entries,
//! doc: 1718000000000 /mnt/share/b.fyp          most recent first
//! : OK /home/ana/figs                          a tracked directory ...
//! doc a.fyp                                    ... and its files
//! data run 1.csv
//! ```
//!
//! A status of `OK` means available; a number is the epoch-ms timestamp at
//! which the path was first found missing. Lines that do not parse are
//! skipped so newer writers stay readable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::availability::{Availability, TrackedPath};
use super::classify::Category;
use super::error::{CacheError, CacheResult};

pub const CACHE_FORMAT_VERSION: u32 = 1;

const AVAILABLE_TOKEN: &str = "OK";

/// Everything the path cache persists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    pub recent: Vec<RecentList>,
    pub directories: Vec<DirectoryRecord>,
}

/// One category's MRU list, most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentList {
    pub category: Category,
    pub entries: Vec<TrackedPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub path: PathBuf,
    pub availability: Availability,
    /// `(category, file name)` pairs, relative to `path`.
    pub files: Vec<(Category, String)>,
}

pub fn encode(snapshot: &CacheSnapshot) -> String {
    let mut out = format!("version={CACHE_FORMAT_VERSION}\n");

    for list in &snapshot.recent {
        for entry in &list.entries {
            if let Some(path) = line_safe(&entry.path) {
                out.push_str(&format!(
                    "{}: {} {path}\n",
                    list.category,
                    status_token(entry.availability)
                ));
            }
        }
    }

    for dir in &snapshot.directories {
        let Some(path) = line_safe(&dir.path) else {
            continue;
        };
        out.push_str(&format!(": {} {path}\n", status_token(dir.availability)));
        for (category, name) in &dir.files {
            if !name.contains('\n') {
                out.push_str(&format!("{category} {name}\n"));
            }
        }
    }

    out
}

pub fn decode(text: &str) -> CacheResult<CacheSnapshot> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let version = lines
        .next()
        .and_then(|l| l.trim().strip_prefix("version="))
        .and_then(|v| v.trim().parse::<u32>().ok())
        .ok_or(CacheError::MissingVersion)?;
    if version != CACHE_FORMAT_VERSION {
        return Err(CacheError::UnsupportedVersion {
            found: version,
            expected: CACHE_FORMAT_VERSION,
        });
    }

    let mut snapshot = CacheSnapshot::default();
    // Index into `snapshot.directories` that file lines attach to.
    let mut current_dir: Option<usize> = None;

    for line in lines {
        if let Some(rest) = line.strip_prefix(": ") {
            current_dir = None;
            if let Some((availability, path)) = parse_status(rest) {
                snapshot.directories.push(DirectoryRecord {
                    path,
                    availability,
                    files: Vec::new(),
                });
                current_dir = Some(snapshot.directories.len() - 1);
            }
            continue;
        }

        let Some(split) = line.find([' ', ':']) else {
            continue;
        };
        let (tag, rest) = line.split_at(split);
        let Some(category) = Category::new(tag) else {
            continue;
        };

        if let Some(rest) = rest.strip_prefix(": ") {
            current_dir = None;
            if let Some((availability, path)) = parse_status(rest) {
                push_recent(&mut snapshot, category, TrackedPath { path, availability });
            }
        } else if let Some(name) = rest.strip_prefix(' ') {
            if let Some(index) = current_dir {
                if !name.is_empty() {
                    snapshot.directories[index]
                        .files
                        .push((category, name.to_string()));
                }
            }
        }
    }

    Ok(snapshot)
}

/// Read a cache file. A missing file is an empty cache, not an error.
pub fn read(path: &Path) -> CacheResult<Option<CacheSnapshot>> {
    match fs::read_to_string(path) {
        Ok(text) => decode(&text).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CacheError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write via a temp file in the same directory and rename over the target,
/// so a failed save leaves the previous file intact.
pub fn write_atomic(path: &Path, snapshot: &CacheSnapshot) -> CacheResult<()> {
    let write_err = |source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(encode(snapshot).as_bytes())
        .map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|source| CacheError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn status_token(availability: Availability) -> String {
    match availability.since() {
        Some(ms) => ms.to_string(),
        None => AVAILABLE_TOKEN.to_string(),
    }
}

fn parse_status(rest: &str) -> Option<(Availability, PathBuf)> {
    let (token, path) = rest.split_once(' ')?;
    let availability = if token == AVAILABLE_TOKEN {
        Availability::AVAILABLE
    } else {
        Availability::unavailable_since(token.parse().ok()?)
    };
    let path = PathBuf::from(path);
    path.is_absolute().then_some((availability, path))
}

fn push_recent(snapshot: &mut CacheSnapshot, category: Category, entry: TrackedPath) {
    match snapshot.recent.iter_mut().find(|l| l.category == category) {
        Some(list) => list.entries.push(entry),
        None => snapshot.recent.push(RecentList {
            category,
            entries: vec![entry],
        }),
    }
}

fn line_safe(path: &Path) -> Option<String> {
    let s = path.to_str()?;
    (!s.contains('\n')).then(|| s.to_string())
}
