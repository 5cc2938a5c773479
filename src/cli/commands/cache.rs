//! Path cache commands (add, recent, dirs).
//!
//! These work on the persisted cache directly; no watcher is started.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::cache::{Category, ExtensionClassifier, PathCache, TrackedPath};
use crate::config::Settings;

fn open_cache(settings: &Settings, cache_file: &Path) -> Result<PathCache> {
    let classifier = Arc::new(ExtensionClassifier::from_settings(settings));
    let cache = PathCache::new(classifier, &settings.cache);
    cache
        .load(cache_file)
        .with_context(|| format!("loading {}", cache_file.display()))?;
    Ok(cache)
}

fn parse_category(tag: &str) -> Result<Category> {
    Category::new(tag).ok_or_else(|| anyhow!("Invalid category tag: {tag:?}"))
}

fn status(entry: &TrackedPath) -> String {
    match entry.availability.since() {
        None => "ok".to_string(),
        Some(ms) => chrono::DateTime::from_timestamp_millis(ms as i64)
            .map(|t| format!("missing since {}", t.format("%Y-%m-%d %H:%M")))
            .unwrap_or_else(|| "missing".to_string()),
    }
}

/// Record files as recently used and save the cache.
pub fn run_add(settings: &Settings, cache_file: &Path, files: &[PathBuf]) -> Result<()> {
    let cache = open_cache(settings, cache_file)?;

    let mut added = 0;
    for file in files {
        if !file.is_file() {
            eprintln!("Skipping {}: not a file", file.display());
            continue;
        }
        if cache.add_file(file) {
            added += 1;
            println!("Added {}", file.display());
        } else {
            eprintln!("Skipping {}: no category matches", file.display());
        }
    }

    cache.save(cache_file)?;
    println!("{added} file(s) recorded in {}", cache_file.display());
    Ok(())
}

/// Print the MRU list of a category.
pub fn run_recent(settings: &Settings, cache_file: &Path, category: &str) -> Result<()> {
    let category = parse_category(category)?;
    let cache = open_cache(settings, cache_file)?;

    let recent = cache.recent_files(&category);
    if recent.is_empty() {
        println!("No recent {category} files");
    }
    for (i, entry) in recent.iter().enumerate() {
        println!("{:>3}. {} [{}]", i + 1, entry.path.display(), status(entry));
    }

    cache.save(cache_file)?;
    Ok(())
}

/// Print the directories holding files of a category.
pub fn run_dirs(
    settings: &Settings,
    cache_file: &Path,
    category: &str,
    with_files: bool,
) -> Result<()> {
    let category = parse_category(category)?;
    let cache = open_cache(settings, cache_file)?;

    let dirs = cache.directories(&category);
    if dirs.is_empty() {
        println!("No directories with {category} files");
    }
    for dir in &dirs {
        println!("{} [{}]", dir.path.display(), status(dir));
        if with_files {
            for file in cache.files(&dir.path, &category) {
                let name = file.path.file_name().unwrap_or_default().to_string_lossy();
                println!("    {name} [{}]", status(&file));
            }
        }
    }

    cache.save(cache_file)?;
    Ok(())
}
