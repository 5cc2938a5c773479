//! Watch command: run a workspace for a while and report what it learned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cache::ExtensionClassifier;
use crate::config::Settings;
use crate::context::MainContext;
use crate::watcher::ChangeBatch;
use crate::workspace::Workspace;

pub fn run_watch(
    mut settings: Settings,
    cache_file: &Path,
    directories: &[PathBuf],
    seconds: u64,
    polling_timeout: Option<u64>,
) -> Result<()> {
    for dir in directories {
        let dir = std::path::absolute(dir)?;
        if !settings.watch.directories.contains(&dir) {
            settings.watch.directories.push(dir);
        }
    }
    if let Some(secs) = polling_timeout {
        settings.watch.polling_timeout_secs = secs;
    }
    settings.cache.cache_file = Some(cache_file.to_path_buf());

    let classifier = Arc::new(ExtensionClassifier::from_settings(&settings));
    let categories = classifier.categories();
    let context = MainContext::new();
    let workspace: Workspace<()> = Workspace::open(settings, classifier, context.handle());
    workspace.set_observer(Arc::new(|batch: &ChangeBatch| {
        for event in batch {
            println!("{event}");
        }
    }));

    match workspace.watch_service() {
        Some(service) => {
            for dir in service.watched() {
                println!("watching  {}", dir.display());
            }
            for dir in service.dropped() {
                println!("waiting   {}", dir.display());
            }
        }
        None => eprintln!("File watching is unavailable on this system"),
    }

    println!("Running for {seconds}s...");
    let ran = context.run_for(Duration::from_secs(seconds));
    tracing::debug!("[watch] {ran} batches delivered");

    for category in &categories {
        let recent = workspace.path_cache().recent_files(category);
        if recent.is_empty() {
            continue;
        }
        println!("\nRecent {category}:");
        for entry in recent {
            let mark = if entry.is_available() { "" } else { " (missing)" };
            println!("  {}{mark}", entry.path.display());
        }
    }

    workspace.shutdown()?;
    context.run_pending();
    println!("\nSaved {}", workspace.cache_file().display());
    Ok(())
}
