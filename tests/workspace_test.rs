//! Workspace lifecycle: open, model lookups, watching, restart, shutdown.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use figcache::cache::{Category, ExtensionClassifier};
use figcache::watcher::{ChangeBatch, ChangeKind};
use figcache::{MainContext, Settings, Workspace};
use tempfile::TempDir;

fn settings(root: &Path, watch: Vec<PathBuf>) -> Settings {
    let mut settings = Settings::default();
    settings.cache.cache_file = Some(root.join("state").join("paths.cache"));
    settings.watch.directories = watch;
    settings.watch.polling_timeout_secs = 1;
    settings
}

fn open(settings: Settings, context: &MainContext) -> Workspace<String> {
    let classifier = Arc::new(ExtensionClassifier::from_settings(&settings));
    Workspace::open(settings, classifier, context.handle())
}

fn doc() -> Category {
    Category::new("doc").unwrap()
}

#[test]
fn test_model_for_builds_once_until_file_changes() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("a.fyp");
    fs::write(&file, b"figure v1").unwrap();

    let context = MainContext::new();
    let workspace = open(settings(temp_dir.path(), Vec::new()), &context);
    let builds = AtomicUsize::new(0);
    let build = |path: &Path| -> Result<String, std::io::Error> {
        builds.fetch_add(1, Ordering::SeqCst);
        fs::read_to_string(path)
    };

    assert_eq!(workspace.model_for(&file, None, build).unwrap(), "figure v1");
    assert_eq!(workspace.model_for(&file, None, build).unwrap(), "figure v1");
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    assert_eq!(workspace.path_cache().most_recent_file(&doc()), Some(file.clone()));

    fs::write(&file, b"figure v2").unwrap();
    let later = fs::metadata(&file).unwrap().modified().unwrap() + Duration::from_secs(5);
    File::options()
        .write(true)
        .open(&file)
        .unwrap()
        .set_modified(later)
        .unwrap();

    assert_eq!(workspace.model_for(&file, None, build).unwrap(), "figure v2");
    assert_eq!(builds.load(Ordering::SeqCst), 2);

    workspace.shutdown().unwrap();
}

#[test]
fn test_file_saved_during_build_is_rebuilt() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("a.fyp");
    fs::write(&file, b"v1").unwrap();

    let context = MainContext::new();
    let workspace = open(settings(temp_dir.path(), Vec::new()), &context);

    let first = workspace
        .model_for(&file, None, |path| -> Result<String, std::io::Error> {
            let model = fs::read_to_string(path)?;
            // The user saves while the model is being built.
            fs::write(path, b"v2")?;
            let later = fs::metadata(path)?.modified()? + Duration::from_secs(5);
            File::options().write(true).open(path)?.set_modified(later)?;
            Ok(model)
        })
        .unwrap();
    assert_eq!(first, "v1");

    let second = workspace
        .model_for(&file, None, |path| fs::read_to_string(path))
        .unwrap();
    assert_eq!(second, "v2");

    workspace.shutdown().unwrap();
}

#[test]
fn test_observer_can_call_back_during_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let context = MainContext::new();
    let workspace = Arc::new(open(settings(temp_dir.path(), Vec::new()), &context));
    if workspace.watch_service().is_none() {
        eprintln!("skipping: watch service unavailable");
        return;
    }

    let saw_closed = Arc::new(AtomicUsize::new(0));
    let weak = Arc::downgrade(&workspace);
    let counter = Arc::clone(&saw_closed);
    workspace.set_observer(Arc::new(move |batch: &ChangeBatch| {
        if batch.iter().any(|e| e.kind == ChangeKind::Closed) {
            if let Some(ws) = weak.upgrade() {
                // The service has already been taken out.
                assert!(ws.watch_service().is_none());
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    }));

    // CLOSED is delivered inline here, on the context's thread.
    workspace.shutdown().unwrap();
    assert_eq!(saw_closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_build_error_caches_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("broken.fyp");
    fs::write(&file, b"?").unwrap();

    let context = MainContext::new();
    let workspace = open(settings(temp_dir.path(), Vec::new()), &context);
    let result: Result<String, &str> =
        workspace.model_for(&file, Some("series-2"), |_| Err("bad"));

    assert_eq!(result, Err("bad"));
    assert!(workspace.model_cache().is_empty());
    assert_eq!(workspace.path_cache().most_recent_file(&doc()), None);

    workspace.shutdown().unwrap();
}

#[test]
fn test_shutdown_persists_and_reopen_restores() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    fs::create_dir(&figs).unwrap();
    let a = figs.join("a.fyp");
    fs::write(&a, b"x").unwrap();

    let context = MainContext::new();
    let workspace = open(settings(temp_dir.path(), Vec::new()), &context);
    workspace.path_cache().add_file(&a);
    workspace.shutdown().unwrap();
    context.run_pending();
    assert!(workspace.cache_file().exists());

    let reopened = open(settings(temp_dir.path(), Vec::new()), &context);
    assert_eq!(reopened.path_cache().most_recent_file(&doc()), Some(a));
    if let Some(service) = reopened.watch_service() {
        // Known directories are watched again on open.
        assert!(service.watched().contains(&figs));
    }
    reopened.shutdown().unwrap();
}

#[test]
fn test_corrupt_cache_file_starts_empty() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings(temp_dir.path(), Vec::new());
    let cache_file = settings.cache.cache_file.clone().unwrap();
    fs::create_dir_all(cache_file.parent().unwrap()).unwrap();
    fs::write(&cache_file, "not a cache file\n").unwrap();

    let context = MainContext::new();
    let workspace = open(settings, &context);
    assert_eq!(workspace.path_cache().directory_count(), 0);
    workspace.shutdown().unwrap();
}

#[test]
fn test_created_files_reach_the_path_cache() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    fs::create_dir(&figs).unwrap();

    let context = MainContext::new();
    let workspace = open(settings(temp_dir.path(), vec![figs.clone()]), &context);
    if workspace.watch_service().is_none() {
        eprintln!("skipping: watch service unavailable");
        return;
    }

    let seen = Arc::new(parking_lot::Mutex::new(Vec::<ChangeKind>::new()));
    let sink = Arc::clone(&seen);
    workspace.set_observer(Arc::new(move |batch: &ChangeBatch| {
        sink.lock().extend(batch.iter().map(|e| e.kind));
    }));

    let a = figs.join("a.fyp");
    fs::write(&a, b"x").unwrap();
    let cache = workspace.path_cache();
    assert!(context.run_until(Duration::from_secs(5), || {
        cache.directory_entry(&figs).is_some_and(|e| e.contains("a.fyp"))
    }));
    assert_eq!(cache.most_recent_file(&doc()), Some(a));
    assert!(seen.lock().contains(&ChangeKind::Create));

    workspace.shutdown().unwrap();
    assert_eq!(seen.lock().last(), Some(&ChangeKind::Closed));
}

#[test]
fn test_restart_after_watch_service_closed() {
    let temp_dir = TempDir::new().unwrap();
    let context = MainContext::new();
    let workspace = open(settings(temp_dir.path(), Vec::new()), &context);
    let Some(service) = workspace.watch_service() else {
        eprintln!("skipping: watch service unavailable");
        return;
    };

    service.stop();
    assert!(workspace.path_cache().watcher_closed());

    assert!(workspace.restart_watch_service());
    let restarted = workspace.watch_service().unwrap();
    assert!(!restarted.is_closed());
    assert!(!workspace.path_cache().watcher_closed());
    // Already running: nothing to do.
    assert!(workspace.restart_watch_service());

    workspace.shutdown().unwrap();
}
