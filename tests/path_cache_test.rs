//! Path cache behavior: directory index, MRU lists, availability tracking
//! and persistence.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figcache::cache::{
    Category, DEFAULT_UNAVAILABLE_GRACE, ExtensionClassifier, FileClassifier, PathCache,
};
use figcache::watcher::{ChangeBatch, ChangeEvent, ChangeKind, ChangeListener, DirectoryRegistrar};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tempfile::TempDir;

fn classifier() -> Arc<dyn FileClassifier> {
    let mut categories = IndexMap::new();
    categories.insert("doc".to_string(), vec!["fyp".to_string()]);
    categories.insert("data".to_string(), vec!["csv".to_string()]);
    Arc::new(ExtensionClassifier::new(&categories))
}

fn doc() -> Category {
    Category::new("doc").unwrap()
}

fn data() -> Category {
    Category::new("data").unwrap()
}

fn cache() -> PathCache {
    PathCache::with_options(classifier(), 20, DEFAULT_UNAVAILABLE_GRACE)
}

fn touch(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"x").unwrap();
    path.to_path_buf()
}

fn names(cache: &PathCache, dir: &Path) -> Vec<String> {
    cache
        .directory_entry(dir)
        .map(|e| e.files().map(|(n, _)| n.to_string()).collect())
        .unwrap_or_default()
}

fn recent_paths(cache: &PathCache, category: &Category) -> Vec<PathBuf> {
    cache
        .recent_files(category)
        .into_iter()
        .map(|t| t.path)
        .collect()
}

#[derive(Default)]
struct RecordingRegistrar {
    registered: Mutex<Vec<PathBuf>>,
    unregistered: Mutex<Vec<PathBuf>>,
}

impl DirectoryRegistrar for RecordingRegistrar {
    fn register_directory(&self, path: &Path) -> bool {
        self.registered.lock().push(path.to_path_buf());
        true
    }

    fn unregister_directory(&self, path: &Path) {
        self.unregistered.lock().push(path.to_path_buf());
    }
}

#[test]
fn test_adding_same_file_twice_keeps_one_entry() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let a = touch(&figs.join("a.fyp"));
    let cache = cache();

    assert!(cache.add_file(&a));
    assert!(cache.add_file(&a));

    assert_eq!(names(&cache, &figs), vec!["a.fyp"]);
    assert_eq!(recent_paths(&cache, &doc()), vec![a]);
}

#[test]
fn test_unrecognized_file_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let notes = touch(&temp_dir.path().join("notes.txt"));
    let cache = cache();

    assert!(!cache.add_file(&notes));
    assert_eq!(cache.directory_count(), 0);
}

#[test]
fn test_first_file_registers_and_scans_directory() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let a = touch(&figs.join("a.fyp"));
    touch(&figs.join("b.fyp"));
    touch(&figs.join("run.csv"));
    touch(&figs.join("notes.txt"));
    fs::create_dir(figs.join("sub.fyp")).unwrap();

    let cache = cache();
    let registrar = Arc::new(RecordingRegistrar::default());
    cache.attach_watcher(registrar.clone());

    cache.add_file(&a);

    assert_eq!(*registrar.registered.lock(), vec![figs.clone()]);
    assert_eq!(names(&cache, &figs), vec!["a.fyp", "b.fyp", "run.csv"]);
    let entry = cache.directory_entry(&figs).unwrap();
    assert_eq!(entry.category("run.csv"), Some(&data()));
    // Only explicitly added files become recent.
    assert_eq!(recent_paths(&cache, &doc()), vec![a]);
}

#[test]
fn test_mru_is_capped_and_most_recent_first() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache();
    let files: Vec<PathBuf> = (0..25)
        .map(|i| touch(&temp_dir.path().join(format!("f{i:02}.fyp"))))
        .collect();
    for file in &files {
        cache.add_file(file);
    }

    let recent = recent_paths(&cache, &doc());
    assert_eq!(recent.len(), 20);
    assert_eq!(recent[0], files[24]);
    assert_eq!(recent[19], files[5]);

    // Re-adding promotes without duplicating.
    cache.add_file(&files[10]);
    let recent = recent_paths(&cache, &doc());
    assert_eq!(recent.len(), 20);
    assert_eq!(recent[0], files[10]);
    assert_eq!(cache.most_recent_file(&doc()), Some(files[10].clone()));
}

#[test]
fn test_rename_across_directories() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let other = temp_dir.path().join("other");
    let a = touch(&figs.join("a.fyp"));
    fs::create_dir_all(&other).unwrap();

    let cache = cache();
    let registrar = Arc::new(RecordingRegistrar::default());
    cache.attach_watcher(registrar.clone());
    cache.add_file(&a);

    let b = other.join("b.fyp");
    fs::rename(&a, &b).unwrap();
    assert!(cache.rename_file(&a, &b));

    assert!(!names(&cache, &figs).contains(&"a.fyp".to_string()));
    assert_eq!(names(&cache, &other), vec!["b.fyp"]);
    assert_eq!(recent_paths(&cache, &doc()), vec![b]);
    assert!(registrar.unregistered.lock().contains(&figs));
    assert!(registrar.registered.lock().contains(&other));
}

#[test]
fn test_rename_in_place_keeps_positions() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    let a = touch(&dir.join("a.fyp"));
    let c = touch(&dir.join("c.fyp"));

    let cache = cache();
    cache.add_file(&a);
    cache.add_file(&c);
    assert_eq!(names(&cache, &dir), vec!["a.fyp", "c.fyp"]);

    let z = dir.join("z.fyp");
    fs::rename(&a, &z).unwrap();
    assert!(cache.rename_file(&a, &z));

    assert_eq!(names(&cache, &dir), vec!["z.fyp", "c.fyp"]);
    assert_eq!(recent_paths(&cache, &doc()), vec![c, z]);
}

#[test]
fn test_rename_to_missing_target_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let a = touch(&temp_dir.path().join("a.fyp"));
    let cache = cache();
    cache.add_file(&a);

    assert!(!cache.rename_file(&a, &temp_dir.path().join("ghost.fyp")));
    assert_eq!(recent_paths(&cache, &doc()), vec![a]);
}

#[test]
fn test_remove_keeps_live_file_in_directory_index() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    let a = touch(&dir.join("a.fyp"));
    let cache = cache();
    cache.add_file(&a);

    assert!(cache.remove_file(&a));
    assert_eq!(names(&cache, &dir), vec!["a.fyp"]);
    assert!(recent_paths(&cache, &doc()).is_empty());
}

#[test]
fn test_remove_deleted_file_prunes_directory() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let a = touch(&figs.join("a.fyp"));
    let cache = cache();
    let registrar = Arc::new(RecordingRegistrar::default());
    cache.attach_watcher(registrar.clone());
    cache.add_file(&a);

    fs::remove_file(&a).unwrap();
    assert!(cache.remove_file(&a));

    assert!(cache.directory_entry(&figs).is_none());
    assert_eq!(*registrar.unregistered.lock(), vec![figs]);
}

#[test]
fn test_deleted_file_stays_recent_until_probed() {
    let temp_dir = TempDir::new().unwrap();
    let a = touch(&temp_dir.path().join("a.fyp"));
    let b = touch(&temp_dir.path().join("b.fyp"));
    let cache = cache();
    cache.add_file(&a);
    cache.add_file(&b);

    fs::remove_file(&b).unwrap();
    // Nothing has looked yet.
    assert!(cache.availability_of(&b).is_available());

    let recent = cache.recent_files(&doc());
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].path, b);
    assert!(!recent[0].is_available());
    assert!(cache.availability_of(&b).since().is_some());
    assert_eq!(cache.most_recent_file(&doc()), Some(a));
}

#[test]
fn test_remove_deleted_file_before_any_probe() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let a = touch(&figs.join("a.fyp"));
    let b = touch(&figs.join("b.fyp"));
    let cache = cache();
    cache.add_file(&a);
    cache.add_file(&b);

    fs::remove_file(&b).unwrap();
    assert!(cache.availability_of(&b).is_available());
    assert!(cache.remove_file(&b));

    // Gone from both the MRU list and the index; the directory stays.
    assert_eq!(recent_paths(&cache, &doc()), vec![a.clone()]);
    assert_eq!(names(&cache, &figs), vec!["a.fyp"]);
    assert_eq!(cache.most_recent_file(&doc()), Some(a));
}

#[test]
fn test_rescan_keeps_files_added_concurrently() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let seed = touch(&figs.join("seed.fyp"));
    let cache = Arc::new(cache());
    cache.add_file(&seed);

    let files: Vec<PathBuf> = (0..40).map(|i| figs.join(format!("f{i:02}.fyp"))).collect();
    let adder = {
        let cache = Arc::clone(&cache);
        let files = files.clone();
        std::thread::spawn(move || {
            for file in &files {
                touch(file);
                cache.add_file(file);
            }
        })
    };
    while !adder.is_finished() {
        cache.rescan_directory(&figs);
    }
    adder.join().unwrap();

    let indexed = names(&cache, &figs);
    assert_eq!(indexed.len(), files.len() + 1);
    for file in &files {
        let name = file.file_name().unwrap().to_str().unwrap();
        assert!(indexed.iter().any(|n| n == name), "{name} lost by rescan");
    }
}

#[test]
fn test_reappearing_file_becomes_available_again() {
    let temp_dir = TempDir::new().unwrap();
    let a = touch(&temp_dir.path().join("a.fyp"));
    let cache = cache();
    cache.add_file(&a);

    fs::remove_file(&a).unwrap();
    assert!(!cache.recent_files(&doc())[0].is_available());

    touch(&a);
    assert!(cache.recent_files(&doc())[0].is_available());
    assert!(cache.availability_of(&a).is_available());
}

#[test]
fn test_missing_entries_purged_after_grace() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let a = touch(&figs.join("a.fyp"));
    let cache = PathCache::with_options(classifier(), 20, Duration::from_millis(50));
    cache.add_file(&a);

    fs::remove_dir_all(&figs).unwrap();
    assert_eq!(cache.recent_files(&doc()).len(), 1);
    assert_eq!(cache.directories(&doc()).len(), 1);

    std::thread::sleep(Duration::from_millis(150));
    assert!(cache.recent_files(&doc()).is_empty());
    assert!(cache.directories(&doc()).is_empty());
    assert_eq!(cache.directory_count(), 0);
}

#[test]
fn test_directories_and_files_by_category() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let runs = temp_dir.path().join("runs");
    let a = touch(&figs.join("a.fyp"));
    let r = touch(&runs.join("r.csv"));
    let cache = cache();
    cache.add_file(&a);
    cache.add_file(&r);

    let doc_dirs: Vec<PathBuf> = cache.directories(&doc()).into_iter().map(|t| t.path).collect();
    assert_eq!(doc_dirs, vec![figs.clone()]);
    let files: Vec<PathBuf> = cache.files(&runs, &data()).into_iter().map(|t| t.path).collect();
    assert_eq!(files, vec![r.clone()]);
    assert!(cache.files(&runs, &doc()).is_empty());

    let recent_dirs: Vec<PathBuf> = cache
        .recent_directories(&data())
        .into_iter()
        .map(|t| t.path)
        .collect();
    assert_eq!(recent_dirs, vec![runs]);
}

#[test]
fn test_save_and_load() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let a = touch(&figs.join("a.fyp"));
    let b = touch(&figs.join("b.fyp"));
    let cache_file = temp_dir.path().join("state").join("paths.cache");

    let cache = cache();
    cache.add_file(&a);
    cache.add_file(&b);
    cache.save(&cache_file).unwrap();

    let restored = self::cache();
    assert_eq!(restored.load(&cache_file).unwrap(), 3);
    assert_eq!(restored.snapshot(), cache.snapshot());
    assert_eq!(recent_paths(&restored, &doc()), vec![b, a]);
}

#[test]
fn test_load_missing_file_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache();
    assert_eq!(cache.load(&temp_dir.path().join("none.cache")).unwrap(), 0);
}

#[test]
fn test_load_skips_expired_entries() {
    let temp_dir = TempDir::new().unwrap();
    let cache_file = temp_dir.path().join("paths.cache");
    let live = touch(&temp_dir.path().join("figs").join("a.fyp"));
    let text = format!(
        "version=1\n\
         doc: OK {live}\n\
         doc: 1 /gone/old.fyp\n\
         : 1 /gone\n\
         doc old.fyp\n",
        live = live.display()
    );
    fs::write(&cache_file, text).unwrap();

    let cache = cache();
    assert_eq!(cache.load(&cache_file).unwrap(), 1);
    assert_eq!(recent_paths(&cache, &doc()), vec![live]);
    assert_eq!(cache.directory_count(), 0);
}

#[test]
fn test_load_rejects_other_versions() {
    let temp_dir = TempDir::new().unwrap();
    let cache_file = temp_dir.path().join("paths.cache");
    fs::write(&cache_file, "version=2\ndoc: OK /figs/a.fyp\n").unwrap();

    let cache = cache();
    assert!(cache.load(&cache_file).is_err());
    assert!(recent_paths(&cache, &doc()).is_empty());
}

#[test]
fn test_change_notifications_drive_the_cache() {
    let temp_dir = TempDir::new().unwrap();
    let figs = temp_dir.path().join("figs");
    let a = touch(&figs.join("a.fyp"));
    let cache = cache();

    cache.on_changes(&ChangeBatch::single(ChangeEvent::new(ChangeKind::Create, &a)));
    assert_eq!(recent_paths(&cache, &doc()), vec![a.clone()]);

    cache.on_changes(&ChangeBatch::single(ChangeEvent::new(ChangeKind::Dropped, &figs)));
    assert!(!cache.availability_of(&figs).is_available());

    cache.on_changes(&ChangeBatch::single(ChangeEvent::new(ChangeKind::Restored, &figs)));
    assert!(cache.availability_of(&figs).is_available());

    fs::remove_file(&a).unwrap();
    cache.on_changes(&ChangeBatch::single(ChangeEvent::new(ChangeKind::Delete, &a)));
    assert!(recent_paths(&cache, &doc()).is_empty());
    assert!(cache.directory_entry(&figs).is_none());

    assert!(!cache.watcher_closed());
    cache.on_changes(&ChangeBatch::single(ChangeEvent::closed()));
    assert!(cache.watcher_closed());
}
