use super::*;
use std::cell::Cell;
use std::fs;
use std::io;
use tempfile::tempdir;

fn cache_dir() -> (tempfile::TempDir, CacheDir) {
    let dir = tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    let cache = CacheDir::new(root);
    (dir, cache)
}

#[test]
fn get_or_create_builds_once_and_reuses() {
    let (_dir, cache) = cache_dir();
    let calls = Cell::new(0u32);

    let entry = cache
        .get_or_create("widget", |path| -> Result<(), io::Error> {
            calls.set(calls.get() + 1);
            fs::write(path, b"contents")
        })
        .expect("first get_or_create");
    assert_eq!(fs::read(&*entry).expect("read entry"), b"contents");
    drop(entry);

    let second = cache
        .get_or_create("widget", |path| -> Result<(), io::Error> { fs::write(path, b"contents") })
        .expect("second get_or_create");
    drop(second);

    assert_eq!(calls.get(), 1, "build must run exactly once for a hit cache");
}

#[test]
fn get_or_create_cleans_up_on_build_failure() {
    let (_dir, cache) = cache_dir();

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    let result = cache.get_or_create("broken", |path| -> Result<(), Boom> {
        fs::write(path, b"partial").expect("write staging");
        Err(Boom)
    });

    assert!(matches!(result, Err(CacheError::Build(_))));

    let entry_paths = EntryPaths::new(cache.root(), "broken");
    assert!(!entry_paths.temp.exists(), "staging debris must be removed on failure");
    assert!(!entry_paths.cache.exists(), "no entry must be published on failure");
}

#[test]
fn get_or_create_rejects_invalid_keys() {
    let (_dir, cache) = cache_dir();
    let result = cache.get_or_create("../escape", |path| -> Result<(), io::Error> { fs::write(path, b"x") });
    assert!(matches!(result, Err(CacheError::InvalidKey(_))));
}

#[test]
fn clear_removes_matching_entries() {
    let (_dir, cache) = cache_dir();
    cache
        .get_or_create("keep", |path| -> Result<(), io::Error> { fs::write(path, b"k") })
        .expect("create keep");
    cache
        .get_or_create("drop-me", |path| -> Result<(), io::Error> { fs::write(path, b"d") })
        .expect("create drop-me");

    let report = cache
        .clear(|key| key.starts_with("drop"), true)
        .expect("clear");

    assert_eq!(report.deleted, vec!["drop-me".to_owned()]);
    assert!(report.skipped.is_empty());

    let kept = EntryPaths::new(cache.root(), "keep");
    let removed = EntryPaths::new(cache.root(), "drop-me");
    assert!(kept.cache.exists());
    assert!(!removed.cache.exists());
    assert!(!removed.lock.exists());
}

#[test]
fn clear_skips_locked_entry_when_only_if_possible() {
    let (_dir, cache) = cache_dir();
    cache
        .get_or_create("busy", |path| -> Result<(), io::Error> { fs::write(path, b"b") })
        .expect("create busy");

    let entry_paths = EntryPaths::new(cache.root(), "busy");
    let holder = lock::acquire_shared(&entry_paths.lock, None).expect("hold shared lock");

    let report = cache.clear(|_| true, true).expect("clear");
    assert!(report.deleted.is_empty());
    assert_eq!(report.skipped, vec!["busy".to_owned()]);
    assert!(entry_paths.cache.exists(), "locked entry must survive");

    holder.release().expect("release");
}
