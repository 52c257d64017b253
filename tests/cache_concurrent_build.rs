//! Races two threads through `get_or_create` on the same key. Each call
//! forks its own lock worker, so the contention here is real inter-process
//! mutual exclusion, not merely in-process bookkeeping. Mirrors the
//! single-builder guarantee `cache_get_or_set` provides in the original
//! implementation this crate was distilled from.

use camino::Utf8PathBuf;
use fslock_cache::CacheDir;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn only_one_thread_builds_a_contended_key() {
    let dir = tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 tempdir");
    let cache = Arc::new(CacheDir::new(root));
    let builds = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let builds = Arc::clone(&builds);
            thread::spawn(move || {
                cache
                    .get_or_create("contended", |path| -> Result<(), std::io::Error> {
                        builds.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        std::fs::write(path, b"payload")
                    })
                    .expect("get_or_create")
            })
        })
        .collect();

    for handle in handles {
        let entry = handle.join().expect("thread join");
        assert_eq!(std::fs::read(&*entry).expect("read entry"), b"payload");
    }

    assert_eq!(builds.load(Ordering::SeqCst), 1, "build must run exactly once under contention");
}
