//! Uses the external `flock(1)` utility as an independent referee to confirm
//! this crate's locks are real kernel-level advisory locks, not merely
//! in-process bookkeeping. Mirrors `tests.py`'s `test_shared`/`test_exclusive`
//! in the original implementation this crate was distilled from.

use fslock_cache::{LockMode, acquire_exclusive, acquire_shared};
use std::process::Command;
use tempfile::tempdir;

fn flock_conflicts(path: &camino::Utf8Path, mode: LockMode) -> bool {
    let flag = match mode {
        LockMode::Shared => "--shared",
        LockMode::Exclusive => "--exclusive",
    };
    let status = Command::new("flock")
        .args([flag, "--nonblock", "--conflict-exit-code", "43", path.as_str(), "-c", "true"])
        .status()
        .expect("invoke flock(1)");
    status.code() == Some(43)
}

#[test]
fn shared_lock_blocks_external_exclusive() {
    let dir = tempdir().expect("tempdir");
    let path = camino::Utf8Path::from_path(dir.path()).expect("utf8").join("shared");
    std::fs::write(&path, b"").expect("create file");

    let handle = acquire_shared(&path, None).expect("acquire shared");
    assert!(
        flock_conflicts(&path, LockMode::Exclusive),
        "external exclusive attempt must conflict with our shared lock"
    );

    handle.release().expect("release");
    assert!(
        !flock_conflicts(&path, LockMode::Exclusive),
        "external exclusive attempt must succeed once released"
    );
}

#[test]
fn exclusive_lock_blocks_external_shared() {
    let dir = tempdir().expect("tempdir");
    let path = camino::Utf8Path::from_path(dir.path()).expect("utf8").join("exclusive");

    let handle = acquire_exclusive(&path, None).expect("acquire exclusive");
    assert!(
        flock_conflicts(&path, LockMode::Shared),
        "external shared attempt must conflict with our exclusive lock"
    );

    handle.release().expect("release");
    assert!(
        !flock_conflicts(&path, LockMode::Shared),
        "external shared attempt must succeed once released"
    );
}
