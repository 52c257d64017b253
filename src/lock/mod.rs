//! POSIX advisory locking over a named filesystem path.
//!
//! [`acquire_shared`] and [`acquire_exclusive`] take a shared or exclusive
//! `flock(2)` lock on a path, optionally bounded by a timeout. Acquisition
//! runs inside a forked worker process so the locking file descriptor can
//! never be closed by unrelated activity elsewhere in the host process (see
//! [`worker`] for why this isolation boundary is not optional).
//!
//! Locks are released by dropping the returned [`LockHandle`], or explicitly
//! via [`LockHandle::release`] to observe a [`LockError::ReleaseFailure`]
//! synchronously rather than on a best-effort drop.

mod protocol;
mod worker;

use crate::error::{LockError, LockResult};
use camino::{Utf8Path, Utf8PathBuf};
use std::time::Duration;
use tracing::error;

/// The mode in which a path is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Compatible with other shared holders; excludes exclusive holders.
    Shared,
    /// Excludes every other holder, shared or exclusive.
    Exclusive,
}

/// How long an acquisition attempt should wait before giving up.
///
/// `None` blocks indefinitely. `Some(Duration::ZERO)` tries once without
/// blocking. `Some(d)` for `d > 0` blocks up to `d`.
pub type Timeout = Option<Duration>;

/// A held advisory lock on a single path.
///
/// Not [`Clone`]: a handle has exactly one owner within its host process and
/// is consumed on release. Released automatically on drop; use
/// [`LockHandle::release`] to observe failures.
#[derive(Debug)]
pub struct LockHandle {
    path: Utf8PathBuf,
    mode: LockMode,
    worker: Option<worker::WorkerLock>,
}

impl LockHandle {
    /// The locked path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The mode this handle was acquired in.
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }

    /// Releases the lock, returning an error if the worker did not confirm
    /// release.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::ReleaseFailure`] if the isolation worker exited
    /// with a non-zero status. Per this crate's error handling design, that
    /// condition is meant to be treated as fatal by the caller: the process
    /// cannot continue holding an advisory lock the kernel never confirmed
    /// was dropped.
    pub fn release(mut self) -> LockResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> LockResult<()> {
        match self.worker.take() {
            Some(worker) => worker::release(worker, &self.path, self.mode),
            None => Ok(()),
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        if let Err(err) = self.release_inner() {
            error!(
                target: crate::observability::LOCK_TARGET,
                path = %self.path,
                ?err,
                "lock release failed during drop; aborting"
            );
            std::process::abort();
        }
    }
}

/// Acquires a shared lock on `path`.
///
/// # Errors
///
/// Returns [`LockError::NotFound`] if `path` does not exist — unlike
/// exclusive acquisition, a shared acquisition never creates the file.
/// Returns [`LockError::Timeout`] if `timeout` elapses first.
pub fn acquire_shared(path: impl AsRef<Utf8Path>, timeout: Timeout) -> LockResult<LockHandle> {
    acquire(path.as_ref(), LockMode::Shared, timeout)
}

/// Acquires an exclusive lock on `path`, creating it if it does not exist.
///
/// # Errors
///
/// Returns [`LockError::Timeout`] if `timeout` elapses first.
pub fn acquire_exclusive(path: impl AsRef<Utf8Path>, timeout: Timeout) -> LockResult<LockHandle> {
    acquire(path.as_ref(), LockMode::Exclusive, timeout)
}

fn acquire(path: &Utf8Path, mode: LockMode, timeout: Timeout) -> LockResult<LockHandle> {
    let held = worker::acquire(path, mode, timeout)?;
    Ok(LockHandle {
        path: path.to_path_buf(),
        mode,
        worker: Some(held),
    })
}

/// Thin public wrapper naming a shared acquisition, matching the
/// `FSLockShared` surface of the original implementation this crate was
/// distilled from.
///
/// # Errors
///
/// See [`acquire_shared`].
pub fn fs_lock_shared(path: impl AsRef<Utf8Path>, timeout: Timeout) -> LockResult<LockHandle> {
    acquire_shared(path, timeout)
}

/// Thin public wrapper naming an exclusive acquisition, matching the
/// `FSLockExclusive` surface of the original implementation this crate was
/// distilled from.
///
/// # Errors
///
/// See [`acquire_exclusive`].
pub fn fs_lock_exclusive(path: impl AsRef<Utf8Path>, timeout: Timeout) -> LockResult<LockHandle> {
    acquire_exclusive(path, timeout)
}
