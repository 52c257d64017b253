//! Multi-process advisory file locking and a lock-backed on-disk cache.
//!
//! [`lock`] provides `flock(2)`-based shared and exclusive locking on named
//! paths, isolated in a forked worker process so the locking descriptor is
//! never visible to unrelated code in the host process. [`cache`] layers a
//! get-or-create protocol and a bulk-clear operation on top of it.
//!
//! Unix only: both modules rely on `fork(2)` and `flock(2)`.

#[cfg(not(unix))]
compile_error!("fslock_cache relies on fork(2) and flock(2) and only builds on Unix targets");

pub mod cache;
mod cleanup_helpers;
pub mod error;
pub mod lock;
mod observability;

pub use cache::{CacheDir, CacheEntry, ClearReport};
pub use error::{BuildError, CacheError, Error, LockError, Result};
pub use lock::{LockHandle, LockMode, Timeout, acquire_exclusive, acquire_shared};
