//! Domain error types for the lock primitive and cache protocol.

use std::io;
use thiserror::Error;

/// Result alias for operations that may return a top-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Result alias for lock-specific fallible operations.
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Result alias for cache-specific fallible operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Failures from the advisory lock primitive (spec.md §7).
#[derive(Debug, Error)]
pub enum LockError {
    /// Shared acquisition was attempted on a path that does not exist.
    #[error("lock file does not exist")]
    NotFound,
    /// Acquisition did not complete within the requested timeout.
    #[error("timed out waiting for lock")]
    Timeout,
    /// The isolation worker did not confirm release of the lock.
    ///
    /// This is fatal: the owning process cannot continue holding an
    /// unconfirmed advisory lock on the inode.
    #[error("lock worker failed to confirm release")]
    ReleaseFailure,
    /// Any other filesystem failure while opening, locking, or communicating
    /// with the isolation worker.
    #[error("lock I/O error")]
    Io(#[from] io::Error),
}

/// Failures from the cache's get-or-create and clear operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Propagated failure from the underlying lock primitive.
    #[error("cache lock failed")]
    Lock(#[from] LockError),
    /// The caller-supplied `build` closure failed.
    #[error("cache entry build failed")]
    Build(#[source] BuildError),
    /// The supplied key is not a valid single path segment.
    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),
    /// Any other filesystem failure (rename, removal, directory creation).
    #[error("cache I/O error")]
    Io(#[from] io::Error),
}

/// Opaque error returned by a caller-supplied `build` closure.
///
/// Boxed so callers can return any error type at the `get_or_create`
/// boundary without this crate dictating their error hierarchy.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct BuildError(#[from] pub(crate) Box<dyn std::error::Error + Send + Sync>);

impl BuildError {
    /// Wraps any error implementing the standard error trait.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }
}

/// Top-level error exposed by the crate's CLI front-end.
#[derive(Debug, Error)]
pub enum Error {
    /// A lock operation failed.
    #[error("lock operation failed")]
    Lock(#[from] LockError),
    /// A cache operation failed.
    #[error("cache operation failed")]
    Cache(#[from] CacheError),
}
