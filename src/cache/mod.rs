//! A get-or-create cache protocol layered on the advisory lock primitive.
//!
//! [`CacheDir::get_or_create`] serialises creation of a missing entry behind
//! an exclusive lock, atomically publishes it by rename, and lets any
//! number of readers observe it concurrently under a shared lock.
//! [`CacheDir::clear`] purges entries in bulk without racing readers or
//! writers. See spec.md §4.2 for the algorithm this module implements.

mod paths;

use crate::error::{BuildError, CacheError, CacheResult, LockError};
use crate::lock::{self, Timeout};
use crate::observability::CACHE_TARGET;
use camino::{Utf8Path, Utf8PathBuf};
use paths::EntryPaths;
use std::ops::Deref;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-entry timeout used for the retry pass of a non-`only_if_possible`
/// [`CacheDir::clear`] call. Sixty seconds is the canonical value (spec.md
/// §4.2).
const CLEAR_RETRY_TIMEOUT: Duration = Duration::from_secs(60);

/// A directory on the local filesystem used as a namespace for cache
/// entries. Holds no in-memory state beyond the root path; all state lives
/// in files (spec.md §3).
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: Utf8PathBuf,
}

impl CacheDir {
    /// Creates a handle onto `root`. Does not touch the filesystem; the
    /// directory is created lazily on first use.
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache directory's root path.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the existing entry for `key`, or creates it by invoking
    /// `build` with a staging path and atomically publishing the result.
    ///
    /// `build` may run more than once across the lifetime of the cache
    /// (e.g. if the entry is concurrently cleared between this call's
    /// publish and its re-check), but the lock primitive guarantees at most
    /// one invocation is ever in flight for a given key at a given instant.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] if `key` is not a valid single
    /// path segment. Returns [`CacheError::Build`] if `build` fails — the
    /// staging path is removed before the error is propagated and no entry
    /// is published. Returns [`CacheError::Lock`] or [`CacheError::Io`] for
    /// underlying failures.
    pub fn get_or_create<F, E>(&self, key: &str, build: F) -> CacheResult<CacheEntry>
    where
        F: Fn(&Utf8Path) -> Result<(), E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        paths::validate_key(key)?;
        std::fs::create_dir_all(self.root.as_std_path())?;
        let entry_paths = EntryPaths::new(&self.root, key);

        loop {
            if let Some(entry) = self.try_read(key, &entry_paths)? {
                return Ok(entry);
            }
            self.try_create(key, &entry_paths, &build)?;
            // Whether this call published the entry or lost the race to
            // another creator, restart into the reader path so the caller
            // never observes an exclusive lock, only shared.
        }
    }

    /// Attempts the reader path: a shared lock that finds the entry already
    /// present. Returns `Ok(None)` to signal "fall through to the creator
    /// path" per spec.md §4.2.
    fn try_read(&self, key: &str, entry_paths: &EntryPaths) -> CacheResult<Option<CacheEntry>> {
        match lock::acquire_shared(&entry_paths.lock, None) {
            Ok(handle) => {
                if entry_paths.cache.exists() {
                    touch_recency(&entry_paths.lock);
                    debug!(target: CACHE_TARGET, key, "cache hit");
                    Ok(Some(CacheEntry {
                        path: entry_paths.cache.clone(),
                        _lock: handle,
                    }))
                } else {
                    // Entry vanished between our lock and our check
                    // (concurrent clear); fall through to the creator path.
                    drop(handle);
                    Ok(None)
                }
            }
            Err(LockError::NotFound) => Ok(None),
            Err(other) => Err(CacheError::Lock(other)),
        }
    }

    /// Attempts the creator path: an exclusive lock, a build, and an
    /// atomic publish. Leaves the entry alone if another process already
    /// published it while this call waited for the lock.
    fn try_create<F, E>(&self, key: &str, entry_paths: &EntryPaths, build: &F) -> CacheResult<()>
    where
        F: Fn(&Utf8Path) -> Result<(), E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let handle = lock::acquire_exclusive(&entry_paths.lock, None)?;

        if entry_paths.cache.exists() {
            // Created while we waited for the exclusive lock. Advisory
            // locks cannot be downgraded atomically, so restart via the
            // reader path rather than risk a writer intervening in the gap.
            drop(handle);
            return Ok(());
        }

        crate::cleanup_helpers::remove_path_best_effort(entry_paths.temp.as_std_path())?;

        match build(&entry_paths.temp) {
            Ok(()) => {
                std::fs::rename(&entry_paths.temp, &entry_paths.cache)?;
                info!(target: CACHE_TARGET, key, "published cache entry");
                drop(handle);
                Ok(())
            }
            Err(err) => {
                let _ = crate::cleanup_helpers::remove_path_best_effort(entry_paths.temp.as_std_path());
                drop(handle);
                Err(CacheError::Build(BuildError::new(err)))
            }
        }
    }

    /// Enumerates `.cache` entries in lexicographic order and deletes each
    /// for which `should_delete` returns `true`.
    ///
    /// When `only_if_possible` is `true`, deletion uses a zero timeout per
    /// entry; a currently-locked entry is skipped and reported rather than
    /// waited for. When `false`, a first zero-timeout pass is followed by a
    /// bounded retry pass (see [`CLEAR_RETRY_TIMEOUT`]) for entries skipped
    /// the first time.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if enumerating or removing an entry fails
    /// for a reason other than lock contention.
    pub fn clear(
        &self,
        should_delete: impl Fn(&str) -> bool,
        only_if_possible: bool,
    ) -> CacheResult<ClearReport> {
        let candidates: Vec<String> = self
            .list_keys()?
            .into_iter()
            .filter(|key| should_delete(key))
            .collect();

        let mut deleted = Vec::new();
        let mut pending = Vec::new();
        for key in candidates {
            if self.try_delete(&key, Some(Duration::ZERO))? {
                deleted.push(key);
            } else {
                pending.push(key);
            }
        }

        let skipped = if only_if_possible {
            pending
        } else {
            let mut still_skipped = Vec::new();
            for key in pending {
                if self.try_delete(&key, Some(CLEAR_RETRY_TIMEOUT))? {
                    deleted.push(key);
                } else {
                    still_skipped.push(key);
                }
            }
            still_skipped
        };

        for key in &skipped {
            warn!(target: CACHE_TARGET, key, "clear skipped locked entry");
        }

        deleted.sort();
        Ok(ClearReport { deleted, skipped })
    }

    /// Attempts to delete one entry under an exclusive lock bounded by
    /// `timeout`. Returns `Ok(false)` on contention timeout rather than an
    /// error, since that is the expected "skip this entry" outcome.
    fn try_delete(&self, key: &str, timeout: Timeout) -> CacheResult<bool> {
        let entry_paths = EntryPaths::new(&self.root, key);
        match lock::acquire_exclusive(&entry_paths.lock, timeout) {
            Ok(handle) => {
                crate::cleanup_helpers::remove_path_best_effort(entry_paths.cache.as_std_path())?;
                std::fs::remove_file(&entry_paths.lock).or_else(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        Ok(())
                    } else {
                        Err(err)
                    }
                })?;
                crate::cleanup_helpers::remove_path_best_effort(entry_paths.temp.as_std_path())?;
                // `handle` drops at the end of this scope, releasing the
                // lock the worker holds via the (now unlinked) inode —
                // fine under POSIX unlink-while-open semantics.
                drop(handle);
                Ok(true)
            }
            Err(LockError::Timeout) => Ok(false),
            Err(other) => Err(CacheError::Lock(other)),
        }
    }

    /// Lists keys that currently have a `.cache` entry, sorted
    /// lexicographically by key.
    fn list_keys(&self) -> CacheResult<Vec<String>> {
        let entries = match std::fs::read_dir(self.root.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CacheError::Io(err)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Some(key) = name.strip_suffix(".cache") {
                keys.push(key.to_owned());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Best-effort recency hint: advances `<key>.lock`'s mtime. Failure is
/// logged, not propagated, since it supports external LRU purgers but is
/// not itself part of the purging algorithm (spec.md §3).
fn touch_recency(lock_path: &Utf8Path) {
    let now = filetime::FileTime::now();
    if let Err(err) = filetime::set_file_mtime(lock_path, now) {
        warn!(
            target: CACHE_TARGET,
            path = %lock_path,
            %err,
            "failed to update lock file recency"
        );
    }
}

/// Result of a [`CacheDir::clear`] call: which keys were deleted and which
/// were skipped because they were locked throughout the attempted passes.
#[derive(Debug, Clone, Default)]
pub struct ClearReport {
    /// Keys whose entries were removed.
    pub deleted: Vec<String>,
    /// Keys left untouched because they stayed locked.
    pub skipped: Vec<String>,
}

/// A materialised cache entry, held open under a shared lock for as long as
/// this value lives. Dereferences to the entry's path.
#[derive(Debug)]
pub struct CacheEntry {
    path: Utf8PathBuf,
    _lock: lock::LockHandle,
}

impl CacheEntry {
    /// The path to the materialised entry (file or directory).
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Deref for CacheEntry {
    type Target = Utf8Path;

    fn deref(&self) -> &Utf8Path {
        &self.path
    }
}

#[cfg(test)]
mod tests;
