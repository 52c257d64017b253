//! Shared tracing targets for observability instrumentation.
//!
//! Centralises the log targets used by the crate so subscribers can filter
//! lock and cache events independently of unrelated application logs.

/// Target used by lock acquisition/release spans and logs.
pub(crate) const LOCK_TARGET: &str = "fslock_cache::lock";

/// Target used by cache protocol spans and logs.
pub(crate) const CACHE_TARGET: &str = "fslock_cache::cache";
