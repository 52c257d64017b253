//! Key validation and sibling-path derivation for cache entries.

use crate::error::CacheError;
use camino::{Utf8Path, Utf8PathBuf};

/// Validates that `key` is usable as a single path segment.
///
/// The original implementation this crate was distilled from joins the key
/// into a path with no validation at all; this crate is intentionally
/// stricter, since a key containing `/` or `..` would let a caller escape
/// the cache directory.
///
/// # Errors
///
/// Returns [`CacheError::InvalidKey`] if `key` is empty, contains a path
/// separator, or is a `.`/`..` component.
pub(super) fn validate_key(key: &str) -> Result<(), CacheError> {
    let is_valid = !key.is_empty()
        && key != "."
        && key != ".."
        && !key.contains('/')
        && !key.contains('\\');
    if is_valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_owned()))
    }
}

/// Paths derived for a cache key (spec.md §3, §6).
#[derive(Debug, Clone)]
pub(super) struct EntryPaths {
    pub(super) lock: Utf8PathBuf,
    pub(super) cache: Utf8PathBuf,
    pub(super) temp: Utf8PathBuf,
}

impl EntryPaths {
    pub(super) fn new(dir: &Utf8Path, key: &str) -> Self {
        Self {
            lock: dir.join(format!("{key}.lock")),
            cache: dir.join(format!("{key}.cache")),
            temp: dir.join(format!("{key}.temp")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_key() {
        assert!(validate_key("").is_err());
    }

    #[test]
    fn rejects_path_separators() {
        assert!(validate_key("a/b").is_err());
        assert!(validate_key("a\\b").is_err());
    }

    #[test]
    fn rejects_dot_components() {
        assert!(validate_key(".").is_err());
        assert!(validate_key("..").is_err());
    }

    #[test]
    fn accepts_ordinary_keys() {
        assert!(validate_key("key123").is_ok());
        assert!(validate_key("a.b-c_d").is_ok());
    }

    #[test]
    fn derives_sibling_paths() {
        let dir = Utf8Path::new("/tmp/cache");
        let paths = EntryPaths::new(dir, "k");
        assert_eq!(paths.lock, Utf8PathBuf::from("/tmp/cache/k.lock"));
        assert_eq!(paths.cache, Utf8PathBuf::from("/tmp/cache/k.cache"));
        assert_eq!(paths.temp, Utf8PathBuf::from("/tmp/cache/k.temp"));
    }
}
