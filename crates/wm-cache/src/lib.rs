//! Versioned cache abstraction for wm.
//!
//! Both long-lived caches in the sync pipeline — the traversal cache
//! (discovered page subtrees) and the render cache (HTML + search text per
//! node) — share one staleness rule: an entry is valid only while the remote
//! version stamp it was stored under still matches. This crate provides that
//! rule once, behind two traits:
//!
//! - [`VersionedCache`]: factory for named cache buckets
//! - [`CacheBucket`]: key-value store invalidated by a version stamp
//!
//! # Implementations
//!
//! - [`NullCache`] / [`NullBucket`]: no-op (always miss), for disabled caching
//! - [`FileCache`]: file-backed, wiped wholesale when the application
//!   version changes
//!
//! # Example
//!
//! ```
//! use wm_cache::{NullCache, VersionedCache};
//!
//! let cache = NullCache;
//! let bucket = cache.bucket("render");
//! bucket.put("0a1b2c", "v41", b"<p>hi</p>");
//! assert_eq!(bucket.get("0a1b2c", "v41"), None); // NullCache always misses
//! ```

mod file;
pub use file::FileCache;

/// A named partition within a [`VersionedCache`].
///
/// Stores key-value pairs where each value is guarded by an opaque version
/// stamp chosen by the caller (the content source's per-node version field).
/// A hit requires both the key and the stamp to match; a mismatched stamp is
/// indistinguishable from an absent entry.
pub trait CacheBucket: Send + Sync {
    /// Retrieve a cached value.
    ///
    /// Returns `Some(value)` only if the key exists **and** was stored under
    /// the same `stamp`. An empty `stamp` skips validation and returns
    /// whatever is stored.
    fn get(&self, key: &str, stamp: &str) -> Option<Vec<u8>>;

    /// Store a value, replacing any previous entry for `key` regardless of
    /// the stamp it was stored under. Failures are swallowed: caching is
    /// best-effort and must never fail a sync.
    fn put(&self, key: &str, stamp: &str, value: &[u8]);
}

/// Factory for named [`CacheBucket`]s.
///
/// Buckets are logically isolated from each other; the sync pipeline uses
/// `tree-pages`, `tree-collections`, and `render`.
pub trait VersionedCache: Send + Sync {
    /// Open or create a named bucket.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// No-op [`CacheBucket`]: every `get` misses, every `put` is discarded.
pub struct NullBucket;

impl CacheBucket for NullBucket {
    fn get(&self, _key: &str, _stamp: &str) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &str, _stamp: &str, _value: &[u8]) {}
}

/// No-op [`VersionedCache`] used when caching is disabled.
pub struct NullCache;

impl VersionedCache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullBucket)
    }
}
