//! File-backed versioned cache.
//!
//! [`FileCache`] stores each entry as one file under a bucket subdirectory.
//! The entry format is a small binary header followed by the payload:
//!
//! ```text
//! [stamp_len: u32 LE][stamp bytes][payload bytes]
//! ```
//!
//! Reads validate the stamp from the header before touching the payload, so
//! a stale entry costs only a header read. Unreadable or truncated entries
//! are treated as misses.
//!
//! On construction the cache validates a `VERSION` file in its root against
//! the running application version; a mismatch wipes the whole directory.
//! Entry formats and cached type shapes may change between releases, and a
//! wiped cache merely costs one cold sync.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::{CacheBucket, VersionedCache};

/// File-backed [`VersionedCache`] rooted at a directory.
///
/// Layout:
/// ```text
/// {root}/
/// +-- VERSION            # application version the cache was written by
/// +-- tree-pages/        # bucket
/// |   +-- <node id>      # entry
/// +-- render/
///     +-- ...
/// ```
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open the cache at `root`, wiping it if `app_version` does not match
    /// the stored `VERSION` file. Never fails; problems are logged and the
    /// cache degrades to empty.
    #[must_use]
    pub fn open(root: PathBuf, app_version: &str) -> Self {
        reset_on_version_change(&root, app_version);
        Self { root }
    }
}

impl VersionedCache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileBucket {
            dir: self.root.join(name),
        })
    }
}

/// One bucket, backed by one subdirectory.
struct FileBucket {
    dir: PathBuf,
}

impl CacheBucket for FileBucket {
    fn get(&self, key: &str, stamp: &str) -> Option<Vec<u8>> {
        let mut file = File::open(self.dir.join(entry_name(key))).ok()?;

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf).ok()?;
        let stamp_len = u32::from_le_bytes(len_buf) as usize;

        let mut stored_stamp = vec![0u8; stamp_len];
        file.read_exact(&mut stored_stamp).ok()?;

        if !stamp.is_empty() && stored_stamp != stamp.as_bytes() {
            return None;
        }

        let mut data = Vec::new();
        file.read_to_end(&mut data).ok()?;
        Some(data)
    }

    fn put(&self, key: &str, stamp: &str, value: &[u8]) {
        if fs::create_dir_all(&self.dir).is_err() {
            return;
        }

        let stamp_bytes = stamp.as_bytes();
        let mut buf = Vec::with_capacity(4 + stamp_bytes.len() + value.len());
        buf.extend_from_slice(&(stamp_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(stamp_bytes);
        buf.extend_from_slice(value);

        if let Err(e) = fs::write(self.dir.join(entry_name(key)), &buf) {
            tracing::debug!("cache write failed for {key}: {e}");
        }
    }
}

/// Map a cache key to a filename. Keys are canonical node ids (compact hex)
/// in practice, but anything path-hostile is escaped just in case.
fn entry_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Wipe the cache directory when the stored version differs.
fn reset_on_version_change(root: &Path, app_version: &str) {
    let version_file = root.join("VERSION");

    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == app_version => {
            tracing::debug!("cache version matches: {app_version}");
            return;
        }
        Ok(stored) => {
            tracing::info!(
                "cache version changed (stored={stored}, current={app_version}), wiping cache"
            );
        }
        Err(_) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
    }

    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return;
    }
    if let Err(e) = fs::write(&version_file, app_version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_and_get() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");
        let bucket = cache.bucket("render");

        bucket.put("0a1b", "stamp-1", b"<p>hello</p>");
        assert_eq!(bucket.get("0a1b", "stamp-1"), Some(b"<p>hello</p>".to_vec()));
    }

    #[test]
    fn test_stale_stamp_misses() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");
        let bucket = cache.bucket("render");

        bucket.put("key", "v41", b"data");

        assert_eq!(bucket.get("key", "v41"), Some(b"data".to_vec()));
        assert_eq!(bucket.get("key", "v42"), None);
    }

    #[test]
    fn test_empty_stamp_skips_validation() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");
        let bucket = cache.bucket("render");

        bucket.put("key", "v41", b"data");
        assert_eq!(bucket.get("key", ""), Some(b"data".to_vec()));
    }

    #[test]
    fn test_missing_key_misses() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");
        let bucket = cache.bucket("render");

        assert_eq!(bucket.get("nope", "v1"), None);
    }

    #[test]
    fn test_overwrite_replaces_stamp() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");
        let bucket = cache.bucket("render");

        bucket.put("key", "v1", b"first");
        bucket.put("key", "v2", b"second");

        assert_eq!(bucket.get("key", "v1"), None);
        assert_eq!(bucket.get("key", "v2"), Some(b"second".to_vec()));
    }

    #[test]
    fn test_buckets_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");

        let pages = cache.bucket("tree-pages");
        let render = cache.bucket("render");

        pages.put("key", "s", b"subtree");
        render.put("key", "s", b"html");

        assert_eq!(pages.get("key", "s"), Some(b"subtree".to_vec()));
        assert_eq!(render.get("key", "s"), Some(b"html".to_vec()));
    }

    #[test]
    fn test_truncated_entry_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");
        let bucket = cache.bucket("render");
        bucket.put("key", "stamp", b"data");

        // Corrupt the entry: claim a longer stamp than the file holds
        let path = tmp.path().join("cache/render/key");
        fs::write(&path, 200u32.to_le_bytes()).unwrap();

        assert_eq!(bucket.get("key", "stamp"), None);
    }

    #[test]
    fn test_hostile_key_is_escaped() {
        let tmp = TempDir::new().unwrap();
        let cache = FileCache::open(tmp.path().join("cache"), "0.1.0");
        let bucket = cache.bucket("render");

        bucket.put("../escape", "s", b"contained");
        assert_eq!(bucket.get("../escape", "s"), Some(b"contained".to_vec()));
        assert!(!tmp.path().join("cache/escape").exists());
    }

    #[test]
    fn test_same_version_keeps_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        let cache = FileCache::open(root.clone(), "0.1.0");
        cache.bucket("render").put("key", "s", b"kept");

        let cache2 = FileCache::open(root, "0.1.0");
        assert_eq!(cache2.bucket("render").get("key", "s"), Some(b"kept".to_vec()));
    }

    #[test]
    fn test_version_change_wipes_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        let cache = FileCache::open(root.clone(), "0.1.0");
        cache.bucket("render").put("key", "s", b"stale");

        let cache2 = FileCache::open(root.clone(), "0.2.0");
        assert_eq!(cache2.bucket("render").get("key", "s"), None);
        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "0.2.0");
    }

    #[test]
    fn test_missing_version_file_wipes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("cache");

        fs::create_dir_all(root.join("render")).unwrap();
        fs::write(root.join("render/orphan"), b"stale").unwrap();

        let cache = FileCache::open(root.clone(), "0.1.0");
        assert_eq!(cache.bucket("render").get("orphan", ""), None);
        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "0.1.0");
    }

    #[test]
    fn test_nonexistent_root_is_created() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("deep/nested/cache");

        let _cache = FileCache::open(root.clone(), "0.1.0");

        assert!(root.exists());
        assert_eq!(fs::read_to_string(root.join("VERSION")).unwrap(), "0.1.0");
    }
}
