//! Asset store implementation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ureq::Agent;

use crate::AssetError;

/// HTTP timeout for asset downloads in seconds.
const DEFAULT_TIMEOUT: u64 = 60;

/// Fallback extension when the URL path has none.
const DEFAULT_EXT: &str = "bin";

/// Index filename inside the asset directory.
const INDEX_FILENAME: &str = "assets-index.json";

/// Fetches raw bytes from a remote URL.
///
/// Seam for tests; production use goes through the built-in HTTP fetcher.
pub trait RemoteFetcher {
    /// Fetch the asset bytes, erroring on any non-success status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError>;
}

struct HttpFetcher {
    agent: Agent,
}

impl HttpFetcher {
    fn new() -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT)))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let response = self.agent.get(url).call()?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(AssetError::Status {
                status,
                url: url.to_owned(),
            });
        }
        Ok(response.into_body().read_to_vec()?)
    }
}

/// Persisted index: two lookup maps over the same physical files.
#[derive(Default, Serialize, Deserialize)]
struct AssetIndex {
    /// stable name → local filename
    by_name: HashMap<String, String>,
    /// normalized remote key → local filename
    by_remote: HashMap<String, String>,
}

/// Local store of downloaded binary assets.
///
/// Files land in one flat directory as `<stable name>.<ext>`; the index
/// lives alongside them. See the crate docs for the dedup rules.
pub struct AssetStore {
    dir: PathBuf,
    index: AssetIndex,
    fetcher: Box<dyn RemoteFetcher>,
    force_refresh: bool,
}

impl AssetStore {
    /// Open (or create) the store at `dir`, loading any persisted index.
    ///
    /// `force_refresh` bypasses every cache check and re-fetches each asset.
    #[must_use]
    pub fn open(dir: PathBuf, force_refresh: bool) -> Self {
        Self::with_fetcher(dir, force_refresh, Box::new(HttpFetcher::new()))
    }

    /// Open with a custom fetcher. Used by tests.
    #[must_use]
    pub fn with_fetcher(
        dir: PathBuf,
        force_refresh: bool,
        fetcher: Box<dyn RemoteFetcher>,
    ) -> Self {
        let index = load_index(&dir.join(INDEX_FILENAME));
        Self {
            dir,
            index,
            fetcher,
            force_refresh,
        }
    }

    /// Directory assets are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `remote_url` under `stable_name`, deduplicating against
    /// earlier downloads. Returns the local filename (no directory).
    ///
    /// Resolution order, short-circuiting on the first hit:
    /// 1. stable-name index entry whose file is still on disk
    /// 2. remote-key index entry whose file is still on disk (the
    ///    stable-name entry is backfilled)
    /// 3. the deterministic `<stable_name>.<ext>` file already on disk
    ///    (recovers from a lost index)
    /// 4. fetch, write, record both index entries
    pub fn download(
        &mut self,
        remote_url: &str,
        stable_name: &str,
    ) -> Result<String, AssetError> {
        let remote_key = normalize_remote_key(remote_url);
        let filename = format!("{stable_name}.{}", infer_extension(remote_url));

        if !self.force_refresh {
            if let Some(existing) = self.index.by_name.get(stable_name)
                && self.dir.join(existing).is_file()
            {
                return Ok(existing.clone());
            }

            if let Some(existing) = self.index.by_remote.get(&remote_key).cloned()
                && self.dir.join(&existing).is_file()
            {
                debug!("asset {stable_name} resolved via remote key {remote_key}");
                self.index
                    .by_name
                    .insert(stable_name.to_owned(), existing.clone());
                self.persist_index();
                return Ok(existing);
            }

            if self.dir.join(&filename).is_file() {
                debug!("asset {filename} found on disk without index entry, re-indexing");
                self.record(stable_name, &remote_key, &filename);
                return Ok(filename);
            }
        }

        info!("fetching asset {remote_url} as {filename}");
        let bytes = self.fetcher.fetch(remote_url)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(&filename), &bytes)?;
        self.record(stable_name, &remote_key, &filename);
        Ok(filename)
    }

    fn record(&mut self, stable_name: &str, remote_key: &str, filename: &str) {
        self.index
            .by_name
            .insert(stable_name.to_owned(), filename.to_owned());
        self.index
            .by_remote
            .insert(remote_key.to_owned(), filename.to_owned());
        self.persist_index();
    }

    /// Write-through index persistence. Best-effort: a failed write costs a
    /// re-fetch on the next run, nothing more.
    fn persist_index(&self) {
        let path = self.dir.join(INDEX_FILENAME);
        let result = fs::create_dir_all(&self.dir)
            .map_err(|e| e.to_string())
            .and_then(|()| serde_json::to_vec_pretty(&self.index).map_err(|e| e.to_string()))
            .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));
        if let Err(e) = result {
            warn!("failed to persist asset index: {e}");
        }
    }
}

/// Load the index, resetting to empty on any problem.
fn load_index(path: &Path) -> AssetIndex {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("corrupt asset index, starting fresh: {e}");
            AssetIndex::default()
        }),
        Err(_) => AssetIndex::default(),
    }
}

/// Normalize a remote URL to its dedup key: lowercase host + decoded path,
/// query string and fragment stripped. Signed workspace URLs rotate their
/// signature per request, but host+path identifies the content.
#[must_use]
pub fn normalize_remote_key(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let without_query = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let (host, path) = without_query
        .split_once('/')
        .map_or((without_query, ""), |(h, p)| (h, p));

    let decoded_path = percent_decode_str(path).decode_utf8_lossy();
    format!("{}/{}", host.to_ascii_lowercase(), decoded_path)
}

/// Infer a file extension from the URL's path suffix.
fn infer_extension(url: &str) -> String {
    let path = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let last_segment = path.rsplit('/').next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXT.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Counts fetches and serves fixed bytes.
    struct CountingFetcher {
        calls: Rc<RefCell<Vec<String>>>,
        bytes: Vec<u8>,
    }

    impl RemoteFetcher for CountingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
            self.calls.borrow_mut().push(url.to_owned());
            Ok(self.bytes.clone())
        }
    }

    struct FailingFetcher;

    impl RemoteFetcher for FailingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, AssetError> {
            Err(AssetError::Status {
                status: 403,
                url: url.to_owned(),
            })
        }
    }

    fn store_with_counter(
        dir: PathBuf,
        force: bool,
    ) -> (AssetStore, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let fetcher = CountingFetcher {
            calls: Rc::clone(&calls),
            bytes: b"imagebytes".to_vec(),
        };
        (
            AssetStore::with_fetcher(dir, force, Box::new(fetcher)),
            calls,
        )
    }

    #[test]
    fn test_download_writes_file_and_indices() {
        let tmp = TempDir::new().unwrap();
        let (mut store, calls) = store_with_counter(tmp.path().join("assets"), false);

        let name = store
            .download("https://files.example.com/img/photo.png?sig=aaa", "0a1b")
            .unwrap();

        assert_eq!(name, "0a1b.png");
        assert_eq!(fs::read(tmp.path().join("assets/0a1b.png")).unwrap(), b"imagebytes");
        assert_eq!(calls.borrow().len(), 1);
        assert!(tmp.path().join("assets").join(INDEX_FILENAME).exists());
    }

    #[test]
    fn test_rotated_signature_fetches_once() {
        let tmp = TempDir::new().unwrap();
        let (mut store, calls) = store_with_counter(tmp.path().join("assets"), false);

        let first = store
            .download("https://files.example.com/img/photo.png?sig=aaa", "block-a")
            .unwrap();
        // Same host+path, different signature, different stable name
        let second = store
            .download("https://files.example.com/img/photo.png?sig=bbb", "block-b")
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.borrow().len(), 1, "second call must hit the remote-key index");
    }

    #[test]
    fn test_stable_name_hit_skips_fetch() {
        let tmp = TempDir::new().unwrap();
        let (mut store, calls) = store_with_counter(tmp.path().join("assets"), false);

        store
            .download("https://files.example.com/a.png?sig=1", "0a1b")
            .unwrap();
        store
            .download("https://files.example.com/a.png?sig=2", "0a1b")
            .unwrap();

        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_index_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("assets");

        let (mut store, _) = store_with_counter(dir.clone(), false);
        store
            .download("https://files.example.com/a.png?sig=1", "0a1b")
            .unwrap();

        let (mut reopened, calls) = store_with_counter(dir, false);
        reopened
            .download("https://files.example.com/a.png?sig=2", "0a1b")
            .unwrap();
        assert_eq!(calls.borrow().len(), 0);
    }

    #[test]
    fn test_missing_file_invalidates_index_entry() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("assets");

        let (mut store, calls) = store_with_counter(dir.clone(), false);
        store
            .download("https://files.example.com/a.png", "0a1b")
            .unwrap();
        fs::remove_file(dir.join("0a1b.png")).unwrap();

        store
            .download("https://files.example.com/a.png", "0a1b")
            .unwrap();
        assert_eq!(calls.borrow().len(), 2, "deleted file must be re-fetched");
    }

    #[test]
    fn test_on_disk_file_recovers_lost_index() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("assets");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("0a1b.png"), b"pre-existing").unwrap();

        let (mut store, calls) = store_with_counter(dir, false);
        let name = store
            .download("https://files.example.com/a.png", "0a1b")
            .unwrap();

        assert_eq!(name, "0a1b.png");
        assert_eq!(calls.borrow().len(), 0);
    }

    #[test]
    fn test_force_refresh_always_fetches() {
        let tmp = TempDir::new().unwrap();
        let (mut store, calls) = store_with_counter(tmp.path().join("assets"), true);

        store
            .download("https://files.example.com/a.png", "0a1b")
            .unwrap();
        store
            .download("https://files.example.com/a.png", "0a1b")
            .unwrap();
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_corrupt_index_resets_to_empty() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("assets");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(INDEX_FILENAME), b"{not json").unwrap();

        let (mut store, calls) = store_with_counter(dir, false);
        store
            .download("https://files.example.com/a.png", "0a1b")
            .unwrap();
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn test_failed_fetch_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = AssetStore::with_fetcher(
            tmp.path().join("assets"),
            false,
            Box::new(FailingFetcher),
        );

        let err = store
            .download("https://files.example.com/a.png", "0a1b")
            .unwrap_err();
        assert!(matches!(err, AssetError::Status { status: 403, .. }));
    }

    #[test]
    fn test_normalize_remote_key() {
        assert_eq!(
            normalize_remote_key("https://Files.Example.com/img/photo.png?sig=abc&exp=123"),
            "files.example.com/img/photo.png"
        );
        assert_eq!(
            normalize_remote_key("https://files.example.com/img/photo.png#frag"),
            "files.example.com/img/photo.png"
        );
        // percent-decoded paths compare equal
        assert_eq!(
            normalize_remote_key("https://files.example.com/img/my%20photo.png"),
            normalize_remote_key("https://files.example.com/img/my photo.png"),
        );
    }

    #[test]
    fn test_infer_extension() {
        assert_eq!(infer_extension("https://x.com/a/photo.PNG?sig=1"), "png");
        assert_eq!(infer_extension("https://x.com/a/archive.tar.gz"), "gz");
        assert_eq!(infer_extension("https://x.com/a/noext"), "bin");
        assert_eq!(infer_extension("https://x.com/a/.hidden"), "bin");
        assert_eq!(infer_extension("https://x.com/a/file.verylongext"), "bin");
    }
}
