//! Output artifacts.
//!
//! Everything a sync publishes: per-route HTML files and the JSON
//! artifacts the serving layer consumes. Every write is atomic (temp file
//! in the destination directory, then rename), so an interrupted run
//! leaves the previous run's files intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::SyncError;
use crate::tree::NodeKind;

/// Route manifest filename.
pub const ROUTES_FILE: &str = "routes.json";
/// Search index filename.
pub const SEARCH_FILE: &str = "search-index.json";
/// Access rules filename.
pub const ACCESS_FILE: &str = "access-rules.json";
/// Sync metadata filename.
pub const META_FILE: &str = "sync-meta.json";
/// Id→route debug map filename.
pub const ROUTE_MAP_FILE: &str = "route-map.json";

/// One entry of the route manifest.
#[derive(Debug, Serialize)]
pub struct RouteRecord {
    /// Canonical node id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Page or collection.
    pub kind: NodeKind,
    /// Assigned route path.
    pub route_path: String,
    /// Canonical parent id, empty for top-level nodes.
    pub parent_id: String,
    /// Title of the navigation item this route falls under, if any.
    pub nav_group: Option<String>,
    /// Whether the route came from an explicit override.
    pub overridden: bool,
}

/// One entry of the search index.
#[derive(Debug, Serialize)]
pub struct SearchRecord {
    /// Canonical node id.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Page or collection.
    pub kind: NodeKind,
    /// Assigned route path.
    pub route_path: String,
    /// Bounded heading list.
    pub headings: Vec<String>,
    /// Bounded body text.
    pub text: String,
}

/// One emitted access-control rule, with any page id resolved to its
/// route path.
#[derive(Debug, Serialize)]
pub struct AccessRecord {
    /// Protected route path.
    pub path: String,
    /// `exact` or `prefix`.
    pub mode: String,
    /// `password` or `github`.
    pub auth: String,
    /// Shared password for password auth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Sync run metadata.
#[derive(Debug, Serialize)]
pub struct SyncMeta {
    /// Unix timestamp of the run.
    pub synced_at: u64,
    /// Pages published (row-pages included).
    pub pages: usize,
    /// Collections published.
    pub collections: usize,
    /// Root node id.
    pub root_id: String,
    /// Node served at `/`.
    pub home_id: String,
}

/// Relative HTML file path for a route: `/` maps to `index.html`, any
/// other route strips the leading slash and appends `.html`.
#[must_use]
pub fn html_relative_path(route_path: &str) -> PathBuf {
    if route_path == "/" {
        return PathBuf::from("index.html");
    }
    PathBuf::from(format!("{}.html", route_path.trim_start_matches('/')))
}

/// Atomically write `bytes` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`SyncError::Write`] naming the path on any I/O failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let write = || -> std::io::Result<()> {
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    };
    write().map_err(|source| SyncError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically write a pretty-printed JSON artifact.
///
/// # Errors
///
/// Fails on serialization or I/O problems.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SyncError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_html_relative_path() {
        assert_eq!(html_relative_path("/"), PathBuf::from("index.html"));
        assert_eq!(html_relative_path("/news"), PathBuf::from("news.html"));
        assert_eq!(
            html_relative_path("/blog/first-post"),
            PathBuf::from("blog/first-post.html")
        );
    }

    #[test]
    fn test_write_atomic_creates_dirs_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/out.html");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn test_write_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.json");

        let records = vec![RouteRecord {
            id: "0a1b2c3d4e5f60718293a4b5c6d7e8f9".to_owned(),
            title: "Home".to_owned(),
            kind: NodeKind::Page,
            route_path: "/".to_owned(),
            parent_id: String::new(),
            nav_group: None,
            overridden: false,
        }];
        write_json(&path, &records).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(parsed[0]["route_path"], "/");
        assert_eq!(parsed[0]["kind"], "page");
    }

    #[test]
    fn test_access_record_password_omitted_when_absent() {
        let record = AccessRecord {
            path: "/internal".to_owned(),
            mode: "prefix".to_owned(),
            auth: "github".to_owned(),
            password: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("password"));
    }
}
