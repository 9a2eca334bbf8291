//! Deduplicating binary asset store for wm.
//!
//! Content blocks reference workspace-hosted files through signed URLs whose
//! query-string signatures rotate on every API response, so the same image
//! arrives under a different URL each sync. [`AssetStore`] deduplicates
//! fetches two ways:
//!
//! - by a caller-supplied **stable name** (the owning block's canonical id)
//! - by a **normalized remote key**: host + percent-decoded path with the
//!   query string and fragment stripped, since the signature rotates but the
//!   content does not
//!
//! Both indices point at the same physical files and are persisted as JSON,
//! write-through and best-effort; a corrupt or missing index file resets to
//! empty rather than failing. A failed download, however, is fatal for the
//! sync: a broken image reference is a build error, not a silent omission.

mod store;

pub use store::{AssetStore, RemoteFetcher, normalize_remote_key};

/// Error from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// HTTP request failed (network error, timeout, etc).
    #[error("HTTP request failed")]
    Transport(#[from] Box<ureq::Error>),

    /// Server returned an error status for an asset fetch.
    #[error("asset fetch failed: {status} for {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The URL that failed.
        url: String,
    },

    /// I/O error writing the asset to disk.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl From<ureq::Error> for AssetError {
    fn from(e: ureq::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}
