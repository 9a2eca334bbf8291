//! Workspace REST API client.
//!
//! [`WorkspaceApi`] is the seam the tree builder and orchestrator consume;
//! tests substitute an in-memory implementation. [`HttpWorkspaceClient`]
//! implements it over the hosted workspace's JSON API with bearer-token
//! auth, cursor pagination on the list endpoints, and bounded retry with
//! exponential backoff on transient failures.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use ureq::Agent;

use crate::error::SourceError;
use crate::types::{Block, CollectionMeta, NodeMeta, Row};

/// Default HTTP timeout in seconds.
const DEFAULT_TIMEOUT: u64 = 30;

/// Maximum attempts per request, including the first.
const MAX_ATTEMPTS: u32 = 5;

/// Base backoff delay; doubles per attempt.
const BASE_BACKOFF_MS: u64 = 500;

/// Upper bound on random backoff jitter.
const JITTER_MS: u64 = 250;

/// RFC 3986 unreserved characters pass through: A-Z a-z 0-9 - . _ ~
/// Cursors are opaque server tokens and may contain anything else.
const CURSOR_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Read access to the content-source workspace.
///
/// All ids are accepted in any spelling; implementations normalize
/// internally where the wire format requires it.
pub trait WorkspaceApi {
    /// Fetch metadata (version stamp, title, canonical parent) for a node.
    fn get_node(&self, id: &str) -> Result<NodeMeta, SourceError>;

    /// Fetch the direct child blocks of a node, fully paginated.
    fn get_children(&self, id: &str) -> Result<Vec<Block>, SourceError>;

    /// Fetch metadata for a collection.
    fn get_collection_meta(&self, id: &str) -> Result<CollectionMeta, SourceError>;

    /// Fetch all rows of a collection, fully paginated.
    fn get_collection_rows(&self, id: &str) -> Result<Vec<Row>, SourceError>;
}

/// Paginated list envelope used by the children and rows endpoints.
#[derive(Deserialize)]
struct PageEnvelope<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// REST implementation of [`WorkspaceApi`].
pub struct HttpWorkspaceClient {
    agent: Agent,
    base_url: String,
    token: String,
}

impl HttpWorkspaceClient {
    /// Create a client for the workspace API at `base_url`.
    #[must_use]
    pub fn new(base_url: &str, token: &str) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT)))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.to_owned(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    /// GET a JSON resource with retry on transient failures.
    ///
    /// 429/408/5xx and transport errors are retried up to [`MAX_ATTEMPTS`]
    /// with exponential backoff plus jitter; a `Retry-After` seconds hint
    /// takes precedence over the computed delay. Any other error status
    /// fails immediately.
    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let result = self
                .agent
                .get(url)
                .header("Authorization", &format!("Bearer {}", self.token))
                .header("Accept", "application/json")
                .call();

            let response = match result {
                Ok(response) => response,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!("request to {url} failed ({e}), attempt {attempt}/{MAX_ATTEMPTS}");
                    std::thread::sleep(backoff_delay(attempt, None));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            let mut body = response.into_body();

            if status < 400 {
                return Ok(body.read_json()?);
            }

            if SourceError::retryable_status(status) && attempt < MAX_ATTEMPTS {
                debug!("status {status} from {url}, attempt {attempt}/{MAX_ATTEMPTS}");
                std::thread::sleep(backoff_delay(attempt, retry_after));
                continue;
            }

            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| "(unable to read error body)".to_owned());
            return Err(SourceError::Status {
                status,
                body: error_body,
            });
        }
    }

    /// GET all pages of a cursor-paginated list endpoint.
    fn get_paginated<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, SourceError> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let envelope: PageEnvelope<T> = self.get_json(&page_url(url, cursor.as_deref()))?;
            results.extend(envelope.results);

            match envelope.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(results),
            }
        }
    }
}

impl WorkspaceApi for HttpWorkspaceClient {
    fn get_node(&self, id: &str) -> Result<NodeMeta, SourceError> {
        self.get_json(&format!("{}/nodes/{id}", self.api_url()))
    }

    fn get_children(&self, id: &str) -> Result<Vec<Block>, SourceError> {
        self.get_paginated(&format!("{}/nodes/{id}/children", self.api_url()))
    }

    fn get_collection_meta(&self, id: &str) -> Result<CollectionMeta, SourceError> {
        self.get_json(&format!("{}/collections/{id}", self.api_url()))
    }

    fn get_collection_rows(&self, id: &str) -> Result<Vec<Row>, SourceError> {
        self.get_paginated(&format!("{}/collections/{id}/rows", self.api_url()))
    }
}

/// URL for one page of a list endpoint, the cursor percent-encoded.
fn page_url(url: &str, cursor: Option<&str>) -> String {
    match cursor {
        Some(c) => format!("{url}?cursor={}", utf8_percent_encode(c, CURSOR_ENCODE_SET)),
        None => url.to_owned(),
    }
}

/// Backoff before retry `attempt + 1`. A server-supplied `Retry-After`
/// (seconds) wins; otherwise exponential with jitter.
fn backoff_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
    if let Some(seconds) = retry_after {
        return Duration::from_secs(seconds);
    }
    let base = BASE_BACKOFF_MS.saturating_mul(1 << (attempt - 1).min(8));
    let jitter = rand::rng().random_range(0..JITTER_MS);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_per_attempt() {
        let first = backoff_delay(1, None);
        let third = backoff_delay(3, None);
        assert!(first >= Duration::from_millis(BASE_BACKOFF_MS));
        assert!(first < Duration::from_millis(BASE_BACKOFF_MS + JITTER_MS));
        assert!(third >= Duration::from_millis(BASE_BACKOFF_MS * 4));
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        assert_eq!(backoff_delay(1, Some(7)), Duration::from_secs(7));
        assert_eq!(backoff_delay(4, Some(0)), Duration::from_secs(0));
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let client = HttpWorkspaceClient::new("https://api.example.com/", "tok");
        assert_eq!(client.api_url(), "https://api.example.com/v1");
    }

    #[test]
    fn test_cursor_is_percent_encoded() {
        let url = "https://api.example.com/v1/nodes/1/children";
        assert_eq!(page_url(url, None), url);
        assert_eq!(
            page_url(url, Some("a+b&c=d/e")),
            format!("{url}?cursor=a%2Bb%26c%3Dd%2Fe")
        );
        // unreserved characters stay readable
        assert_eq!(page_url(url, Some("tok_1.2-x~y")), format!("{url}?cursor=tok_1.2-x~y"));
    }

    #[test]
    fn test_page_envelope_defaults() {
        let envelope: PageEnvelope<Block> = serde_json::from_str("{}").unwrap();
        assert!(envelope.results.is_empty());
        assert_eq!(envelope.next_cursor, None);
    }
}
