//! Error types for the content-source client.

/// Error from content-source API operations.
///
/// Retryable conditions (429/408/5xx, transport failures) are retried inside
/// the client up to its attempt limit; what escapes here is final and aborts
/// the sync.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (network error, timeout, etc).
    #[error("HTTP request failed")]
    Transport(#[from] ureq::Error),

    /// Server returned an error status after retries were exhausted or for a
    /// non-retryable status.
    #[error("HTTP error: {status} - {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (may contain error details).
        body: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),
}

impl SourceError {
    /// Whether a status code is worth retrying.
    ///
    /// Rate limits (429), request timeouts (408), and server errors (5xx)
    /// are transient; every other 4xx is a caller bug or permission problem
    /// and fails immediately.
    #[must_use]
    pub fn retryable_status(status: u16) -> bool {
        status == 429 || status == 408 || status >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(SourceError::retryable_status(429));
        assert!(SourceError::retryable_status(408));
        assert!(SourceError::retryable_status(500));
        assert!(SourceError::retryable_status(503));
    }

    #[test]
    fn test_non_retryable_statuses() {
        assert!(!SourceError::retryable_status(400));
        assert!(!SourceError::retryable_status(401));
        assert!(!SourceError::retryable_status(403));
        assert!(!SourceError::retryable_status(404));
    }
}
