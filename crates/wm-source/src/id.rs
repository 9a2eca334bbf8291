//! Canonical node-id normalization.
//!
//! The workspace spells the same id several ways: hyphenated UUID form,
//! compact 32-char hex, or embedded at the end of a share URL (optionally
//! behind a human-readable slug prefix). Every boundary in the pipeline
//! normalizes ids through [`normalize_id`] so all spellings compare equal.

/// Normalize any spelling of a workspace node id to compact lowercase hex.
///
/// Accepts:
/// - hyphenated UUID form (`0a1b2c3d-4e5f-...`)
/// - compact 32-char hex
/// - either of the above as the last path segment of a URL, with an
///   optional `slug-` prefix and with query string / fragment ignored
///
/// Returns the canonical 32-char lowercase hex id, or an empty string for
/// malformed input.
#[must_use]
pub fn normalize_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    // For URLs and paths, the id lives in the last path segment.
    let segment = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let compact: String = segment
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect();

    // The id is the trailing 32 hex chars; anything before it is slug text.
    if compact.len() < 32 {
        return String::new();
    }
    let candidate = &compact[compact.len() - 32..];
    if candidate.chars().all(|c| c.is_ascii_hexdigit()) {
        candidate.to_owned()
    } else {
        String::new()
    }
}
