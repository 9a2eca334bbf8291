//! Search-text extraction.
//!
//! Produces the bounded plain-text fields of a search index record from a
//! hydrated block tree. Headings and body text are collected depth-first
//! and capped hard, so a pathological page can never inflate the index.

use std::collections::HashSet;

use wm_source::{Block, BlockKind};

/// Maximum heading entries per record.
const MAX_HEADINGS: usize = 18;
/// Maximum total characters across all heading entries.
const MAX_HEADING_CHARS: usize = 420;
/// Maximum distinct body lines per record.
const MAX_TEXT_LINES: usize = 220;
/// Maximum body characters per record.
const MAX_TEXT_CHARS: usize = 1600;

/// Extracted search text for one node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Heading texts, depth-first, case-insensitively deduplicated.
    pub headings: Vec<String>,
    /// Newline-joined body text, whitespace-normalized and deduplicated.
    pub text: String,
}

/// Extract bounded search text from a block tree.
#[must_use]
pub fn extract(blocks: &[Block]) -> Extracted {
    let mut headings = Vec::new();
    let mut heading_chars = 0usize;
    let mut heading_seen = HashSet::new();

    let mut lines = Vec::new();
    let mut text_chars = 0usize;
    let mut line_seen = HashSet::new();
    let mut text_full = false;

    walk(
        blocks,
        &mut headings,
        &mut heading_chars,
        &mut heading_seen,
        &mut lines,
        &mut text_chars,
        &mut line_seen,
        &mut text_full,
    );

    Extracted {
        headings,
        text: lines.join("\n"),
    }
}

#[allow(clippy::too_many_arguments)]
fn walk(
    blocks: &[Block],
    headings: &mut Vec<String>,
    heading_chars: &mut usize,
    heading_seen: &mut HashSet<String>,
    lines: &mut Vec<String>,
    text_chars: &mut usize,
    line_seen: &mut HashSet<String>,
    text_full: &mut bool,
) {
    for block in blocks {
        if block.kind.heading_level().is_some() {
            push_heading(&block.plain_text(), headings, heading_chars, heading_seen);
        } else if !matches!(block.kind, BlockKind::Code | BlockKind::TableRow) {
            push_line(&block.plain_text(), lines, text_chars, line_seen, text_full);
        }
        walk(
            &block.children,
            headings,
            heading_chars,
            heading_seen,
            lines,
            text_chars,
            line_seen,
            text_full,
        );
    }
}

fn push_heading(
    raw: &str,
    headings: &mut Vec<String>,
    chars: &mut usize,
    seen: &mut HashSet<String>,
) {
    let text = normalize_whitespace(raw);
    if text.is_empty() || headings.len() >= MAX_HEADINGS {
        return;
    }
    if !seen.insert(text.to_lowercase()) {
        return;
    }
    let remaining = MAX_HEADING_CHARS.saturating_sub(*chars);
    if remaining == 0 {
        return;
    }
    let clipped = clip(&text, remaining);
    *chars += clipped.chars().count();
    headings.push(clipped);
}

fn push_line(
    raw: &str,
    lines: &mut Vec<String>,
    chars: &mut usize,
    seen: &mut HashSet<String>,
    full: &mut bool,
) {
    if *full {
        return;
    }
    let line = normalize_whitespace(raw);
    if line.is_empty() || !seen.insert(line.to_lowercase()) {
        return;
    }
    if lines.len() >= MAX_TEXT_LINES {
        *full = true;
        return;
    }
    // Joining lines costs one newline each after the first.
    let separator = usize::from(!lines.is_empty());
    let remaining = MAX_TEXT_CHARS.saturating_sub(*chars + separator);
    if remaining == 0 {
        *full = true;
        return;
    }
    let clipped = clip(&line, remaining);
    if clipped.chars().count() < line.chars().count() {
        // Cap reached mid-line: keep the truncated run and stop.
        *full = true;
    }
    *chars += clipped.chars().count() + separator;
    lines.push(clipped);
}

/// Collapse all whitespace runs to single spaces and trim.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max` characters of `text`.
fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
