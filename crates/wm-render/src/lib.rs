//! Block-to-HTML renderer and search-text extractor for wm.
//!
//! Both halves of this crate are pure functions over a hydrated block tree:
//!
//! - [`render_page`] / [`render_blocks`] produce HTML fragments, with the
//!   only side effect delegated through [`AssetSink`] (binary asset
//!   downloads for hosted images)
//! - [`search::extract`] produces the bounded plain-text fields for the
//!   search index
//!
//! Rendering never fails on malformed block data; every payload field
//! degrades to an empty or safe value, and unrecognized block kinds render
//! as a generic container around their children. The single fatal condition
//! is a failed asset download.

mod context;
mod html;
mod renderer;
mod richtext;
pub mod search;

pub use context::{AssetSink, ListingEntry, NoAssets, RenderContext};
pub use html::{escape_attr, escape_html};
pub use renderer::{collect_headings, render_block, render_blocks, render_listing, render_page};
pub use richtext::{render_spans, rewrite_link};

/// Error from rendering a page.
///
/// Only delegated asset downloads can fail; everything else degrades.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// An asset referenced by the page could not be downloaded.
    #[error("asset download failed: {0}")]
    Asset(String),
}
