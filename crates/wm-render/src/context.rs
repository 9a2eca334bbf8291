//! Rendering context.
//!
//! Everything a page render needs beyond the blocks themselves: the
//! per-sync id→route map for internal link rewriting, the production domain
//! for relativizing absolute self-links, collection listing data injected by
//! the orchestrator, the asset sink, and the optional math typesetter.

use std::collections::HashMap;

use crate::RenderError;

/// Heading collected for table-of-contents rendering.
#[derive(Clone, Debug)]
pub(crate) struct HeadingRef {
    pub level: u8,
    pub anchor: String,
    pub text: String,
}

/// One entry of a collection listing (a row-page, pre-resolved to a route).
#[derive(Clone, Debug)]
pub struct ListingEntry {
    /// Row page title.
    pub title: String,
    /// Assigned route path.
    pub route_path: String,
    /// Row sort key (date), shown when present.
    pub date: Option<String>,
}

/// Receives delegated asset downloads from the renderer.
///
/// The production implementation wraps the asset store; tests substitute a
/// recorder. Returns the local filename the asset was stored under.
pub trait AssetSink {
    /// Download `remote_url` under `stable_name`, returning the local
    /// filename.
    fn download(&mut self, remote_url: &str, stable_name: &str) -> Result<String, RenderError>;
}

/// Asset sink that refuses all downloads. Useful where a render is known
/// not to reference hosted assets.
pub struct NoAssets;

impl AssetSink for NoAssets {
    fn download(&mut self, remote_url: &str, _stable_name: &str) -> Result<String, RenderError> {
        Err(RenderError::Asset(format!(
            "asset downloads disabled (wanted {remote_url})"
        )))
    }
}

/// Context threaded through a page render.
pub struct RenderContext<'a> {
    /// Canonical node id → assigned route path, for rewriting internal links.
    pub routes_by_id: &'a HashMap<String, String>,
    /// Production domain of this deployment; absolute links to it are
    /// rewritten to path-only relative links.
    pub site_domain: Option<&'a str>,
    /// Public URL prefix local assets are served under (e.g. `/assets`).
    pub assets_base: &'a str,
    /// Collection id → pre-resolved listing entries, injected by the
    /// orchestrator for collection pages and inline collection blocks.
    pub listings: &'a HashMap<String, Vec<ListingEntry>>,
    /// Delegated asset downloads.
    pub assets: &'a mut dyn AssetSink,
    /// Math typesetter for equation blocks. `None` or an `Err` falls back
    /// to escaped source text.
    pub math: Option<&'a dyn Fn(&str) -> Result<String, String>>,
    /// Headings of the page being rendered, collected depth-first before
    /// the render pass. Consumed by table-of-contents blocks.
    pub(crate) headings: Vec<HeadingRef>,
}

impl<'a> RenderContext<'a> {
    /// Create a context with no listings, no domain, and no math typesetter.
    /// Builder-style setters fill in the rest.
    #[must_use]
    pub fn new(
        routes_by_id: &'a HashMap<String, String>,
        assets_base: &'a str,
        assets: &'a mut dyn AssetSink,
    ) -> Self {
        Self {
            routes_by_id,
            site_domain: None,
            assets_base,
            listings: EMPTY_LISTINGS.get_or_init(HashMap::new),
            assets,
            math: None,
            headings: Vec::new(),
        }
    }

    /// Set the production domain used for self-link relativization.
    #[must_use]
    pub fn with_site_domain(mut self, domain: &'a str) -> Self {
        self.site_domain = Some(domain);
        self
    }

    /// Attach collection listing data.
    #[must_use]
    pub fn with_listings(mut self, listings: &'a HashMap<String, Vec<ListingEntry>>) -> Self {
        self.listings = listings;
        self
    }

    /// Attach a math typesetter.
    #[must_use]
    pub fn with_math(mut self, math: &'a dyn Fn(&str) -> Result<String, String>) -> Self {
        self.math = Some(math);
        self
    }
}

static EMPTY_LISTINGS: std::sync::OnceLock<HashMap<String, Vec<ListingEntry>>> =
    std::sync::OnceLock::new();
