//! Sync pipeline for wm.
//!
//! Turns a hosted workspace into a static site in four passes:
//!
//! 1. [`tree::PageTreeBuilder`] discovers the page/collection hierarchy
//!    under the configured root, hydrating block trees and validating a
//!    persisted traversal cache against remote version stamps
//! 2. [`routes::assign`] derives a canonical route path per node
//! 3. every node is rendered to HTML and search text (per-node render
//!    cache, also stamp-validated)
//! 4. [`artifacts`] writes the HTML files and JSON artifacts atomically
//!
//! [`sync::Orchestrator`] drives the passes in order. A run either fully
//! succeeds or fails without touching the previous run's artifacts.

pub mod artifacts;
pub mod routes;
pub mod sync;
pub mod tree;

pub use sync::{Orchestrator, SyncSummary};
pub use tree::{ContentNode, NodeKind, PageTreeBuilder};

use std::path::PathBuf;

/// Error from a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Configuration is missing or unusable for a sync.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Two nodes resolved to the same route path.
    #[error("duplicate route {path}: nodes {first} and {second} (add a route override for one)")]
    DuplicateRoute {
        /// The contested route path.
        path: String,
        /// Node that claimed the route first.
        first: String,
        /// Node that collided with it.
        second: String,
    },

    /// Content-source API failure (after retries).
    #[error(transparent)]
    Source(#[from] wm_source::SourceError),

    /// Asset download failure.
    #[error(transparent)]
    Asset(#[from] wm_assets::AssetError),

    /// Render failure (asset download delegated from the renderer).
    #[error(transparent)]
    Render(#[from] wm_render::RenderError),

    /// Invalid configuration surfaced while loading or validating.
    #[error(transparent)]
    Config(#[from] wm_config::ConfigError),

    /// Artifact serialization failure.
    #[error("failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Artifact write failure.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
