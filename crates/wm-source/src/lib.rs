//! Content-source API client for wm.
//!
//! Talks to the hosted workspace the sync pipeline mirrors. Provides:
//!
//! - [`WorkspaceApi`]: the trait the rest of the pipeline consumes
//!   (node metadata, block children, collection metadata and rows)
//! - [`HttpWorkspaceClient`]: REST implementation with cursor pagination
//!   and bounded retry/backoff on rate limits and server errors
//! - [`normalize_id`]: canonical node-id normalization, applied at every
//!   boundary so all spellings of an id compare equal
//! - Wire types: [`Block`], [`RichTextSpan`], [`NodeMeta`],
//!   [`CollectionMeta`], [`Row`]

mod client;
mod error;
mod id;
mod types;

pub use client::{HttpWorkspaceClient, WorkspaceApi};
pub use error::SourceError;
pub use id::normalize_id;
pub use types::{
    Annotations, Block, BlockKind, CollectionMeta, NodeMeta, ParentRef, RichTextSpan, Row,
    RowField,
};
