//! Page tree discovery.
//!
//! [`PageTreeBuilder`] walks the workspace under a root node and produces a
//! tree of [`ContentNode`]s: pages with hydrated block trees, and
//! collections with one row-page node per row. Traversal stops at nested
//! page and collection markers; those become tree nodes of their own.
//!
//! Two stamp-validated cache buckets back the traversal: `tree-pages`
//! (page subtrees, keyed by the page version) and `tree-collections`
//! (collection subtrees, keyed by the collection's own version, which
//! advances independently of any parent page). Source API errors abort the
//! build; cache problems never do.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use wm_cache::{CacheBucket, VersionedCache};
use wm_source::{Block, BlockKind, Row, WorkspaceApi, normalize_id};

use crate::SyncError;

/// Cache bucket for page subtrees.
const PAGES_BUCKET: &str = "tree-pages";

/// Cache bucket for collection subtrees.
const COLLECTIONS_BUCKET: &str = "tree-collections";

/// Kind of a discovered node.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A page (including collection row-pages).
    Page,
    /// A collection of row-pages.
    Collection,
}

/// A page or collection discovered from the source workspace.
///
/// Route fields stay empty until route assignment runs; they are never
/// part of the cached snapshot.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ContentNode {
    /// Canonical (normalized) node id.
    pub id: String,
    /// Page or collection.
    pub kind: NodeKind,
    /// Display title, `"Untitled"` when the source has none.
    pub title: String,
    /// Version stamp the node was discovered at.
    pub version: String,
    /// Canonical parent id, empty for top-level nodes.
    pub parent_id: String,
    /// Hydrated block tree (empty for collections).
    pub blocks: Vec<Block>,
    /// Nested pages and collections; for collections, the row-pages in
    /// listing order.
    pub children: Vec<ContentNode>,
    /// Row sort key (first date-typed field), only on row-pages.
    pub sort_key: Option<String>,
    /// Assigned route path. Set by route assignment.
    #[serde(skip)]
    pub route_path: String,
    /// Assigned route segments. Set by route assignment.
    #[serde(skip)]
    pub route_segments: Vec<String>,
}

/// Per-run dedup state, threaded through the whole build.
///
/// One instance per sync. Guards against a collection appearing under
/// multiple ancestors and against page reference cycles.
#[derive(Debug, Default)]
pub struct BuildState {
    /// Page ids already built (or queued) this run.
    pub pages: HashSet<String>,
    /// Collection ids already built this run.
    pub collections: HashSet<String>,
}

/// Discovers the content tree under a root node.
pub struct PageTreeBuilder<'a> {
    api: &'a dyn WorkspaceApi,
    pages: Box<dyn CacheBucket>,
    collections: Box<dyn CacheBucket>,
}

impl<'a> PageTreeBuilder<'a> {
    /// Create a builder over the given source client and traversal cache.
    #[must_use]
    pub fn new(api: &'a dyn WorkspaceApi, cache: &dyn VersionedCache) -> Self {
        Self {
            api,
            pages: cache.bucket(PAGES_BUCKET),
            collections: cache.bucket(COLLECTIONS_BUCKET),
        }
    }

    /// Build the node for `id` and everything nested under it.
    ///
    /// # Errors
    ///
    /// Fails on a malformed id or any source API error. Cache problems are
    /// logged and treated as misses.
    pub fn build_node(&self, id: &str, state: &mut BuildState) -> Result<ContentNode, SyncError> {
        let nid = normalize_id(id);
        if nid.is_empty() {
            return Err(SyncError::Configuration(format!("invalid node id: {id}")));
        }
        state.pages.insert(nid.clone());

        let meta = self.api.get_node(&nid)?;
        if let Some(cached) = self.cached_node(&*self.pages, &nid, &meta.version) {
            debug!("page {nid} unchanged (stamp {}), using cached subtree", meta.version);
            register_descendants(&cached, state);
            return Ok(cached);
        }

        let blocks = self.hydrate_blocks(&nid)?;
        let children = self.expand_children(&nid, &blocks, state)?;

        let node = ContentNode {
            id: nid.clone(),
            kind: NodeKind::Page,
            title: title_or_default(meta.title),
            version: meta.version.clone(),
            parent_id: meta
                .parent
                .map(|p| normalize_id(&p.id))
                .unwrap_or_default(),
            blocks,
            children,
            sort_key: None,
            route_path: String::new(),
            route_segments: Vec::new(),
        };

        self.store_node(&*self.pages, &nid, &meta.version, &node);
        Ok(node)
    }

    /// Fetch a page's block tree, descending into nested layout blocks
    /// (toggles, columns, callouts, ...) with an explicit stack.
    ///
    /// Page and collection markers are never expanded through; their
    /// children belong to the subtree node built for them.
    fn hydrate_blocks(&self, id: &str) -> Result<Vec<Block>, SyncError> {
        let mut blocks = self.api.get_children(id)?;

        let mut stack: Vec<&mut Block> = blocks.iter_mut().collect();
        while let Some(block) = stack.pop() {
            if block.has_children && block.children.is_empty() && !block.kind.is_subtree_marker() {
                block.children = self.api.get_children(&block.id)?;
            }
            stack.extend(block.children.iter_mut());
        }

        Ok(blocks)
    }

    /// Build child nodes for every page/collection marker in `blocks`,
    /// depth-first in document order.
    fn expand_children(
        &self,
        parent_id: &str,
        blocks: &[Block],
        state: &mut BuildState,
    ) -> Result<Vec<ContentNode>, SyncError> {
        let mut out = Vec::new();

        for marker in collect_markers(blocks) {
            let mid = normalize_id(&marker.id);
            if mid.is_empty() {
                warn!("skipping marker with malformed id {:?}", marker.id);
                continue;
            }

            match marker.kind {
                BlockKind::ChildPage => {
                    if state.pages.contains(&mid) {
                        debug!("page {mid} already built this run, skipping re-occurrence");
                        continue;
                    }
                    out.push(self.build_node(&mid, state)?);
                }
                BlockKind::ChildCollection => {
                    if let Some(collection) = self.build_collection(parent_id, &mid, state)? {
                        out.push(collection);
                    }
                }
                _ => {}
            }
        }

        Ok(out)
    }

    /// Build a collection node, or `None` when this occurrence is a linked
    /// view or a duplicate.
    fn build_collection(
        &self,
        parent_id: &str,
        cid: &str,
        state: &mut BuildState,
    ) -> Result<Option<ContentNode>, SyncError> {
        let meta = self.api.get_collection_meta(cid)?;

        if normalize_id(&meta.parent_id) != parent_id {
            debug!("collection {cid} under {parent_id} is a linked view, skipping");
            return Ok(None);
        }
        if !state.collections.insert(cid.to_owned()) {
            debug!("collection {cid} already built this run, skipping");
            return Ok(None);
        }

        if let Some(cached) = self.cached_node(&*self.collections, cid, &meta.version) {
            debug!("collection {cid} unchanged (stamp {}), using cached subtree", meta.version);
            register_descendants(&cached, state);
            return Ok(Some(cached));
        }

        let mut rows = Vec::new();
        for row in self.api.get_collection_rows(cid)? {
            if let Some(node) = self.build_row(&row, cid, state)? {
                rows.push(node);
            }
        }
        sort_rows(&mut rows);

        let node = ContentNode {
            id: cid.to_owned(),
            kind: NodeKind::Collection,
            title: title_or_default(meta.title),
            version: meta.version.clone(),
            parent_id: parent_id.to_owned(),
            blocks: Vec::new(),
            children: rows,
            sort_key: None,
            route_path: String::new(),
            route_segments: Vec::new(),
        };

        self.store_node(&*self.collections, cid, &meta.version, &node);
        Ok(Some(node))
    }

    /// Build a row-page node. Rows carry their own version stamp, so the
    /// page cache is consulted without an extra metadata call.
    fn build_row(
        &self,
        row: &Row,
        collection_id: &str,
        state: &mut BuildState,
    ) -> Result<Option<ContentNode>, SyncError> {
        let rid = normalize_id(&row.id);
        if rid.is_empty() {
            warn!("skipping row with malformed id {:?}", row.id);
            return Ok(None);
        }
        if !state.pages.insert(rid.clone()) {
            debug!("row page {rid} already built this run, skipping");
            return Ok(None);
        }

        if let Some(mut cached) = self.cached_node(&*self.pages, &rid, &row.version) {
            register_descendants(&cached, state);
            cached.sort_key = row.date_key();
            return Ok(Some(cached));
        }

        let blocks = self.hydrate_blocks(&rid)?;
        let children = self.expand_children(&rid, &blocks, state)?;

        let node = ContentNode {
            id: rid.clone(),
            kind: NodeKind::Page,
            title: title_or_default(row.title.clone()),
            version: row.version.clone(),
            parent_id: collection_id.to_owned(),
            blocks,
            children,
            sort_key: row.date_key(),
            route_path: String::new(),
            route_segments: Vec::new(),
        };

        self.store_node(&*self.pages, &rid, &row.version, &node);
        Ok(Some(node))
    }

    fn cached_node(&self, bucket: &dyn CacheBucket, key: &str, stamp: &str) -> Option<ContentNode> {
        let bytes = bucket.get(key, stamp)?;
        match serde_json::from_slice(&bytes) {
            Ok(node) => Some(node),
            Err(e) => {
                warn!("corrupt traversal cache entry for {key}, ignoring: {e}");
                None
            }
        }
    }

    fn store_node(&self, bucket: &dyn CacheBucket, key: &str, stamp: &str, node: &ContentNode) {
        match serde_json::to_vec(node) {
            Ok(bytes) => bucket.put(key, stamp, &bytes),
            Err(e) => warn!("failed to serialize cache entry for {key}: {e}"),
        }
    }
}

/// A page/collection marker found inside a block tree.
struct Marker {
    kind: BlockKind,
    id: String,
}

/// Collect subtree markers depth-first in document order.
fn collect_markers(blocks: &[Block]) -> Vec<Marker> {
    let mut out = Vec::new();
    collect_markers_into(blocks, &mut out);
    out
}

fn collect_markers_into(blocks: &[Block], out: &mut Vec<Marker>) {
    for block in blocks {
        if block.kind.is_subtree_marker() {
            out.push(Marker {
                kind: block.kind,
                id: block.id.clone(),
            });
        }
        collect_markers_into(&block.children, out);
    }
}

/// Re-register every id inside a cached subtree into the dedup state.
///
/// Without this, a traversal branch visited later could re-discover a
/// collection that only exists inside this cached snapshot and duplicate
/// its routes.
fn register_descendants(node: &ContentNode, state: &mut BuildState) {
    for child in &node.children {
        match child.kind {
            NodeKind::Page => {
                state.pages.insert(child.id.clone());
            }
            NodeKind::Collection => {
                state.collections.insert(child.id.clone());
            }
        }
        register_descendants(child, state);
    }
}

/// Listing order: rows with dates newest-first, rows without dates after
/// them in title order. Title breaks ties either way.
fn sort_rows(rows: &mut [ContentNode]) {
    rows.sort_by(|a, b| match (&a.sort_key, &b.sort_key) {
        (Some(x), Some(y)) => y.cmp(x).then_with(|| a.title.cmp(&b.title)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.title.cmp(&b.title),
    });
}

fn title_or_default(title: Option<String>) -> String {
    match title {
        Some(t) if !t.is_empty() => t,
        _ => "Untitled".to_owned(),
    }
}
