//! Sync orchestration.
//!
//! [`Orchestrator::run`] drives one full sync: discover the tree, assign
//! routes, validate route uniqueness, render every node (consulting a
//! stamp-validated render cache), and write all artifacts atomically. A
//! fatal error anywhere leaves the previous run's artifacts untouched.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wm_assets::AssetStore;
use wm_cache::VersionedCache;
use wm_config::{AccessAuth, AccessMode, Config, NavItem};
use wm_render::{
    AssetSink, ListingEntry, RenderContext, RenderError, render_listing, render_page, search,
};
use wm_source::{WorkspaceApi, normalize_id};

use crate::SyncError;
use crate::artifacts::{
    self, AccessRecord, RouteRecord, SearchRecord, SyncMeta, html_relative_path, write_json,
};
use crate::routes::{self, RouteRules};
use crate::tree::{BuildState, ContentNode, NodeKind, PageTreeBuilder};

/// Cache bucket for rendered nodes.
const RENDER_BUCKET: &str = "render";

/// Public URL prefix local assets are served under.
const ASSETS_BASE: &str = "/assets";

/// Counts reported after a successful run.
#[derive(Debug, Default)]
pub struct SyncSummary {
    /// Pages published (row-pages included).
    pub pages: usize,
    /// Collections published.
    pub collections: usize,
    /// Asset references resolved (downloads plus dedup hits).
    pub assets: usize,
}

/// Cached render output per node, valid while the version stamp matches.
#[derive(Serialize, Deserialize)]
struct RenderedNode {
    html: String,
    headings: Vec<String>,
    text: String,
}

/// Adapts the asset store to the renderer's sink seam, counting
/// resolutions for the summary.
struct StoreSink<'a> {
    store: &'a mut AssetStore,
    resolved: usize,
}

impl AssetSink for StoreSink<'_> {
    fn download(&mut self, remote_url: &str, stable_name: &str) -> Result<String, RenderError> {
        self.resolved += 1;
        self.store
            .download(remote_url, stable_name)
            .map_err(|e| RenderError::Asset(e.to_string()))
    }
}

/// Drives one sync run end to end.
pub struct Orchestrator<'a> {
    config: &'a Config,
    api: &'a dyn WorkspaceApi,
    cache: &'a dyn VersionedCache,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator over the given configuration, source client,
    /// and cache.
    #[must_use]
    pub fn new(config: &'a Config, api: &'a dyn WorkspaceApi, cache: &'a dyn VersionedCache) -> Self {
        Self { config, api, cache }
    }

    /// Run the sync.
    ///
    /// # Errors
    ///
    /// Fails on configuration problems, source API errors, duplicate
    /// routes, asset download failures, and artifact write failures. No
    /// artifact is overwritten unless its replacement was written in full.
    pub fn run(&self, assets: &mut AssetStore) -> Result<SyncSummary, SyncError> {
        let source = self.config.require_source()?;
        let root_id = normalize_id(&source.root);
        if root_id.is_empty() {
            return Err(SyncError::Configuration(format!(
                "source.root is not a valid node id: {}",
                source.root
            )));
        }

        // discovery
        let builder = PageTreeBuilder::new(self.api, self.cache);
        let mut state = BuildState::default();
        let mut nodes = vec![builder.build_node(&root_id, &mut state)?];
        for extra in &source.include {
            let eid = normalize_id(extra);
            if eid.is_empty() {
                return Err(SyncError::Configuration(format!(
                    "source.include entry is not a valid node id: {extra}"
                )));
            }
            if state.pages.contains(&eid) {
                debug!("included node {eid} already discovered, skipping");
                continue;
            }
            nodes.push(builder.build_node(&eid, &mut state)?);
        }

        if nodes.len() == 1 && nodes[0].blocks.is_empty() && nodes[0].children.is_empty() {
            return Err(SyncError::Configuration(format!(
                "no content discovered under root {root_id}"
            )));
        }

        // routes
        let rules = RouteRules {
            home_id: source.home.clone(),
            overrides: self.config.routes.clone(),
        };
        routes::assign(&mut nodes, &rules);

        let flat = flatten(&nodes);
        let mut routes_by_id: HashMap<String, String> = HashMap::new();
        let mut ids_by_route: HashMap<String, String> = HashMap::new();
        for node in &flat {
            if let Some(first) = ids_by_route.get(&node.route_path) {
                return Err(SyncError::DuplicateRoute {
                    path: node.route_path.clone(),
                    first: first.clone(),
                    second: node.id.clone(),
                });
            }
            ids_by_route.insert(node.route_path.clone(), node.id.clone());
            routes_by_id.insert(node.id.clone(), node.route_path.clone());
        }

        let listings = build_listings(&flat);
        let overridden: HashSet<String> =
            rules.overrides.keys().map(|id| normalize_id(id)).collect();

        // render
        let render_cache = self.cache.bucket(RENDER_BUCKET);
        let mut sink = StoreSink {
            store: assets,
            resolved: 0,
        };

        let mut pages_html: Vec<(String, String)> = Vec::new();
        let mut search_records = Vec::new();
        let mut manifest = Vec::new();
        let mut summary = SyncSummary::default();

        for node in &flat {
            match node.kind {
                NodeKind::Page => summary.pages += 1,
                NodeKind::Collection => summary.collections += 1,
            }

            let rendered = render_cache
                .get(&node.id, &node.version)
                .and_then(|bytes| serde_json::from_slice::<RenderedNode>(&bytes).ok());

            let rendered = match rendered {
                Some(hit) => hit,
                None => {
                    let rendered = self.render_node(node, &routes_by_id, &listings, &mut sink)?;
                    if let Ok(bytes) = serde_json::to_vec(&rendered) {
                        render_cache.put(&node.id, &node.version, &bytes);
                    }
                    rendered
                }
            };

            pages_html.push((node.route_path.clone(), rendered.html));
            search_records.push(SearchRecord {
                id: node.id.clone(),
                title: node.title.clone(),
                kind: node.kind,
                route_path: node.route_path.clone(),
                headings: rendered.headings,
                text: rendered.text,
            });
            manifest.push(RouteRecord {
                id: node.id.clone(),
                title: node.title.clone(),
                kind: node.kind,
                route_path: node.route_path.clone(),
                parent_id: node.parent_id.clone(),
                nav_group: nav_group_for(&self.config.nav, &node.route_path),
                overridden: overridden.contains(&node.id),
            });
        }
        summary.assets = sink.resolved;

        let access_records = self.resolve_access_rules(&routes_by_id)?;

        // artifacts
        let out = &self.config.output_resolved.dir;
        for (route_path, html) in &pages_html {
            artifacts::write_atomic(&out.join(html_relative_path(route_path)), html.as_bytes())?;
        }
        write_json(&out.join(artifacts::ROUTES_FILE), &manifest)?;
        write_json(&out.join(artifacts::SEARCH_FILE), &search_records)?;
        write_json(&out.join(artifacts::ACCESS_FILE), &access_records)?;
        write_json(&out.join(artifacts::ROUTE_MAP_FILE), &sorted_map(&routes_by_id))?;

        let home_id = ids_by_route.get("/").cloned().unwrap_or_default();
        write_json(
            &out.join(artifacts::META_FILE),
            &SyncMeta {
                synced_at: unix_now(),
                pages: summary.pages,
                collections: summary.collections,
                root_id,
                home_id,
            },
        )?;

        info!(
            "sync complete: {} pages, {} collections, {} assets",
            summary.pages, summary.collections, summary.assets
        );
        Ok(summary)
    }

    fn render_node(
        &self,
        node: &ContentNode,
        routes_by_id: &HashMap<String, String>,
        listings: &HashMap<String, Vec<ListingEntry>>,
        sink: &mut StoreSink<'_>,
    ) -> Result<RenderedNode, SyncError> {
        match node.kind {
            NodeKind::Page => {
                let mut ctx =
                    RenderContext::new(routes_by_id, ASSETS_BASE, sink).with_listings(listings);
                if let Some(domain) = &self.config.site.domain {
                    ctx = ctx.with_site_domain(domain);
                }
                let html = render_page(&node.blocks, &mut ctx)?;
                let extracted = search::extract(&node.blocks);
                Ok(RenderedNode {
                    html,
                    headings: extracted.headings,
                    text: extracted.text,
                })
            }
            NodeKind::Collection => {
                let entries = listings.get(&node.id).map_or(&[][..], Vec::as_slice);
                Ok(RenderedNode {
                    html: render_listing(entries),
                    headings: Vec::new(),
                    text: String::new(),
                })
            }
        }
    }

    /// Resolve configured access rules against the assigned routes.
    ///
    /// A rule naming an unknown page id is a configuration error: dropping
    /// it silently would publish a page that was meant to be protected.
    fn resolve_access_rules(
        &self,
        routes_by_id: &HashMap<String, String>,
    ) -> Result<Vec<AccessRecord>, SyncError> {
        let mut records = Vec::new();
        for (index, rule) in self.config.access.iter().enumerate() {
            let path = match (&rule.page, &rule.path) {
                (Some(page), _) => {
                    let pid = normalize_id(page);
                    routes_by_id.get(&pid).cloned().ok_or_else(|| {
                        SyncError::Configuration(format!(
                            "access[{index}] protects page {page}, which was not found in this sync"
                        ))
                    })?
                }
                (None, Some(path)) => path.clone(),
                (None, None) => {
                    return Err(SyncError::Configuration(format!(
                        "access[{index}] has neither a page id nor a path"
                    )));
                }
            };
            records.push(AccessRecord {
                path,
                mode: match rule.mode {
                    AccessMode::Exact => "exact".to_owned(),
                    AccessMode::Prefix => "prefix".to_owned(),
                },
                auth: match rule.auth {
                    AccessAuth::Password => "password".to_owned(),
                    AccessAuth::Github => "github".to_owned(),
                },
                password: rule.password.clone(),
            });
        }
        Ok(records)
    }
}

/// Pre-order flattening of the node tree.
fn flatten(nodes: &[ContentNode]) -> Vec<&ContentNode> {
    let mut out = Vec::new();
    fn walk<'n>(nodes: &'n [ContentNode], out: &mut Vec<&'n ContentNode>) {
        for node in nodes {
            out.push(node);
            walk(&node.children, out);
        }
    }
    walk(nodes, &mut out);
    out
}

/// Listing entries per collection id, in the collection's row order.
fn build_listings(flat: &[&ContentNode]) -> HashMap<String, Vec<ListingEntry>> {
    let mut listings = HashMap::new();
    for node in flat {
        if node.kind == NodeKind::Collection {
            let entries = node
                .children
                .iter()
                .map(|row| ListingEntry {
                    title: row.title.clone(),
                    route_path: row.route_path.clone(),
                    date: row.sort_key.clone(),
                })
                .collect();
            listings.insert(node.id.clone(), entries);
        }
    }
    listings
}

/// Title of the navigation item a route falls under.
fn nav_group_for(nav: &[NavItem], route_path: &str) -> Option<String> {
    nav.iter()
        .find(|item| {
            route_path == item.path
                || (item.path != "/" && route_path.starts_with(&format!("{}/", item.path)))
        })
        .map(|item| item.title.clone())
}

/// Deterministic (sorted) view of the id→route map for serialization.
fn sorted_map(map: &HashMap<String, String>) -> std::collections::BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
