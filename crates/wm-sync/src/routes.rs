//! Route assignment.
//!
//! Walks the discovered tree and gives every node a canonical route path.
//! Priority per node: designated home page (`/`), explicit override,
//! slug derived from the title. Sibling slug collisions are disambiguated
//! with an id suffix; global uniqueness is validated by the orchestrator,
//! which can name both colliding nodes.

use std::collections::{HashMap, HashSet};

use wm_source::normalize_id;

use crate::tree::{ContentNode, NodeKind};

/// Routing rules from configuration.
#[derive(Debug, Default)]
pub struct RouteRules {
    /// Node served at `/`. When unset, a top-level page slugged `home` or
    /// `index` is picked, else the first top-level page in source order.
    pub home_id: Option<String>,
    /// Explicit route overrides, node id → path (both taken verbatim from
    /// config; ids are normalized here).
    pub overrides: HashMap<String, String>,
}

/// Assign route paths and segments to every node in `nodes`, in place.
pub fn assign(nodes: &mut [ContentNode], rules: &RouteRules) {
    let overrides: HashMap<String, String> = rules
        .overrides
        .iter()
        .map(|(id, path)| (normalize_id(id), normalize_override(path)))
        .filter(|(id, _)| !id.is_empty())
        .collect();

    let home_id = rules
        .home_id
        .as_deref()
        .map(normalize_id)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| detect_home(nodes));

    assign_level(nodes, &[], Some(&home_id), &overrides);
}

fn assign_level(
    nodes: &mut [ContentNode],
    parent_segments: &[String],
    home_id: Option<&str>,
    overrides: &HashMap<String, String>,
) {
    let mut used: HashSet<String> = HashSet::new();

    for node in nodes.iter_mut() {
        if home_id == Some(node.id.as_str()) {
            node.route_segments = Vec::new();
            node.route_path = "/".to_owned();
        } else if let Some(path) = overrides.get(&node.id) {
            node.route_path = path.clone();
            node.route_segments = path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        } else {
            let mut slug = slugify(&node.title);
            if slug.is_empty() {
                slug = format!("page-{}", prefix(&node.id, 8));
            }
            if !used.insert(slug.clone()) {
                slug = format!("{slug}-{}", prefix(&node.id, 6));
                used.insert(slug.clone());
            }

            let mut segments = parent_segments.to_vec();
            segments.push(slug);
            node.route_path = format!("/{}", segments.join("/"));
            node.route_segments = segments;
        }

        // home detection applies at the top level only
        let child_segments = node.route_segments.clone();
        assign_level(&mut node.children, &child_segments, None, overrides);
    }
}

/// Pick the home page when none is configured: first top-level page whose
/// slug is `home` or `index`, else the first top-level page.
fn detect_home(nodes: &[ContentNode]) -> String {
    nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Page)
        .find(|n| matches!(slugify(&n.title).as_str(), "home" | "index"))
        .or_else(|| nodes.iter().find(|n| n.kind == NodeKind::Page))
        .map(|n| n.id.clone())
        .unwrap_or_default()
}

/// Derive a URL slug from a title: lowercase, quotes stripped, every run
/// of other non-alphanumeric characters collapsed to one hyphen.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if matches!(c, '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201c}' | '\u{201d}') {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    out
}

/// Normalize an override path: leading slash enforced, trailing slashes
/// stripped, empty collapses to `/`.
fn normalize_override(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "/" {
        return "/".to_owned();
    }
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

fn prefix(id: &str, len: usize) -> &str {
    &id[..id.len().min(len)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page(id: &str, title: &str) -> ContentNode {
        ContentNode {
            id: id.to_owned(),
            kind: NodeKind::Page,
            title: title.to_owned(),
            version: "v1".to_owned(),
            parent_id: String::new(),
            blocks: Vec::new(),
            children: Vec::new(),
            sort_key: None,
            route_path: String::new(),
            route_segments: Vec::new(),
        }
    }

    fn collection(id: &str, title: &str, rows: Vec<ContentNode>) -> ContentNode {
        ContentNode {
            kind: NodeKind::Collection,
            children: rows,
            ..page(id, title)
        }
    }

    const A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const C: &str = "cccccccccccccccccccccccccccccccc";

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("News!!"), "news");
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("What's new?"), "whats-new");
        assert_eq!(slugify("  --weird   input--  "), "weird-input");
        assert_eq!(slugify("\u{201c}Quoted\u{201d} title"), "quoted-title");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn test_home_and_slug_routes() {
        let mut news = page(B, "News!!");
        news.parent_id = A.to_owned();
        let mut nodes = vec![{
            let mut home = page(A, "Home");
            home.children = vec![news];
            home
        }];

        assign(
            &mut nodes,
            &RouteRules {
                home_id: Some(A.to_owned()),
                overrides: HashMap::new(),
            },
        );

        assert_eq!(nodes[0].route_path, "/");
        assert!(nodes[0].route_segments.is_empty());
        // home's children start from the root segment list
        assert_eq!(nodes[0].children[0].route_path, "/news");
        assert_eq!(nodes[0].children[0].route_segments, vec!["news"]);
    }

    #[test]
    fn test_home_detected_by_slug_when_unconfigured() {
        let mut nodes = vec![page(A, "Intro"), page(B, "Home")];
        assign(&mut nodes, &RouteRules::default());
        assert_eq!(nodes[1].route_path, "/");
        assert_eq!(nodes[0].route_path, "/intro");
    }

    #[test]
    fn test_first_page_is_home_fallback() {
        let mut nodes = vec![
            collection(C, "Blog", Vec::new()),
            page(A, "Welcome"),
            page(B, "About"),
        ];
        assign(&mut nodes, &RouteRules::default());
        assert_eq!(nodes[1].route_path, "/");
        assert_eq!(nodes[0].route_path, "/blog");
        assert_eq!(nodes[2].route_path, "/about");
    }

    #[test]
    fn test_override_beats_slug() {
        let mut nodes = vec![page(A, "Home"), page(B, "Imprint")];
        let mut overrides = HashMap::new();
        // hyphenated spelling must still match after normalization
        overrides.insert(
            "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb".to_owned(),
            "legal/imprint/".to_owned(),
        );

        assign(
            &mut nodes,
            &RouteRules {
                home_id: Some(A.to_owned()),
                overrides,
            },
        );

        assert_eq!(nodes[1].route_path, "/legal/imprint");
        assert_eq!(nodes[1].route_segments, vec!["legal", "imprint"]);
    }

    #[test]
    fn test_override_normalization() {
        assert_eq!(normalize_override("/a/b/"), "/a/b");
        assert_eq!(normalize_override("a/b"), "/a/b");
        assert_eq!(normalize_override("///"), "/");
        assert_eq!(normalize_override(""), "/");
    }

    #[test]
    fn test_sibling_collision_disambiguated_by_id() {
        let mut nodes = vec![page(A, "Home"), page(B, "Setup"), page(C, "Setup")];
        assign(
            &mut nodes,
            &RouteRules {
                home_id: Some(A.to_owned()),
                overrides: HashMap::new(),
            },
        );

        assert_eq!(nodes[1].route_path, "/setup");
        assert_eq!(nodes[2].route_path, "/setup-cccccc");
    }

    #[test]
    fn test_empty_slug_falls_back_to_id() {
        let mut nodes = vec![page(A, "Home"), page(B, "!!!")];
        assign(
            &mut nodes,
            &RouteRules {
                home_id: Some(A.to_owned()),
                overrides: HashMap::new(),
            },
        );
        assert_eq!(nodes[1].route_path, "/page-bbbbbbbb");
    }

    #[test]
    fn test_collection_rows_nest_under_collection() {
        let rows = vec![page(A, "First post"), page(B, "Second post")];
        let mut nodes = vec![page(C, "Home"), collection(
            "dddddddddddddddddddddddddddddddd",
            "Blog",
            rows,
        )];
        assign(
            &mut nodes,
            &RouteRules {
                home_id: Some(C.to_owned()),
                overrides: HashMap::new(),
            },
        );

        assert_eq!(nodes[1].route_path, "/blog");
        assert_eq!(nodes[1].children[0].route_path, "/blog/first-post");
        assert_eq!(nodes[1].children[1].route_path, "/blog/second-post");
    }

    #[test]
    fn test_every_node_gets_a_route() {
        let mut tree = page(A, "Home");
        tree.children = vec![page(B, ""), page(C, "Deep")];
        let mut nodes = vec![tree];
        assign(&mut nodes, &RouteRules::default());

        fn check(node: &ContentNode) {
            assert!(!node.route_path.is_empty());
            node.children.iter().for_each(check);
        }
        nodes.iter().for_each(check);
    }
}
