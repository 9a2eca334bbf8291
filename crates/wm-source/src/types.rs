//! Wire types for the content-source API.
//!
//! Block payloads are loosely typed on the wire: each block kind carries a
//! different, mostly-optional shape. [`Block`] keeps the kind tag as a
//! closed enum (with an [`BlockKind::Unknown`] catch-all so unrecognized
//! kinds still round-trip with their children) and the per-kind payload as a
//! flattened JSON map read through tolerant accessors. A malformed field is
//! never an error, only a default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node metadata returned by `get_node`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodeMeta {
    /// Node id (any spelling; callers normalize).
    pub id: String,
    /// Opaque version stamp, advanced by the source on every edit.
    #[serde(default)]
    pub version: String,
    /// Node title, absent for untitled pages.
    #[serde(default)]
    pub title: Option<String>,
    /// Canonical parent reference, absent for the workspace root.
    #[serde(default)]
    pub parent: Option<ParentRef>,
}

/// Reference to a node's canonical parent.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ParentRef {
    /// Parent node id.
    pub id: String,
    /// Parent kind (`"page"`, `"collection"`, `"workspace"`).
    #[serde(default)]
    pub kind: String,
}

/// Collection metadata returned by `get_collection_meta`.
///
/// Collections version independently of the pages they live under; their
/// stamp guards the collection traversal cache.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CollectionMeta {
    /// Collection id.
    pub id: String,
    /// Opaque version stamp.
    #[serde(default)]
    pub version: String,
    /// Collection title.
    #[serde(default)]
    pub title: Option<String>,
    /// Id of the page this collection is natively nested under. An
    /// occurrence under any other page is a linked view.
    #[serde(default)]
    pub parent_id: String,
}

/// One row of a collection. Rows are pages with attached schema fields.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Row {
    /// Row page id.
    pub id: String,
    /// Opaque version stamp.
    #[serde(default)]
    pub version: String,
    /// Row title.
    #[serde(default)]
    pub title: Option<String>,
    /// Schema fields in source order.
    #[serde(default)]
    pub fields: Vec<RowField>,
}

impl Row {
    /// Sort key: the value of the first date-typed field, if any.
    #[must_use]
    pub fn date_key(&self) -> Option<String> {
        self.fields
            .iter()
            .find(|f| f.kind == "date")
            .and_then(|f| f.value.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }
}

/// One schema field on a collection row.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RowField {
    /// Field name.
    #[serde(default)]
    pub name: String,
    /// Field type (`"date"`, `"text"`, `"select"`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Raw field value.
    #[serde(default)]
    pub value: Value,
}

/// Block kind tag.
///
/// `Unknown` absorbs kinds this renderer has no template for; such blocks
/// degrade to a generic container around their children instead of being
/// dropped.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedListItem,
    NumberedListItem,
    ToDo,
    Toggle,
    Quote,
    Callout,
    Code,
    Equation,
    Divider,
    Image,
    Video,
    Bookmark,
    Embed,
    Table,
    TableRow,
    TableOfContents,
    ColumnList,
    Column,
    ChildPage,
    ChildCollection,
    #[serde(other)]
    Unknown,
}

impl BlockKind {
    /// Heading level for the heading kinds, `None` otherwise.
    #[must_use]
    pub fn heading_level(self) -> Option<u8> {
        match self {
            Self::Heading1 => Some(1),
            Self::Heading2 => Some(2),
            Self::Heading3 => Some(3),
            _ => None,
        }
    }

    /// Whether this kind marks a nested page or collection. Traversal stops
    /// at these: they become tree nodes of their own, never inline content.
    #[must_use]
    pub fn is_subtree_marker(self) -> bool {
        matches!(self, Self::ChildPage | Self::ChildCollection)
    }
}

/// One content block.
///
/// The per-kind payload stays as raw JSON (`data`); typed access goes
/// through the accessor methods, all of which default on missing or
/// malformed values.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Block {
    /// Block id (any spelling; callers normalize).
    #[serde(default)]
    pub id: String,
    /// Kind tag.
    #[serde(rename = "type", default = "unknown_kind")]
    pub kind: BlockKind,
    /// Whether the source reports nested children for this block.
    #[serde(default)]
    pub has_children: bool,
    /// Hydrated children. Empty until the tree builder expands the block.
    #[serde(default)]
    pub children: Vec<Block>,
    /// Kind-specific payload.
    #[serde(flatten, default)]
    pub data: serde_json::Map<String, Value>,
}

fn unknown_kind() -> BlockKind {
    BlockKind::Unknown
}

impl Block {
    /// Rich text spans from a payload field. Malformed spans are dropped,
    /// well-formed siblings survive.
    #[must_use]
    pub fn spans(&self, field: &str) -> Vec<RichTextSpan> {
        self.data
            .get(field)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The block's main rich text (`rich_text` payload field).
    #[must_use]
    pub fn rich_text(&self) -> Vec<RichTextSpan> {
        self.spans("rich_text")
    }

    /// Plain text of the block's main rich text.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.rich_text()
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }

    /// String payload field, empty when missing or not a string.
    #[must_use]
    pub fn str_field(&self, field: &str) -> &str {
        self.data
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Boolean payload field, `false` when missing.
    #[must_use]
    pub fn bool_field(&self, field: &str) -> bool {
        self.data
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }

    /// Numeric payload field, `None` when missing or non-numeric.
    #[must_use]
    pub fn f64_field(&self, field: &str) -> Option<f64> {
        self.data.get(field).and_then(Value::as_f64)
    }

    /// Integer payload field, `None` when missing or non-integral.
    #[must_use]
    pub fn u64_field(&self, field: &str) -> Option<u64> {
        self.data.get(field).and_then(Value::as_u64)
    }

    /// Table-row cells: an array of rich text arrays.
    #[must_use]
    pub fn cells(&self) -> Vec<Vec<RichTextSpan>> {
        self.data
            .get("cells")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .map(|cell| {
                        cell.as_array()
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                                    .collect()
                            })
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One run of rich text with independent style annotations.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RichTextSpan {
    /// Text content.
    #[serde(default)]
    pub text: String,
    /// Link target, if the run is a link.
    #[serde(default)]
    pub href: Option<String>,
    /// Style annotations.
    #[serde(default)]
    pub annotations: Annotations,
}

/// Style annotations on a rich text run.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
    /// Color name; `"default"` means unstyled.
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "default".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_from(v: Value) -> Block {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_block_kind_tag_round_trip() {
        let block = block_from(json!({
            "id": "b1",
            "type": "paragraph",
            "rich_text": [{"text": "hello"}]
        }));
        assert_eq!(block.kind, BlockKind::Paragraph);
        assert_eq!(block.plain_text(), "hello");
    }

    #[test]
    fn test_unrecognized_kind_becomes_unknown() {
        let block = block_from(json!({
            "id": "b1",
            "type": "synced_block",
            "children": [{"id": "b2", "type": "paragraph"}]
        }));
        assert_eq!(block.kind, BlockKind::Unknown);
        assert_eq!(block.children.len(), 1);
    }

    #[test]
    fn test_missing_kind_becomes_unknown() {
        let block = block_from(json!({"id": "b1"}));
        assert_eq!(block.kind, BlockKind::Unknown);
    }

    #[test]
    fn test_malformed_span_dropped_siblings_kept() {
        let block = block_from(json!({
            "id": "b1",
            "type": "paragraph",
            "rich_text": [{"text": "good"}, 42, {"text": "also good"}]
        }));
        let spans = block.rich_text();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "good");
        assert_eq!(spans[1].text, "also good");
    }

    #[test]
    fn test_field_accessors_default_on_garbage() {
        let block = block_from(json!({
            "id": "b1",
            "type": "code",
            "language": 7,
            "checked": "yes"
        }));
        assert_eq!(block.str_field("language"), "");
        assert!(!block.bool_field("checked"));
        assert_eq!(block.f64_field("missing"), None);
    }

    #[test]
    fn test_annotation_defaults() {
        let span: RichTextSpan = serde_json::from_value(json!({"text": "x"})).unwrap();
        assert!(!span.annotations.bold);
        assert!(!span.annotations.code);
        assert_eq!(span.annotations.color, "default");
        assert_eq!(span.href, None);
    }

    #[test]
    fn test_cells_pad_malformed_rows() {
        let block = block_from(json!({
            "id": "r1",
            "type": "table_row",
            "cells": [[{"text": "a"}], "oops", [[]]]
        }));
        let cells = block.cells();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0][0].text, "a");
        assert!(cells[1].is_empty());
    }

    #[test]
    fn test_row_date_key_first_date_field_wins() {
        let row: Row = serde_json::from_value(json!({
            "id": "r1",
            "fields": [
                {"name": "Status", "type": "select", "value": "done"},
                {"name": "Published", "type": "date", "value": "2024-06-01"},
                {"name": "Edited", "type": "date", "value": "2024-07-01"}
            ]
        }))
        .unwrap();
        assert_eq!(row.date_key(), Some("2024-06-01".to_owned()));
    }

    #[test]
    fn test_row_date_key_absent() {
        let row: Row = serde_json::from_value(json!({
            "id": "r1",
            "fields": [{"name": "Status", "type": "select", "value": "done"}]
        }))
        .unwrap();
        assert_eq!(row.date_key(), None);
    }

    #[test]
    fn test_heading_levels() {
        assert_eq!(BlockKind::Heading1.heading_level(), Some(1));
        assert_eq!(BlockKind::Heading3.heading_level(), Some(3));
        assert_eq!(BlockKind::Paragraph.heading_level(), None);
    }

    #[test]
    fn test_subtree_markers() {
        assert!(BlockKind::ChildPage.is_subtree_marker());
        assert!(BlockKind::ChildCollection.is_subtree_marker());
        assert!(!BlockKind::Toggle.is_subtree_marker());
    }
}
