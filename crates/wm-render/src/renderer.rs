//! Per-block HTML rendering.
//!
//! Dispatch is by block kind. Unknown kinds render as a generic wrapper
//! around their rendered children so no content is ever dropped, and no
//! malformed payload field can abort a page render. Consecutive sibling
//! list items of the same list type are grouped into a single enclosing
//! list element before their items render individually.

use std::fmt::Write;

use wm_source::{Block, BlockKind, normalize_id};

use crate::RenderError;
use crate::context::{HeadingRef, RenderContext};
use crate::html::{escape_attr, escape_html, sanitize_token};
use crate::richtext::render_spans;

/// Width buckets for responsive image variants of local assets.
const IMAGE_WIDTHS: [u32; 3] = [480, 800, 1200];

/// Render a whole page: collects headings for table-of-contents blocks,
/// then renders the block sequence.
pub fn render_page(blocks: &[Block], ctx: &mut RenderContext) -> Result<String, RenderError> {
    ctx.headings = collect_heading_refs(blocks);
    render_blocks(blocks, ctx)
}

/// Render a sequence of sibling blocks, grouping consecutive list items of
/// the same list type into one `<ul>`/`<ol>`.
pub fn render_blocks(blocks: &[Block], ctx: &mut RenderContext) -> Result<String, RenderError> {
    let mut out = String::new();
    let mut i = 0;

    while i < blocks.len() {
        let kind = blocks[i].kind;
        if matches!(kind, BlockKind::BulletedListItem | BlockKind::NumberedListItem) {
            let mut j = i;
            while j < blocks.len() && blocks[j].kind == kind {
                j += 1;
            }
            let tag = if kind == BlockKind::BulletedListItem {
                "ul"
            } else {
                "ol"
            };
            let _ = write!(out, "<{tag}>");
            for item in &blocks[i..j] {
                out.push_str(&render_list_item(item, ctx)?);
            }
            let _ = write!(out, "</{tag}>");
            i = j;
        } else {
            out.push_str(&render_block(&blocks[i], ctx)?);
            i += 1;
        }
    }

    Ok(out)
}

/// Render a single block.
pub fn render_block(block: &Block, ctx: &mut RenderContext) -> Result<String, RenderError> {
    match block.kind {
        BlockKind::Paragraph => {
            let text = render_spans(&block.rich_text(), ctx);
            let children = render_nested(block, ctx)?;
            Ok(format!("<p>{text}</p>{children}"))
        }
        BlockKind::Heading1 | BlockKind::Heading2 | BlockKind::Heading3 => {
            render_heading(block, ctx)
        }
        BlockKind::BulletedListItem => {
            // Reached only for a lone item outside a grouped run.
            Ok(format!("<ul>{}</ul>", render_list_item(block, ctx)?))
        }
        BlockKind::NumberedListItem => {
            Ok(format!("<ol>{}</ol>", render_list_item(block, ctx)?))
        }
        BlockKind::ToDo => {
            let text = render_spans(&block.rich_text(), ctx);
            let checkbox = if block.bool_field("checked") {
                r#"<input type="checkbox" checked disabled>"#
            } else {
                r#"<input type="checkbox" disabled>"#
            };
            let children = render_nested(block, ctx)?;
            Ok(format!(
                r#"<div class="to-do">{checkbox}<span>{text}</span></div>{children}"#
            ))
        }
        BlockKind::Toggle => {
            let summary = render_spans(&block.rich_text(), ctx);
            let body = render_blocks(&block.children, ctx)?;
            Ok(format!("<details><summary>{summary}</summary>{body}</details>"))
        }
        BlockKind::Quote => {
            let text = render_spans(&block.rich_text(), ctx);
            let children = render_blocks(&block.children, ctx)?;
            Ok(format!("<blockquote><p>{text}</p>{children}</blockquote>"))
        }
        BlockKind::Callout => {
            let icon = block.str_field("icon");
            let icon_html = if icon.is_empty() {
                String::new()
            } else {
                format!(r#"<span class="callout-icon">{}</span>"#, escape_html(icon))
            };
            let text = render_spans(&block.rich_text(), ctx);
            let children = render_blocks(&block.children, ctx)?;
            Ok(format!(
                r#"<aside class="callout">{icon_html}<div class="callout-body"><p>{text}</p>{children}</div></aside>"#
            ))
        }
        BlockKind::Code => {
            let language = sanitize_token(block.str_field("language"));
            let source = escape_html(&block.plain_text());
            if language.is_empty() {
                Ok(format!("<pre><code>{source}</code></pre>"))
            } else {
                Ok(format!(
                    r#"<pre><code class="language-{language}">{source}</code></pre>"#
                ))
            }
        }
        BlockKind::Equation => Ok(render_equation(block, ctx)),
        BlockKind::Divider => Ok("<hr>".to_owned()),
        BlockKind::Image => render_image(block, ctx),
        BlockKind::Video => {
            let url = block.str_field("url");
            Ok(format!(
                r#"<video controls src="{}"></video>"#,
                escape_attr(url)
            ))
        }
        BlockKind::Bookmark => {
            let url = block.str_field("url");
            let title = block.plain_text();
            let label = if title.is_empty() { url } else { &title };
            Ok(format!(
                r#"<a class="bookmark" href="{}">{}</a>"#,
                escape_attr(url),
                escape_html(label)
            ))
        }
        BlockKind::Embed => {
            let url = block.str_field("url");
            Ok(format!(
                r#"<iframe class="embed" src="{}"></iframe>"#,
                escape_attr(url)
            ))
        }
        BlockKind::Table => Ok(render_table(block, ctx)),
        BlockKind::TableRow => {
            // A row without its table wrapper; render it as a one-row table.
            let wrapper = Block {
                id: block.id.clone(),
                kind: BlockKind::Table,
                has_children: true,
                children: vec![block.clone()],
                data: serde_json::Map::new(),
            };
            Ok(render_table(&wrapper, ctx))
        }
        BlockKind::TableOfContents => Ok(render_toc(ctx)),
        BlockKind::ColumnList => render_columns(block, ctx),
        BlockKind::Column => render_blocks(&block.children, ctx),
        BlockKind::ChildPage => Ok(render_child_page(block, ctx)),
        BlockKind::ChildCollection => Ok(render_child_collection(block, ctx)),
        BlockKind::Unknown => {
            // A table that lost its wrapper kind still renders as a table
            // when every child is a row.
            if !block.children.is_empty()
                && block.children.iter().all(|c| c.kind == BlockKind::TableRow)
            {
                return Ok(render_table(block, ctx));
            }
            let children = render_blocks(&block.children, ctx)?;
            Ok(format!(r#"<div class="unsupported-block">{children}</div>"#))
        }
    }
}

/// Render nested children inside an indented container, or nothing.
fn render_nested(block: &Block, ctx: &mut RenderContext) -> Result<String, RenderError> {
    if block.children.is_empty() {
        return Ok(String::new());
    }
    let inner = render_blocks(&block.children, ctx)?;
    Ok(format!(r#"<div class="block-children">{inner}</div>"#))
}

fn render_list_item(block: &Block, ctx: &mut RenderContext) -> Result<String, RenderError> {
    let text = render_spans(&block.rich_text(), ctx);
    let children = render_blocks(&block.children, ctx)?;
    Ok(format!("<li>{text}{children}</li>"))
}

fn render_heading(block: &Block, ctx: &mut RenderContext) -> Result<String, RenderError> {
    let level = block.kind.heading_level().unwrap_or(1);
    let anchor = heading_anchor(block);
    let text = render_spans(&block.rich_text(), ctx);

    if block.bool_field("is_toggleable") {
        let body = render_blocks(&block.children, ctx)?;
        Ok(format!(
            r#"<details class="toggle-heading"><summary><h{level} id="{anchor}">{text}</h{level}></summary>{body}</details>"#
        ))
    } else {
        Ok(format!(r#"<h{level} id="{anchor}">{text}</h{level}>"#))
    }
}

/// Heading anchors match the block's canonical id so table-of-contents
/// links and external deep links agree on the target.
fn heading_anchor(block: &Block) -> String {
    let id = normalize_id(&block.id);
    if id.is_empty() {
        sanitize_token(&block.id)
    } else {
        id
    }
}

fn render_equation(block: &Block, ctx: &RenderContext) -> String {
    let expression = block.str_field("expression");
    if let Some(typeset) = ctx.math
        && let Ok(html) = typeset(expression)
    {
        return format!(r#"<div class="equation">{html}</div>"#);
    }
    // No typesetter, or it failed: show the raw expression rather than
    // failing the page.
    format!(
        r#"<div class="equation"><code>{}</code></div>"#,
        escape_html(expression)
    )
}

fn render_image(block: &Block, ctx: &mut RenderContext) -> Result<String, RenderError> {
    let url = block.str_field("url").to_owned();
    let caption_spans = block.spans("caption");
    let caption = render_spans(&caption_spans, ctx);
    let alt = caption_spans
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("");

    let img = if block.bool_field("external") {
        format!(
            r#"<img src="{}" alt="{}">"#,
            escape_attr(&url),
            escape_attr(&alt)
        )
    } else {
        // Workspace-hosted file: fetch through the asset sink under the
        // block's canonical id, then emit width-bucketed variants.
        let stable_name = {
            let id = normalize_id(&block.id);
            if id.is_empty() { block.id.clone() } else { id }
        };
        let filename = ctx.assets.download(&url, &stable_name)?;
        let local = format!("{}/{filename}", ctx.assets_base);
        let srcset = IMAGE_WIDTHS
            .iter()
            .map(|w| format!("{local}?width={w} {w}w"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            r#"<img src="{}" srcset="{}" alt="{}">"#,
            escape_attr(&local),
            escape_attr(&srcset),
            escape_attr(&alt)
        )
    };

    if caption.is_empty() {
        Ok(format!("<figure>{img}</figure>"))
    } else {
        Ok(format!("<figure>{img}<figcaption>{caption}</figcaption></figure>"))
    }
}

fn render_table(block: &Block, ctx: &RenderContext) -> String {
    let rows: Vec<&Block> = block
        .children
        .iter()
        .filter(|c| c.kind == BlockKind::TableRow)
        .collect();

    let declared = usize::try_from(block.u64_field("table_width").unwrap_or(0)).unwrap_or(0);
    let observed = rows.iter().map(|r| r.cells().len()).max().unwrap_or(0);
    let width = declared.max(observed).max(1);

    let column_header = block.bool_field("has_column_header");
    let row_header = block.bool_field("has_row_header");

    let mut out = String::from("<table>");
    for (row_index, row) in rows.iter().enumerate() {
        let cells = row.cells();
        out.push_str("<tr>");
        for col_index in 0..width {
            let content = cells
                .get(col_index)
                .map(|spans| render_spans(spans, ctx))
                .unwrap_or_default();
            let header = (row_index == 0 && column_header) || (col_index == 0 && row_header);
            let tag = if header { "th" } else { "td" };
            let _ = write!(out, "<{tag}>{content}</{tag}>");
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}

fn render_toc(ctx: &RenderContext) -> String {
    let mut out = String::from(r#"<nav class="table-of-contents"><ul>"#);
    for heading in &ctx.headings {
        let _ = write!(
            out,
            r##"<li class="toc-level-{}"><a href="#{}">{}</a></li>"##,
            heading.level,
            escape_attr(&heading.anchor),
            escape_html(&heading.text)
        );
    }
    out.push_str("</ul></nav>");
    out
}

fn render_columns(block: &Block, ctx: &mut RenderContext) -> Result<String, RenderError> {
    let columns: Vec<&Block> = block
        .children
        .iter()
        .filter(|c| c.kind == BlockKind::Column)
        .collect();
    if columns.is_empty() {
        return render_blocks(&block.children, ctx);
    }

    let ratios: Vec<Option<f64>> = columns.iter().map(|c| c.f64_field("width_ratio")).collect();
    let widths = column_widths(&ratios);

    let mut out = String::from(r#"<div class="column-list">"#);
    for (column, width) in columns.iter().zip(widths) {
        let inner = render_blocks(&column.children, ctx)?;
        let _ = write!(
            out,
            r#"<div class="column" style="width:{width}%">{inner}</div>"#
        );
    }
    out.push_str("</div>");
    Ok(out)
}

/// Percent widths from optional per-column ratio hints.
///
/// Hinted columns take their ratio; the remaining width is split evenly
/// across unhinted columns, left to right, and the last column absorbs the
/// rounding remainder so the total is always exactly 100.
fn column_widths(ratios: &[Option<f64>]) -> Vec<u32> {
    let count = ratios.len();
    if count == 0 {
        return Vec::new();
    }

    let hinted_sum: f64 = ratios.iter().flatten().filter(|r| **r > 0.0).sum();
    let unhinted = ratios.iter().filter(|r| r.is_none_or(|v| v <= 0.0)).count();
    let remaining = (1.0 - hinted_sum).max(0.0);
    let even = if unhinted > 0 {
        remaining / unhinted as f64
    } else {
        0.0
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut widths: Vec<u32> = ratios
        .iter()
        .map(|r| {
            let ratio = match r {
                Some(v) if *v > 0.0 => *v,
                _ => even,
            };
            (ratio * 100.0).round().clamp(0.0, 100.0) as u32
        })
        .collect();

    let sum_except_last: u32 = widths[..count - 1].iter().sum();
    widths[count - 1] = 100u32.saturating_sub(sum_except_last);
    widths
}

fn render_child_page(block: &Block, ctx: &RenderContext) -> String {
    let title = {
        let t = block.str_field("title");
        if t.is_empty() { "Untitled" } else { t }
    };
    let id = normalize_id(&block.id);
    if let Some(route) = ctx.routes_by_id.get(&id) {
        format!(
            r#"<a class="child-page" href="{}">{}</a>"#,
            escape_attr(route),
            escape_html(title)
        )
    } else {
        format!(r#"<div class="child-page">{}</div>"#, escape_html(title))
    }
}

/// Inline collection block: reuses the same listing template as a
/// collection page, with entries injected by the orchestrator.
fn render_child_collection(block: &Block, ctx: &RenderContext) -> String {
    let id = normalize_id(&block.id);
    let title = block.str_field("title");

    match ctx.listings.get(&id) {
        Some(entries) => {
            let mut out = String::from(r#"<div class="collection">"#);
            if !title.is_empty() {
                let _ = write!(
                    out,
                    r#"<h2 class="collection-title">{}</h2>"#,
                    escape_html(title)
                );
            }
            out.push_str(&render_listing(entries));
            out.push_str("</div>");
            out
        }
        None => format!(
            r#"<div class="collection">{}</div>"#,
            escape_html(if title.is_empty() { "Untitled" } else { title })
        ),
    }
}

/// The shared collection listing template, used for collection pages and
/// inline collection blocks alike.
#[must_use]
pub fn render_listing(entries: &[crate::context::ListingEntry]) -> String {
    let mut out = String::from(r#"<ul class="collection-list">"#);
    for entry in entries {
        let date = entry.date.as_deref().map_or(String::new(), |d| {
            format!(r#"<time class="collection-item-date">{}</time>"#, escape_html(d))
        });
        let _ = write!(
            out,
            r#"<li class="collection-item"><a href="{}">{}</a>{date}</li>"#,
            escape_attr(&entry.route_path),
            escape_html(&entry.title)
        );
    }
    out.push_str("</ul>");
    out
}

/// Collect `(level, anchor, text)` for every heading in the block tree,
/// depth-first, for table-of-contents rendering.
fn collect_heading_refs(blocks: &[Block]) -> Vec<HeadingRef> {
    let mut out = Vec::new();
    collect_heading_refs_into(blocks, &mut out);
    out
}

fn collect_heading_refs_into(blocks: &[Block], out: &mut Vec<HeadingRef>) {
    for block in blocks {
        if let Some(level) = block.kind.heading_level() {
            out.push(HeadingRef {
                level,
                anchor: heading_anchor(block),
                text: block.plain_text(),
            });
        }
        collect_heading_refs_into(&block.children, out);
    }
}

/// Plain heading texts of a block tree, depth-first. Used by the search
/// extractor and exposed for callers that need heading lists without a
/// full render.
#[must_use]
pub fn collect_headings(blocks: &[Block]) -> Vec<String> {
    collect_heading_refs(blocks)
        .into_iter()
        .map(|h| h.text)
        .collect()
}
