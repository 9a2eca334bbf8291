//! Rich text rendering.
//!
//! Each text run carries independent style annotations and an optional
//! link. Wrappers compose in one fixed order — outermost to innermost:
//! color → code → bold → strikethrough → underline → link → italic — so any
//! combination of annotations nests identically everywhere in a document.

use wm_source::{RichTextSpan, normalize_id};

use crate::context::RenderContext;
use crate::html::{escape_attr, escape_html, sanitize_token};

/// Render a run of rich text spans to inline HTML.
#[must_use]
pub fn render_spans(spans: &[RichTextSpan], ctx: &RenderContext) -> String {
    spans.iter().map(|span| render_span(span, ctx)).collect()
}

fn render_span(span: &RichTextSpan, ctx: &RenderContext) -> String {
    let a = &span.annotations;
    let mut html = escape_html(&span.text);

    // Built innermost-first; see module docs for the resulting nesting.
    if a.italic {
        html = format!("<em>{html}</em>");
    }
    if let Some(href) = &span.href {
        let target = rewrite_link(href, ctx);
        html = format!(r#"<a href="{}">{html}</a>"#, escape_attr(&target));
    }
    if a.underline {
        html = format!("<u>{html}</u>");
    }
    if a.strikethrough {
        html = format!("<s>{html}</s>");
    }
    if a.bold {
        html = format!("<strong>{html}</strong>");
    }
    if a.code {
        html = format!("<code>{html}</code>");
    }
    if a.color != "default" && !a.color.is_empty() {
        html = format!(
            r#"<span class="color-{}">{html}</span>"#,
            sanitize_token(&a.color)
        );
    }
    html
}

/// Rewrite a link target for publication.
///
/// - a target resolving (by normalized id) to a page in this sync becomes
///   that page's route path
/// - an absolute link to this deployment's own domain becomes path-only
/// - anything else passes through unchanged
#[must_use]
pub fn rewrite_link(href: &str, ctx: &RenderContext) -> String {
    let id = normalize_id(href);
    if !id.is_empty()
        && let Some(route) = ctx.routes_by_id.get(&id)
    {
        return route.clone();
    }

    if let Some(domain) = ctx.site_domain {
        for prefix in [format!("https://{domain}"), format!("http://{domain}")] {
            if let Some(rest) = href.strip_prefix(&prefix)
                && (rest.is_empty() || rest.starts_with('/'))
            {
                return if rest.is_empty() {
                    "/".to_owned()
                } else {
                    rest.to_owned()
                };
            }
        }
    }

    href.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoAssets;
    use std::collections::HashMap;
    use wm_source::Annotations;

    fn span(text: &str) -> RichTextSpan {
        RichTextSpan {
            text: text.to_owned(),
            href: None,
            annotations: Annotations::default(),
        }
    }

    fn render_one(span: &RichTextSpan, routes: &HashMap<String, String>) -> String {
        let mut sink = NoAssets;
        let ctx = RenderContext::new(routes, "/assets", &mut sink);
        render_spans(std::slice::from_ref(span), &ctx)
    }

    #[test]
    fn test_plain_span() {
        assert_eq!(render_one(&span("hello"), &HashMap::new()), "hello");
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(render_one(&span("a < b"), &HashMap::new()), "a &lt; b");
    }

    #[test]
    fn test_wrapper_nesting_order() {
        let mut s = span("x");
        s.annotations = Annotations {
            bold: true,
            italic: true,
            underline: true,
            strikethrough: true,
            code: true,
            color: "red".to_owned(),
        };
        assert_eq!(
            render_one(&s, &HashMap::new()),
            r#"<span class="color-red"><code><strong><s><u><em>x</em></u></s></strong></code></span>"#
        );
    }

    #[test]
    fn test_link_wraps_between_underline_and_italic() {
        let mut s = span("x");
        s.href = Some("https://other.example.com/page".to_owned());
        s.annotations.italic = true;
        s.annotations.underline = true;
        assert_eq!(
            render_one(&s, &HashMap::new()),
            r#"<u><a href="https://other.example.com/page"><em>x</em></a></u>"#
        );
    }

    #[test]
    fn test_default_color_adds_no_wrapper() {
        let mut s = span("x");
        s.annotations.bold = true;
        assert_eq!(render_one(&s, &HashMap::new()), "<strong>x</strong>");
    }

    #[test]
    fn test_internal_link_rewritten_to_route() {
        let id = "0a1b2c3d4e5f60718293a4b5c6d7e8f9";
        let mut routes = HashMap::new();
        routes.insert(id.to_owned(), "/news".to_owned());

        let mut s = span("News");
        s.href = Some(format!("https://workspace.example.com/News-{id}?pvs=4"));
        assert_eq!(render_one(&s, &routes), r#"<a href="/news">News</a>"#);
    }

    #[test]
    fn test_own_domain_link_relativized() {
        let routes = HashMap::new();
        let mut sink = NoAssets;
        let ctx = RenderContext::new(&routes, "/assets", &mut sink)
            .with_site_domain("docs.example.com");

        assert_eq!(
            rewrite_link("https://docs.example.com/guides/setup", &ctx),
            "/guides/setup"
        );
        assert_eq!(rewrite_link("https://docs.example.com", &ctx), "/");
        // different domain passes through
        assert_eq!(
            rewrite_link("https://docs.example.community/x", &ctx),
            "https://docs.example.community/x"
        );
    }

    #[test]
    fn test_external_link_passes_through() {
        let mut s = span("ext");
        s.href = Some("https://en.wikipedia.org/wiki/Rust".to_owned());
        assert_eq!(
            render_one(&s, &HashMap::new()),
            r#"<a href="https://en.wikipedia.org/wiki/Rust">ext</a>"#
        );
    }
}
