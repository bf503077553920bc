//! Phase 2: linked stylesheets.

use super::{is_css_type, InlineContext};
use crate::css::adjust_resource_paths;
use crate::dom::{Document, NodeId};
use crate::fanout::map_ordered;
use crate::util::join_url;
use crate::{ResourceError, ResourceType};

/// Replace every `<link rel=stylesheet>` with a `<style>` holding the linked
/// content, at the same position in the tree.
///
/// Relative `@import`, background and font `src` references in the fetched
/// text are rewritten against the stylesheet's own URL. Blank stylesheets only
/// remove the link. A failed fetch keeps the link and records the error.
pub async fn inline_linked_css(doc: &mut Document, ctx: &InlineContext<'_>) -> Vec<ResourceError> {
    let base = ctx.base_url(doc);
    let targets: Vec<(NodeId, String)> = doc
        .elements_by_tag_name("link")
        .into_iter()
        .filter(|&id| is_stylesheet_link(doc, id))
        .filter_map(|id| doc.attr(id, "href").map(|href| (id, href.to_string())))
        .collect();

    let outcomes = map_ordered(targets, |(id, href)| {
        let url = join_url(&base, &href);
        async move {
            match ctx.fetch_text(&url).await {
                Ok(css) => (id, Ok(adjust_resource_paths(&css, &url))),
                Err(e) => {
                    log::warn!("{}", e);
                    (id, Err(ResourceError::for_url(ResourceType::Stylesheet, url)))
                }
            }
        }
    })
    .await;

    let mut errors = Vec::new();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(css) => substitute_link(doc, id, &css),
            Err(err) => errors.push(err),
        }
    }
    errors
}

fn is_stylesheet_link(doc: &Document, id: NodeId) -> bool {
    let rel = doc
        .attr(id, "rel")
        .map(|rel| rel.trim().eq_ignore_ascii_case("stylesheet"))
        .unwrap_or(false);
    rel && is_css_type(doc, id)
}

fn substitute_link(doc: &mut Document, link: NodeId, css: &str) {
    let Some(parent) = doc.parent(link) else {
        return;
    };
    let css = css.trim();
    if !css.is_empty() {
        let style = doc.create_element("style", &[("type", "text/css")]);
        let text = doc.create_text(css);
        doc.append_child(style, text);
        doc.insert_before(parent, style, link);
    }
    doc.remove(link);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inline::testing::{StubDecoder, StubFetcher};
    use crate::inline::InlineOptions;

    async fn run(fetcher: &StubFetcher, doc: &mut Document, options: InlineOptions) -> Vec<ResourceError> {
        let ctx = InlineContext::new(fetcher, &StubDecoder, options);
        inline_linked_css(doc, &ctx).await
    }

    #[tokio::test]
    async fn replaces_link_with_style_in_place() {
        let fetcher = StubFetcher::new().with("url/some.css", "p { font-size: 14px; }");
        let mut doc = Document::parse(
            "<html><head><meta charset=\"utf-8\"><link href=\"url/some.css\" rel=\"stylesheet\" type=\"text/css\"><title>t</title></head></html>",
        );

        let errors = run(&fetcher, &mut doc, InlineOptions::default()).await;

        assert!(errors.is_empty());
        assert!(doc.elements_by_tag_name("link").is_empty());
        let head = doc.head().unwrap();
        let tags: Vec<_> = doc
            .children(head)
            .iter()
            .filter_map(|&c| doc.tag_name(c))
            .collect();
        assert_eq!(tags, vec!["meta", "style", "title"]);
        let style = doc.elements_by_tag_name("style")[0];
        assert_eq!(doc.attr(style, "type"), Some("text/css"));
        assert_eq!(doc.text_content(style), "p { font-size: 14px; }");
    }

    #[tokio::test]
    async fn ignores_non_stylesheet_links() {
        let fetcher = StubFetcher::new();
        let mut doc = Document::parse(
            "<head><link rel=\"icon\" href=\"favicon.ico\"><link rel=\"stylesheet\" type=\"text/less\" href=\"a.less\"></head>",
        );
        let before = doc.to_html();

        let errors = run(&fetcher, &mut doc, InlineOptions::default()).await;

        assert!(errors.is_empty());
        assert!(fetcher.calls().is_empty());
        assert_eq!(doc.to_html(), before);
    }

    #[tokio::test]
    async fn blank_stylesheet_only_removes_the_link() {
        let fetcher = StubFetcher::new().with("empty.css", "  \n ");
        let mut doc = Document::parse("<head><link rel=\"stylesheet\" href=\"empty.css\"></head>");

        let errors = run(&fetcher, &mut doc, InlineOptions::default()).await;

        assert!(errors.is_empty());
        assert!(doc.elements_by_tag_name("link").is_empty());
        assert!(doc.elements_by_tag_name("style").is_empty());
    }

    #[tokio::test]
    async fn rewrites_paths_relative_to_the_stylesheet() {
        let fetcher = StubFetcher::new().with(
            "http://example.com/css/site.css",
            "div { background-image: url(\"../img/bg.png\"); }",
        );
        let mut doc = Document::parse_with_base(
            "<head><link rel=\"stylesheet\" href=\"css/site.css\"></head>",
            "http://example.com/index.html",
        );

        let errors = run(&fetcher, &mut doc, InlineOptions::default()).await;

        assert!(errors.is_empty());
        let style = doc.elements_by_tag_name("style")[0];
        assert_eq!(
            doc.text_content(style),
            "div { background-image: url(\"http://example.com/img/bg.png\"); }"
        );
    }

    #[tokio::test]
    async fn relative_imports_resolve_against_the_stylesheet() {
        let fetcher = StubFetcher::new()
            .with("http://h/css/site.css", "@import url(\"theme.css\");\nbody { margin: 0; }")
            .with("http://h/css/theme.css", "p { color: red; }");
        let mut doc = Document::parse_with_base(
            "<head><link rel=\"stylesheet\" href=\"css/site.css\"></head>",
            "http://h/index.html",
        );
        let ctx = InlineContext::new(&fetcher, &StubDecoder, InlineOptions::default());

        let errors = inline_linked_css(&mut doc, &ctx).await;
        assert!(errors.is_empty());
        let style = doc.elements_by_tag_name("style")[0];
        assert_eq!(
            doc.text_content(style),
            "@import url(\"http://h/css/theme.css\");\nbody { margin: 0; }"
        );

        let errors = crate::inline::inline_css_imports(&mut doc, &ctx).await;
        assert!(errors.is_empty());
        assert_eq!(fetcher.calls(), vec!["http://h/css/site.css", "http://h/css/theme.css"]);
        assert_eq!(doc.text_content(style), "p { color: red; }\nbody { margin: 0; }");
    }

    #[tokio::test]
    async fn failed_links_stay_and_errors_keep_document_order() {
        // The first link takes longest to fail.
        let fetcher = StubFetcher::new()
            .failing_after("http://example.com/missing.css", 40)
            .failing_after("http://example.com/another-missing.css", 5)
            .with("http://example.com/ok.css", "p { color: red; }");
        let mut doc = Document::parse(
            "<head><link rel=\"stylesheet\" href=\"missing.css\"><link rel=\"stylesheet\" href=\"ok.css\">\
             <link rel=\"stylesheet\" href=\"another-missing.css\"></head>",
        );

        let errors = run(
            &fetcher,
            &mut doc,
            InlineOptions {
                base_url: Some("http://example.com/".into()),
                ..Default::default()
            },
        )
        .await;

        assert_eq!(
            errors,
            vec![
                ResourceError::for_url(ResourceType::Stylesheet, "http://example.com/missing.css"),
                ResourceError::for_url(ResourceType::Stylesheet, "http://example.com/another-missing.css"),
            ]
        );
        assert_eq!(doc.elements_by_tag_name("link").len(), 2);
        assert_eq!(doc.elements_by_tag_name("style").len(), 1);
    }
}
