//! Resource inlining pipeline.
//!
//! [`inline_references`] runs four phases over one [`Document`], strictly in
//! sequence:
//!
//! 1. images (`<img>`, `<input type=image>`)
//! 2. linked stylesheets (`<link rel=stylesheet>` becomes `<style>`)
//! 3. `@import` chains inside every `<style>`
//! 4. `background-image` and `@font-face src` references inside every `<style>`
//!
//! Each phase collects its targets from the document, fetches them all at
//! once through [`map_ordered`](crate::fanout::map_ordered), and only then
//! writes the results back in input order. A failing resource is recorded as
//! a [`ResourceError`] and leaves its reference untouched.

pub mod css_resources;
pub mod images;
pub mod imports;
pub mod stylesheets;

#[cfg(test)]
pub(crate) mod testing;

use crate::dom::{Document, NodeId};
use crate::fetch::{FetchOptions, Fetcher, ImageDecoder};
use crate::{ResourceError, Result};

pub use css_resources::inline_css_resources;
pub use images::inline_images;
pub use imports::{expand_imports, inline_css_imports, Expanded, LoadedSet};
pub use stylesheets::inline_linked_css;

/// Options for one inlining call.
#[derive(Debug, Clone)]
pub struct InlineOptions {
    /// Overrides the document's own base for every reference found in it.
    pub base_url: Option<String>,
    /// When false, every fetch bypasses caches.
    pub cache: bool,
}

impl Default for InlineOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            cache: true,
        }
    }
}

/// Collaborators and options shared by every phase of one call.
pub struct InlineContext<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub decoder: &'a dyn ImageDecoder,
    pub options: InlineOptions,
}

impl<'a> InlineContext<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, decoder: &'a dyn ImageDecoder, options: InlineOptions) -> Self {
        Self {
            fetcher,
            decoder,
            options,
        }
    }

    /// Base for references found directly in `doc`: the explicit override if
    /// any, else the document's own base, else none (empty).
    pub fn base_url(&self, doc: &Document) -> String {
        self.options
            .base_url
            .clone()
            .or_else(|| doc.base_url())
            .unwrap_or_default()
    }

    pub(crate) fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            use_cache: self.options.cache,
        }
    }

    pub(crate) async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.fetcher.fetch(url, self.fetch_options()).await
    }

    /// Fetch a stylesheet; invalid UTF-8 is replaced, never rejected.
    pub(crate) async fn fetch_text(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fetch and decode an image into a PNG `data:` reference.
    pub(crate) async fn embed_image(&self, url: &str) -> Result<String> {
        let bytes = self.fetch_bytes(url).await?;
        self.decoder.decode(url, bytes).await
    }
}

/// Run all four phases and concatenate their errors in phase order.
pub async fn inline_references(doc: &mut Document, ctx: &InlineContext<'_>) -> Vec<ResourceError> {
    let mut errors = inline_images(doc, ctx).await;
    log::debug!("images inlined ({} errors so far)", errors.len());

    errors.extend(inline_linked_css(doc, ctx).await);
    log::debug!("linked stylesheets inlined ({} errors so far)", errors.len());

    errors.extend(inline_css_imports(doc, ctx).await);
    log::debug!("stylesheet imports inlined ({} errors so far)", errors.len());

    errors.extend(inline_css_resources(doc, ctx).await);
    log::debug!("stylesheet resources inlined ({} errors total)", errors.len());

    errors
}

/// `type` absent or `text/css`.
pub(crate) fn is_css_type(doc: &Document, id: NodeId) -> bool {
    doc.attr(id, "type")
        .map(|t| t.trim().eq_ignore_ascii_case("text/css"))
        .unwrap_or(true)
}

/// Every `<style>` that holds CSS, in document order.
pub(crate) fn style_elements(doc: &Document) -> Vec<NodeId> {
    doc.elements_by_tag_name("style")
        .into_iter()
        .filter(|&id| is_css_type(doc, id))
        .collect()
}
