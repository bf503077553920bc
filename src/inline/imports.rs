//! Phase 3: `@import` expansion.
//!
//! Imports are replaced by the content they point to, recursively. A
//! [`LoadedSet`] shared by every expansion of one top-level call makes sure
//! each absolute URL is fetched at most once: any later import of the same
//! URL (a duplicate, or the back edge of a cycle) becomes empty text.

use super::{style_elements, InlineContext};
use crate::css::{adjust_resource_paths, CssRule, Stylesheet};
use crate::dom::Document;
use crate::fanout::map_ordered;
use crate::util::join_url;
use crate::{ResourceError, ResourceType};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::Mutex;

/// Absolute stylesheet URLs already fetched during one top-level call.
#[derive(Debug, Default)]
pub struct LoadedSet {
    urls: Mutex<HashSet<String>>,
}

impl LoadedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `url` as loaded. Returns false when it already was.
    pub fn insert(&self, url: &str) -> bool {
        let mut urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());
        urls.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        let urls = self.urls.lock().unwrap_or_else(|e| e.into_inner());
        urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of expanding one stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expanded {
    pub text: String,
    /// Failed imports, nested ones included, in import order.
    pub errors: Vec<ResourceError>,
}

/// What one top-level rule turns into.
enum Substitution {
    Keep,
    Replace(String),
}

/// Expand every `@import` of `css` against `base_url`.
///
/// Text without imports comes back verbatim. Otherwise the rule list is
/// rebuilt with every import replaced by its expansion, whose own imports
/// resolve against the imported URL. A failed import becomes empty text.
pub fn expand_imports<'a>(
    css: &'a str,
    base_url: &'a str,
    ctx: &'a InlineContext<'a>,
    loaded: &'a LoadedSet,
) -> BoxFuture<'a, Expanded> {
    async move {
        let sheet = Stylesheet::parse(css);
        if !sheet.has_imports() {
            return Expanded {
                text: css.to_string(),
                errors: Vec::new(),
            };
        }

        let outcomes = map_ordered(&sheet.rules, |rule| async move {
            let Some(href) = rule.import_href() else {
                return (Substitution::Keep, Vec::new());
            };
            let url = join_url(base_url, &href);
            if !loaded.insert(&url) {
                log::debug!("skipping already loaded stylesheet {}", url);
                return (Substitution::Replace(String::new()), Vec::new());
            }

            match ctx.fetch_text(&url).await {
                Ok(content) => {
                    let content = adjust_resource_paths(&content, &url);
                    let nested = expand_imports(&content, &url, ctx, loaded).await;
                    (Substitution::Replace(nested.text), nested.errors)
                }
                Err(e) => {
                    log::warn!("{}", e);
                    let error = ResourceError::for_url(ResourceType::Stylesheet, url);
                    (Substitution::Replace(String::new()), vec![error])
                }
            }
        })
        .await;

        let mut errors = Vec::new();
        let mut rules: Vec<CssRule> = Vec::with_capacity(sheet.rules.len());
        for (rule, (substitution, nested_errors)) in sheet.rules.iter().zip(outcomes) {
            errors.extend(nested_errors);
            match substitution {
                Substitution::Keep => rules.push(rule.clone()),
                Substitution::Replace(text) => rules.extend(Stylesheet::parse(&text).rules),
            }
        }

        Expanded {
            text: Stylesheet { rules }.to_css(),
            errors,
        }
    }
    .boxed()
}

/// Expand the imports of every `<style>` in the document with one loaded
/// set for the whole call.
pub async fn inline_css_imports(doc: &mut Document, ctx: &InlineContext<'_>) -> Vec<ResourceError> {
    let base = ctx.base_url(doc);
    let loaded = LoadedSet::new();
    let sheets: Vec<_> = style_elements(doc)
        .into_iter()
        .map(|id| (id, doc.text_content(id)))
        .collect();

    let outcomes = map_ordered(&sheets, |(_, css)| expand_imports(css, &base, ctx, &loaded)).await;

    let mut errors = Vec::new();
    for ((id, css), expanded) in sheets.iter().zip(outcomes) {
        if expanded.text != *css {
            doc.set_text_content(*id, &expanded.text);
        }
        errors.extend(expanded.errors);
    }
    errors
}
