//! Phase 4: references inside stylesheets.

use super::{style_elements, InlineContext};
use crate::css::{CssRule, Declaration, RuleKind, Stylesheet};
use crate::dom::{Document, NodeId};
use crate::fanout::map_ordered;
use crate::util::{data_uri, font_mime_for, is_data_uri, join_url, locate_css_url};
use crate::{ResourceError, ResourceType, Result};

struct ParsedRule {
    rule: CssRule,
    body: Option<(String, Vec<Declaration>)>,
    changed: bool,
}

struct ParsedSheet {
    node: NodeId,
    rules: Vec<ParsedRule>,
}

/// One declaration value to embed.
struct Target {
    sheet: usize,
    rule: usize,
    decl: usize,
    kind: ResourceType,
    url: String,
    prefix: String,
    rest: String,
}

/// Embed `background-image` and `background` values of style rules and `src`
/// values of `@font-face` rules in every `<style>`.
///
/// Only the first `url()` of a value is embedded; anything around it (a
/// `local()` fallback, a `format()` hint, other shorthand parts) is kept as
/// written. Values without a `url()` or already embedded are skipped
/// silently.
pub async fn inline_css_resources(doc: &mut Document, ctx: &InlineContext<'_>) -> Vec<ResourceError> {
    let base = ctx.base_url(doc);
    let mut sheets: Vec<ParsedSheet> = style_elements(doc)
        .into_iter()
        .map(|node| ParsedSheet {
            node,
            rules: Stylesheet::parse(&doc.text_content(node))
                .rules
                .into_iter()
                .map(|rule| ParsedRule {
                    body: rule.declarations(),
                    rule,
                    changed: false,
                })
                .collect(),
        })
        .collect();

    let targets = collect_targets(&sheets, &base);

    let outcomes = map_ordered(&targets, |target| async move {
        embed(ctx, target).await.map_err(|e| {
            log::warn!("{}", e);
            ResourceError::for_url(target.kind, target.url.clone())
        })
    })
    .await;

    let mut errors = Vec::new();
    for (target, outcome) in targets.iter().zip(outcomes) {
        match outcome {
            Ok(value) => {
                let parsed = &mut sheets[target.sheet].rules[target.rule];
                if let Some((_, decls)) = parsed.body.as_mut() {
                    decls[target.decl].value = value;
                    parsed.changed = true;
                }
            }
            Err(err) => errors.push(err),
        }
    }

    for sheet in sheets {
        if !sheet.rules.iter().any(|r| r.changed) {
            continue;
        }
        let rules = sheet
            .rules
            .into_iter()
            .map(|parsed| match (parsed.changed, parsed.body) {
                (true, Some((prelude, decls))) => CssRule::from_declarations(&prelude, &decls),
                _ => parsed.rule,
            })
            .collect();
        doc.set_text_content(sheet.node, &Stylesheet { rules }.to_css());
    }
    errors
}

fn collect_targets(sheets: &[ParsedSheet], base: &str) -> Vec<Target> {
    let mut targets = Vec::new();
    for (sheet_idx, sheet) in sheets.iter().enumerate() {
        for (rule_idx, parsed) in sheet.rules.iter().enumerate() {
            let (properties, kind): (&[&str], _) = match parsed.rule.kind() {
                RuleKind::Style => (&["background-image", "background"], ResourceType::BackgroundImage),
                RuleKind::FontFace => (&["src"], ResourceType::FontFace),
                _ => continue,
            };
            let Some((_, decls)) = &parsed.body else {
                continue;
            };
            for (decl_idx, decl) in decls.iter().enumerate() {
                if !properties.iter().any(|p| decl.name.eq_ignore_ascii_case(p)) {
                    continue;
                }
                let Some((prefix, url, rest)) = locate_css_url(&decl.value) else {
                    continue;
                };
                if is_data_uri(&url) {
                    continue;
                }
                targets.push(Target {
                    sheet: sheet_idx,
                    rule: rule_idx,
                    decl: decl_idx,
                    kind,
                    url: join_url(base, &url),
                    prefix: prefix.to_string(),
                    rest: rest.to_string(),
                });
            }
        }
    }
    targets
}

async fn embed(ctx: &InlineContext<'_>, target: &Target) -> Result<String> {
    let data = match target.kind {
        ResourceType::FontFace => {
            let bytes = ctx.fetch_bytes(&target.url).await?;
            data_uri(font_mime_for(&target.url), &bytes)
        }
        _ => ctx.embed_image(&target.url).await?,
    };
    Ok(format!("{}url(\"{}\"){}", target.prefix, data, target.rest))
}
