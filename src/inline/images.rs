//! Phase 1: image elements.

use super::InlineContext;
use crate::dom::{Document, NodeId};
use crate::fanout::map_ordered;
use crate::util::{is_data_uri, join_url};
use crate::{ResourceError, ResourceType};

/// Replace the `src` of every `<img>` and `<input type=image>` with a PNG
/// `data:` reference. Elements already carrying a `data:` source are skipped.
pub async fn inline_images(doc: &mut Document, ctx: &InlineContext<'_>) -> Vec<ResourceError> {
    let base = ctx.base_url(doc);
    let targets: Vec<(NodeId, String)> = image_elements(doc)
        .into_iter()
        .filter_map(|id| doc.attr(id, "src").map(|src| (id, src.to_string())))
        .filter(|(_, src)| !is_data_uri(src))
        .collect();

    let outcomes = map_ordered(targets, |(id, src)| {
        let url = join_url(&base, &src);
        async move {
            match ctx.embed_image(&url).await {
                Ok(data) => (id, Ok(data)),
                Err(e) => {
                    log::warn!("{}", e);
                    (id, Err(ResourceError::for_url(ResourceType::Image, url)))
                }
            }
        }
    })
    .await;

    let mut errors = Vec::new();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(data) => doc.set_attr(id, "src", &data),
            Err(err) => errors.push(err),
        }
    }
    errors
}

fn image_elements(doc: &Document) -> Vec<NodeId> {
    let inputs = doc.elements_by_tag_name("input").into_iter().filter(|&id| {
        doc.attr(id, "type")
            .map(|t| t.eq_ignore_ascii_case("image"))
            .unwrap_or(false)
    });
    doc.elements_by_tag_name("img")
        .into_iter()
        .chain(inputs)
        .collect()
}
