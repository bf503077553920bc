//! Host capabilities for the rendering handoff.
//!
//! A [`RenderHost`] is built once and carries the URL strategy, the image
//! loader and the host document that scaffold nodes are attached to.

use super::image_url::{
    DataUriStrategy, ImageLoader, ImageUrlStrategy, ObjectUrlRegistry, ObjectUrlStrategy, SvgImageLoader,
};
use super::LoadedImage;
use crate::dom::{Document, NodeId};
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Class and id prefix of scaffold nodes.
pub const SCAFFOLD_ID: &str = "rasterizeHTML_js_FirefoxWorkaround";

const HIDDEN_STYLE: &str =
    "visibility: hidden; width: 0px; height: 0px; position: absolute; top: -10000px; left: -10000px;";

/// Stable small integers for the items seen during one render call.
#[derive(Debug, Default)]
pub struct ScaffoldIds {
    ids: HashMap<usize, usize>,
}

impl ScaffoldIds {
    /// Same item, same id; ids count up from zero in first-seen order.
    pub fn id_for<T: ?Sized>(&mut self, item: &T) -> usize {
        let key = item as *const T as *const () as usize;
        let next = self.ids.len();
        *self.ids.entry(key).or_insert(next)
    }
}

pub struct RenderHost {
    url_strategy: Box<dyn ImageUrlStrategy>,
    loader: Box<dyn ImageLoader>,
    document: Arc<Mutex<Document>>,
    background_image_workaround: bool,
}

impl RenderHost {
    pub fn new(url_strategy: Box<dyn ImageUrlStrategy>, loader: Box<dyn ImageLoader>) -> Self {
        Self {
            url_strategy,
            loader,
            document: Arc::new(Mutex::new(Document::parse("<html><head></head><body></body></html>"))),
            background_image_workaround: true,
        }
    }

    /// Object URLs backed by an in-memory registry.
    pub fn object_urls() -> Self {
        let registry = ObjectUrlRegistry::default();
        Self::new(
            Box::new(ObjectUrlStrategy::new(registry.clone())),
            Box::new(SvgImageLoader::new(registry)),
        )
    }

    /// Self-contained `data:` URLs.
    pub fn data_uris() -> Self {
        Self::new(Box::new(DataUriStrategy), Box::new(SvgImageLoader::default()))
    }

    pub fn with_background_image_workaround(mut self, enabled: bool) -> Self {
        self.background_image_workaround = enabled;
        self
    }

    /// Attach scaffold nodes to `document` instead of a private one.
    pub fn with_document(mut self, document: Arc<Mutex<Document>>) -> Self {
        self.document = document;
        self
    }

    pub fn document(&self) -> Arc<Mutex<Document>> {
        self.document.clone()
    }

    /// Build a URL for `svg` and load it.
    ///
    /// The scaffold node and the URL are released when this returns, on the
    /// error paths too.
    pub async fn load_svg(&self, svg: &str, ids: &mut ScaffoldIds) -> Result<LoadedImage> {
        let mut guard = LoadingGuard {
            host: self,
            scaffold: None,
            url: None,
        };
        if self.background_image_workaround {
            guard.scaffold = self.attach_scaffold(svg, ids.id_for(svg));
        }
        let url = self.url_strategy.build_url(svg)?;
        guard.url = Some(url.clone());

        self.loader.load(&url).await
    }

    // Ids already taken in the host document are skipped, so loads running
    // at the same time never share a scaffold node.
    fn attach_scaffold(&self, svg: &str, preferred: usize) -> Option<NodeId> {
        let mut doc = self.lock_document();
        let body = doc.body().or_else(|| doc.document_element())?;
        let scaffold_id = (preferred..)
            .map(|n| format!("{}{}", SCAFFOLD_ID, n))
            .find(|id| doc.element_by_id(id).is_none())?;
        let div = doc.create_element(
            "div",
            &[
                ("id", scaffold_id.as_str()),
                ("class", SCAFFOLD_ID),
                ("style", HIDDEN_STYLE),
            ],
        );
        doc.append_child(body, div);
        doc.set_inner_html(div, svg);
        Some(div)
    }

    fn lock_document(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RenderHost {
    fn default() -> Self {
        Self::object_urls()
    }
}

struct LoadingGuard<'a> {
    host: &'a RenderHost,
    scaffold: Option<NodeId>,
    url: Option<String>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if let Some(node) = self.scaffold.take() {
            self.host.lock_document().remove(node);
        }
        if let Some(url) = self.url.take() {
            self.host.url_strategy.release_url(&url);
        }
    }
}
