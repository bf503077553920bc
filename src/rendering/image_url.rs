//! Turning SVG text into something an image loader can open.

use super::LoadedImage;
use crate::{Error, Result};
use base64::Engine as _;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

const SVG_DATA_PREFIX: &str = "data:image/svg+xml;charset=utf-8,";
const OBJECT_URL_PREFIX: &str = "blob:rasterhtml/";

/// Builds a loadable URL for an SVG envelope and releases it afterwards.
pub trait ImageUrlStrategy: Send + Sync {
    fn build_url(&self, svg: &str) -> Result<String>;

    /// Called once loading settled, successful or not.
    fn release_url(&self, _url: &str) {}
}

/// Loads an image from a URL built by an [`ImageUrlStrategy`].
pub trait ImageLoader: Send + Sync {
    fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<LoadedImage>>;
}

/// In-memory table behind `blob:` URLs. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<HashMap<String, String>>>,
    next: Arc<AtomicU64>,
}

impl ObjectUrlRegistry {
    pub fn create(&self, content: &str) -> String {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}{}", OBJECT_URL_PREFIX, id);
        self.lock().insert(url.clone(), content.to_string());
        url
    }

    pub fn revoke(&self, url: &str) {
        self.lock().remove(url);
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.lock().get(url).cloned()
    }

    /// Number of URLs not yet revoked.
    pub fn live(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Object URLs from a shared [`ObjectUrlRegistry`].
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlStrategy {
    registry: ObjectUrlRegistry,
}

impl ObjectUrlStrategy {
    pub fn new(registry: ObjectUrlRegistry) -> Self {
        Self { registry }
    }
}

impl ImageUrlStrategy for ObjectUrlStrategy {
    fn build_url(&self, svg: &str) -> Result<String> {
        Ok(self.registry.create(svg))
    }

    fn release_url(&self, url: &str) {
        self.registry.revoke(url);
    }
}

/// Self-contained percent-encoded `data:` URLs. Nothing to release.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUriStrategy;

impl ImageUrlStrategy for DataUriStrategy {
    fn build_url(&self, svg: &str) -> Result<String> {
        Ok(format!("{}{}", SVG_DATA_PREFIX, urlencoding::encode(svg)))
    }
}

/// Accepts well-formed SVG from `data:` URLs or a registry's `blob:` URLs.
#[derive(Debug, Clone, Default)]
pub struct SvgImageLoader {
    registry: ObjectUrlRegistry,
}

impl SvgImageLoader {
    pub fn new(registry: ObjectUrlRegistry) -> Self {
        Self { registry }
    }

    fn read(&self, url: &str) -> Result<String> {
        if url.starts_with(OBJECT_URL_PREFIX) {
            return self
                .registry
                .get(url)
                .ok_or_else(|| Error::Render(format!("Unknown object URL {}", url)));
        }
        if !crate::util::is_data_uri(url) {
            return Err(Error::Render(format!("Unsupported image URL {}", url)));
        }
        let (header, payload) = url[5..]
            .split_once(',')
            .ok_or_else(|| Error::Render("Malformed data URL".into()))?;
        if header.to_ascii_lowercase().ends_with(";base64") {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(payload)
                .map_err(|e| Error::Render(e.to_string()))?;
            String::from_utf8(bytes).map_err(|e| Error::Render(e.to_string()))
        } else {
            urlencoding::decode(payload)
                .map(|s| s.into_owned())
                .map_err(|e| Error::Render(e.to_string()))
        }
    }
}

impl ImageLoader for SvgImageLoader {
    fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<LoadedImage>> {
        async move {
            let svg = self.read(url)?;
            LoadedImage::from_svg(svg)
        }
        .boxed()
    }
}

impl LoadedImage {
    /// Validate SVG text and read its intrinsic size.
    pub fn from_svg(svg: String) -> Result<Self> {
        let (width, height) = {
            let xml = roxmltree::Document::parse(&svg)
                .map_err(|e| Error::Render(format!("Invalid SVG: {}", e)))?;
            let root = xml.root_element();
            if root.tag_name().name() != "svg" {
                return Err(Error::Render(format!(
                    "Expected <svg> root, found <{}>",
                    root.tag_name().name()
                )));
            }
            (length(root.attribute("width")), length(root.attribute("height")))
        };
        Ok(Self { width, height, svg })
    }
}

fn length(value: Option<&str>) -> u32 {
    value
        .map(|v| v.trim().trim_end_matches("px"))
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.round() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"40\" height=\"30\"></svg>";

    #[tokio::test]
    async fn object_urls_round_trip_through_the_registry() {
        let registry = ObjectUrlRegistry::default();
        let strategy = ObjectUrlStrategy::new(registry.clone());
        let loader = SvgImageLoader::new(registry.clone());

        let url = strategy.build_url(SVG).unwrap();
        assert!(url.starts_with("blob:"));
        let image = loader.load(&url).await.unwrap();
        assert_eq!((image.width, image.height), (40, 30));

        strategy.release_url(&url);
        assert_eq!(registry.live(), 0);
        assert!(loader.load(&url).await.is_err());
    }

    #[tokio::test]
    async fn data_urls_are_percent_encoded() {
        let url = DataUriStrategy.build_url(SVG).unwrap();
        assert!(url.starts_with("data:image/svg+xml;charset=utf-8,%3Csvg%20"));
        let image = SvgImageLoader::default().load(&url).await.unwrap();
        assert_eq!(image.svg, SVG);
    }

    #[tokio::test]
    async fn malformed_svg_is_rejected() {
        let url = DataUriStrategy.build_url("<svg><foreignObject></svg>").unwrap();
        let err = SvgImageLoader::default().load(&url).await.unwrap_err();
        assert!(matches!(err, Error::Render(_)));
    }

    #[test]
    fn non_svg_root_is_rejected() {
        assert!(LoadedImage::from_svg("<html/>".into()).is_err());
    }
}
