//! rasterhtml
//!
//! Turns an HTML document and everything it links to into one
//! self-contained image. Images, linked stylesheets, `@import` chains,
//! background images and web fonts are fetched concurrently and embedded as
//! `data:` references; the inlined document is then wrapped in an SVG
//! `foreignObject` envelope and handed to an image loader and a surface.
//!
//! # Features
//!
//! - **http** (default): `reqwest`-backed [`fetch::HttpFetcher`] and the
//!   `rasterhtml` binary
//! - **script** (default): optional script phase on `boa_engine`
//! - **Partial failure**: every resource that cannot be embedded is reported
//!   as a [`ResourceError`]; rendering still goes ahead
//!
//! # Example
//!
//! ```no_run
//! use rasterhtml::{RasterizeConfig, Viewport};
//! use rasterhtml::rendering::BufferSurface;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RasterizeConfig {
//!     viewport: Viewport { width: 800, height: 600 },
//!     cache: false,
//!     ..Default::default()
//! };
//!
//! let rasterizer = rasterhtml::new_rasterizer(config)?;
//! let mut surface = BufferSurface::new(800, 600);
//! let rendered = rasterizer.draw_url("https://example.com", Some(&mut surface)).await;
//! println!("{}", serde_json::to_string(&rendered.errors)?);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod error;
pub use error::{Error, Result};

pub mod css;
pub mod dom;
pub mod fanout;
pub mod fetch;
pub mod inline;
pub mod rendering;
pub mod script;
pub mod util;

pub use dom::Document;
pub use inline::{inline_references, InlineContext, InlineOptions};
pub use rendering::{LoadedImage, RenderHost, Surface};

use fetch::{Fetcher, ImageDecoder, PngReencoder};
use script::ScriptRunner;

/// Configuration for a [`Rasterizer`]
///
/// A plain struct with public fields; build it with struct update syntax
/// from [`Default`].
///
/// # Examples
///
/// ```
/// let cfg = rasterhtml::RasterizeConfig::default();
/// assert!(cfg.cache);
/// assert_eq!(cfg.viewport.width, 300);
/// ```
#[derive(Debug, Clone)]
pub struct RasterizeConfig {
    /// Overrides the document's own base URL for relative references
    pub base_url: Option<String>,
    /// When false, every request carries a cache-busting parameter
    pub cache: bool,
    /// Envelope width; defaults to the surface width, then the viewport
    pub width: Option<u32>,
    /// Envelope height; defaults to the surface height, then the viewport
    pub height: Option<u32>,
    /// Fallback size when neither an explicit size nor a surface is given
    pub viewport: Viewport,
    /// User agent string to send with requests
    pub user_agent: String,
    /// Timeout for each request in milliseconds
    pub timeout_ms: u64,
    /// Custom HTTP headers
    pub headers: HashMap<String, String>,
    /// Run inline scripts after inlining
    pub execute_js: bool,
    /// How long scripts may keep scheduling work before results are read
    pub execute_js_timeout_ms: u64,
    /// Maximum loop iterations before Boa throws an error (0 => disabled)
    pub script_loop_iteration_limit: u64,
    /// Maximum recursion depth before Boa throws (usize::MAX => disabled)
    pub script_recursion_limit: usize,
    /// Attach a hidden scaffold node to the host document while loading
    pub background_image_workaround: bool,
}

impl Default for RasterizeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            cache: true,
            width: None,
            height: None,
            viewport: Viewport::default(),
            user_agent: concat!("Mozilla/5.0 (X11; Linux x86_64) rasterhtml/", env!("CARGO_PKG_VERSION"))
                .to_string(),
            timeout_ms: 30000,
            headers: HashMap::new(),
            execute_js: false,
            execute_js_timeout_ms: 0,
            script_loop_iteration_limit: 1000000,
            script_recursion_limit: 1024,
            background_image_workaround: true,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 300,
            height: 200,
        }
    }
}

/// Kind of resource an error record is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceType {
    Image,
    Stylesheet,
    FontFace,
    BackgroundImage,
    Document,
    Page,
    ScriptExecution,
}

/// One entry of the error report
///
/// Serializes as `{"resourceType": "...", "url": "...", "msg": "..."}` with
/// absent fields left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceError {
    pub resource_type: ResourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ResourceError {
    pub fn for_url(resource_type: ResourceType, url: impl Into<String>) -> Self {
        Self {
            resource_type,
            url: Some(url.into()),
            msg: None,
        }
    }

    pub fn with_msg(resource_type: ResourceType, msg: impl Into<String>) -> Self {
        Self {
            resource_type,
            url: None,
            msg: Some(msg.into()),
        }
    }
}

/// Outcome of a draw call
///
/// `image` is `None` only when rendering itself failed; `errors` may be
/// non-empty either way.
#[derive(Debug)]
pub struct Rendered {
    pub image: Option<LoadedImage>,
    pub errors: Vec<ResourceError>,
}

/// Inlines and renders documents with one set of collaborators
pub struct Rasterizer {
    config: RasterizeConfig,
    fetcher: Box<dyn Fetcher>,
    decoder: Box<dyn ImageDecoder>,
    scripts: Option<Box<dyn ScriptRunner>>,
    host: RenderHost,
}

impl Rasterizer {
    /// Build a rasterizer around the given fetcher, with the default
    /// decoder, script runner and render host.
    pub fn with_fetcher(config: RasterizeConfig, fetcher: Box<dyn Fetcher>) -> Self {
        let scripts = default_script_runner(&config);
        let host = RenderHost::default().with_background_image_workaround(config.background_image_workaround);
        Self {
            config,
            fetcher,
            decoder: Box::new(PngReencoder),
            scripts,
            host,
        }
    }

    pub fn with_decoder(mut self, decoder: Box<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_script_runner(mut self, runner: Box<dyn ScriptRunner>) -> Self {
        self.scripts = Some(runner);
        self
    }

    /// Replace the render host. The config's workaround flag is applied to it.
    pub fn with_render_host(mut self, host: RenderHost) -> Self {
        self.host = host.with_background_image_workaround(self.config.background_image_workaround);
        self
    }

    pub fn config(&self) -> &RasterizeConfig {
        &self.config
    }

    pub fn render_host(&self) -> &RenderHost {
        &self.host
    }

    fn inline_options(&self, base_url: Option<&str>) -> InlineOptions {
        InlineOptions {
            base_url: base_url
                .map(str::to_string)
                .or_else(|| self.config.base_url.clone()),
            cache: self.config.cache,
        }
    }

    /// Run only the inlining phases (and the script phase when enabled).
    pub async fn inline(&self, doc: &mut Document) -> Vec<ResourceError> {
        self.inline_with_base(doc, None).await
    }

    async fn inline_with_base(&self, doc: &mut Document, base_url: Option<&str>) -> Vec<ResourceError> {
        let ctx = InlineContext::new(
            self.fetcher.as_ref(),
            self.decoder.as_ref(),
            self.inline_options(base_url),
        );
        let mut errors = inline_references(doc, &ctx).await;

        if self.config.execute_js {
            match &self.scripts {
                Some(runner) => errors.extend(
                    script::execute_scripts(doc, runner.as_ref(), self.config.execute_js_timeout_ms).await,
                ),
                None => log::warn!("execute_js is set but no script runner is available"),
            }
        }
        errors
    }

    /// Inline `doc` in place and render it.
    pub async fn draw_document(&self, doc: &mut Document, surface: Option<&mut dyn Surface>) -> Rendered {
        self.draw_with_base(doc, surface, None).await
    }

    /// Parse `html` as a full document and render it.
    pub async fn draw_html(&self, html: &str, surface: Option<&mut dyn Surface>) -> Rendered {
        let mut doc = Document::parse(html);
        self.draw_with_base(&mut doc, surface, None).await
    }

    /// Fetch and parse a page, with its URL as the document base.
    ///
    /// A failed fetch comes back as the `page` error record.
    pub async fn load_page(&self, url: &str) -> std::result::Result<Document, ResourceError> {
        let options = fetch::FetchOptions {
            use_cache: self.config.cache,
        };
        match self.fetcher.fetch(url, options).await {
            Ok(bytes) => Ok(Document::parse_with_base(&String::from_utf8_lossy(&bytes), url)),
            Err(e) => {
                log::warn!("{}", e);
                Err(ResourceError {
                    resource_type: ResourceType::Page,
                    url: Some(url.to_string()),
                    msg: Some(format!("Unable to load page {}", url)),
                })
            }
        }
    }

    /// Fetch a page and render it, resolving its references against its URL.
    pub async fn draw_url(&self, url: &str, surface: Option<&mut dyn Surface>) -> Rendered {
        match self.load_page(url).await {
            Ok(mut doc) => self.draw_with_base(&mut doc, surface, Some(url)).await,
            Err(page) => Rendered {
                image: None,
                errors: vec![page],
            },
        }
    }

    async fn draw_with_base(
        &self,
        doc: &mut Document,
        surface: Option<&mut dyn Surface>,
        base_url: Option<&str>,
    ) -> Rendered {
        let mut errors = self.inline_with_base(doc, base_url).await;

        let fallback = surface
            .as_ref()
            .map(|s| s.size())
            .unwrap_or((self.config.viewport.width, self.config.viewport.height));
        let width = self.config.width.unwrap_or(fallback.0);
        let height = self.config.height.unwrap_or(fallback.1);

        let report = rendering::render_document(doc, width, height, surface, &self.host).await;
        errors.extend(report.error);
        Rendered {
            image: report.image,
            errors,
        }
    }
}

fn default_script_runner(config: &RasterizeConfig) -> Option<Box<dyn ScriptRunner>> {
    #[cfg(feature = "script")]
    {
        Some(Box::new(script::BoaScriptRunner {
            loop_iteration_limit: config.script_loop_iteration_limit,
            recursion_limit: config.script_recursion_limit,
        }))
    }
    #[cfg(not(feature = "script"))]
    {
        let _ = config;
        None
    }
}

/// Create a rasterizer backed by the HTTP fetcher
#[cfg(feature = "http")]
pub fn new_rasterizer(config: RasterizeConfig) -> Result<Rasterizer> {
    let fetcher = fetch::HttpFetcher::new(&config)?;
    Ok(Rasterizer::with_fetcher(config, Box::new(fetcher)))
}

/// Inline and render an existing document.
#[cfg(feature = "http")]
pub async fn draw_document(
    doc: &mut Document,
    surface: Option<&mut dyn Surface>,
    config: RasterizeConfig,
) -> Result<Rendered> {
    Ok(new_rasterizer(config)?.draw_document(doc, surface).await)
}

/// Parse, inline and render an HTML string.
#[cfg(feature = "http")]
pub async fn draw_html(html: &str, surface: Option<&mut dyn Surface>, config: RasterizeConfig) -> Result<Rendered> {
    Ok(new_rasterizer(config)?.draw_html(html, surface).await)
}

/// Fetch, inline and render a page.
#[cfg(feature = "http")]
pub async fn draw_url(url: &str, surface: Option<&mut dyn Surface>, config: RasterizeConfig) -> Result<Rendered> {
    Ok(new_rasterizer(config)?.draw_url(url, surface).await)
}
