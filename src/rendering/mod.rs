//! Rendering handoff: inlined document -> SVG envelope -> loaded image -> surface.

pub mod host;
pub mod image_url;

pub use host::{RenderHost, ScaffoldIds, SCAFFOLD_ID};
pub use image_url::{
    DataUriStrategy, ImageLoader, ImageUrlStrategy, ObjectUrlRegistry, ObjectUrlStrategy, SvgImageLoader,
};

use crate::dom::Document;
use crate::{ResourceError, Result};
use std::fmt;

const RENDER_ERROR_MSG: &str = "Error rendering page";

/// Where a render call stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Inlined,
    Serialized,
    ImageLoading,
    Decoded,
    Failed,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderState::Inlined => "inlined",
            RenderState::Serialized => "serialized",
            RenderState::ImageLoading => "image-loading",
            RenderState::Decoded => "decoded",
            RenderState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// An SVG envelope accepted by an [`ImageLoader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub svg: String,
}

/// Raster target that loaded images are drawn onto.
pub trait Surface: Send {
    /// Size used for the envelope when the caller gives none.
    fn size(&self) -> (u32, u32);

    fn draw_image(&mut self, image: &LoadedImage, x: i32, y: i32) -> Result<()>;
}

/// One recorded draw on a [`BufferSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub image: LoadedImage,
    pub x: i32,
    pub y: i32,
}

/// Fixed-size surface that records what was drawn on it.
///
/// Images without an area are rejected the way a canvas rejects a broken
/// SVG.
#[derive(Debug, Clone)]
pub struct BufferSurface {
    width: u32,
    height: u32,
    placements: Vec<Placement>,
}

impl BufferSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            placements: Vec::new(),
        }
    }

    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }
}

impl Surface for BufferSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw_image(&mut self, image: &LoadedImage, x: i32, y: i32) -> Result<()> {
        if image.width == 0 || image.height == 0 {
            return Err(crate::Error::Render("image has no area".into()));
        }
        self.placements.push(Placement {
            image: image.clone(),
            x,
            y,
        });
        Ok(())
    }
}

/// Wrap the document's XHTML serialization in a fixed-size SVG envelope.
pub fn svg_for_document(doc: &Document, width: u32, height: u32) -> String {
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\
         <foreignObject width=\"100%\" height=\"100%\">{}</foreignObject></svg>",
        width,
        height,
        doc.to_xhtml()
    )
}

/// What a render call produced.
#[derive(Debug)]
pub struct RenderReport {
    pub image: Option<LoadedImage>,
    pub error: Option<ResourceError>,
    pub state: RenderState,
}

fn enter(state: &mut RenderState, next: RenderState) {
    log::debug!("render state {} -> {}", state, next);
    *state = next;
}

/// Serialize, load and optionally draw an inlined document.
///
/// A loader rejection and a surface rejection look the same to the caller:
/// no image and one `document` error.
pub async fn render_document(
    doc: &Document,
    width: u32,
    height: u32,
    surface: Option<&mut dyn Surface>,
    host: &RenderHost,
) -> RenderReport {
    let mut state = RenderState::Inlined;

    let svg = svg_for_document(doc, width, height);
    enter(&mut state, RenderState::Serialized);

    let mut ids = ScaffoldIds::default();
    enter(&mut state, RenderState::ImageLoading);
    let loaded = host.load_svg(&svg, &mut ids).await;

    let image = match loaded {
        Ok(image) => image,
        Err(e) => {
            log::warn!("{}", e);
            enter(&mut state, RenderState::Failed);
            return failed(state);
        }
    };
    enter(&mut state, RenderState::Decoded);

    if let Some(surface) = surface {
        if let Err(e) = surface.draw_image(&image, 0, 0) {
            log::warn!("{}", e);
            enter(&mut state, RenderState::Failed);
            return failed(state);
        }
    }

    RenderReport {
        image: Some(image),
        error: None,
        state,
    }
}

fn failed(state: RenderState) -> RenderReport {
    RenderReport {
        image: None,
        error: Some(ResourceError::with_msg(crate::ResourceType::Document, RENDER_ERROR_MSG)),
        state,
    }
}
