//! Frame description and the renderer seam.
//!
//! The render loop decides *what* is on screen and hands a [`Frame`] to a
//! [`Renderer`]. The shipped binary uses [`LogRenderer`]; a real display
//! backend only has to implement the trait.

pub mod layout;
pub mod overlay;

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;
use tracing::info;

use crate::caption;
use crate::config::Configuration;
use crate::navigation::ItemId;
use crate::scan::Library;

use self::layout::{Placement, place_on_screen};
use self::overlay::Overlay;

/// A photo that was found on disk and whose header could be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedImage {
    pub id: ItemId,
    pub path: PathBuf,
    /// Size as displayed, after EXIF orientation.
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Display switched off by schedule or override.
    Blank,
    /// Full-screen message, e.g. a shutdown countdown.
    Notice(String),
    /// Nothing displayable; the overlay is still drawn.
    Placeholder(Overlay),
    Photo { image: ResolvedImage, overlay: Overlay },
}

pub trait Renderer {
    fn render(&mut self, frame: &Frame) -> Result<()>;
}

/// Renders frames as log lines.
#[derive(Debug, Default)]
pub struct LogRenderer {
    frames: u64,
}

impl LogRenderer {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &Frame) -> Result<()> {
        self.frames += 1;
        match frame {
            Frame::Blank => info!(frame = self.frames, "display blank"),
            Frame::Notice(text) => info!(frame = self.frames, notice = %text, "notice"),
            Frame::Placeholder(overlay) => info!(
                frame = self.frames,
                overlay = ?overlay.texts,
                "No images"
            ),
            Frame::Photo { image, overlay } => info!(
                frame = self.frames,
                item = %image.id,
                x = image.placement.x,
                y = image.placement.y,
                width = image.placement.width,
                height = image.placement.height,
                overlay = ?overlay.texts,
                "photo"
            ),
        }
        Ok(())
    }
}

/// Resolve an id to something drawable. Fails when the file is gone or its
/// header cannot be read.
pub fn resolve_image(library: &Library, cfg: &Configuration, id: &ItemId) -> Result<ResolvedImage> {
    let path = library.resolve(id);
    let (raw_w, raw_h) = image::image_dimensions(&path)
        .with_context(|| format!("failed to read image header of {}", path.display()))?;
    let (width, height) = match read_exif_orientation(&path) {
        Some(5..=8) => (raw_h, raw_w),
        _ => (raw_w, raw_h),
    };
    let placement = place_on_screen(
        width,
        height,
        cfg.display.width,
        cfg.display.height,
        (
            cfg.display.correction_horizontal,
            cfg.display.correction_vertical,
        ),
    );
    let caption = if cfg.overlay.show_caption {
        caption::read_caption(&path)
    } else {
        None
    };
    Ok(ResolvedImage {
        id: id.clone(),
        path,
        width,
        height,
        placement,
        caption,
    })
}

fn read_exif_orientation(path: &Path) -> Option<u16> {
    let f = fs::File::open(path).ok()?;
    let mut buf = BufReader::new(f);
    let reader = exif::Reader::new().read_from_container(&mut buf).ok()?;
    use exif::{In, Tag, Value};
    let field = reader.get_field(Tag::Orientation, In::PRIMARY)?;
    match &field.value {
        Value::Short(arr) if !arr.is_empty() => Some(arr[0]),
        Value::Long(arr) if !arr.is_empty() => Some(arr[0] as u16),
        _ => None,
    }
}

/// Longest side of a web preview, in pixels.
pub const PREVIEW_MAX_SIDE: u32 = 200;

/// Decode `path` and re-encode it as a small JPEG thumbnail that keeps the
/// aspect ratio.
pub fn preview_jpeg(path: &Path, max_side: u32) -> Result<Vec<u8>> {
    let img = image::open(path).with_context(|| format!("failed to decode {}", path.display()))?;
    let thumb = img.thumbnail(max_side, max_side).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 85)
        .encode_image(&thumb)
        .context("failed to encode preview")?;
    Ok(out)
}

/// Content type for serving an image file by extension.
pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
