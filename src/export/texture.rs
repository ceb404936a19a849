//! PNG conversion of decoded texture entries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use rootcause::Report;
use thiserror::Error;
use tracing::debug;

use crate::export::ImageSink;
use crate::textures::bitmap::DecodedImage;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("{width}x{height} image does not match its {len} pixel bytes")]
    BufferSize { width: u32, height: u32, len: usize },
    #[error("failed to encode PNG: {0}")]
    PngEncode(String),
    #[error("I/O error writing {path}: {message}")]
    Io { path: PathBuf, message: String },
}

pub fn to_rgba_image(image: &DecodedImage) -> Result<RgbaImage, Report<TextureError>> {
    let bytes = image.to_rgba_bytes();
    let len = bytes.len();
    RgbaImage::from_raw(image.width(), image.height(), bytes).ok_or_else(|| {
        Report::new(TextureError::BufferSize {
            width: image.width(),
            height: image.height(),
            len,
        })
    })
}

/// Multiply every pixel's alpha by `factor` (clamped to `0..=1`).
pub fn scale_alpha(image: &mut RgbaImage, factor: f32) {
    let factor = factor.clamp(0.0, 1.0);
    for pixel in image.pixels_mut() {
        pixel.0[3] = (pixel.0[3] as f32 * factor).round() as u8;
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, Report<TextureError>> {
    let mut png_buf = Vec::new();
    PngEncoder::new(&mut png_buf)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| Report::new(TextureError::PngEncode(e.to_string())))?;

    Ok(png_buf)
}

/// Decoded entry to PNG bytes, optionally alpha-scaled.
pub fn decoded_to_png(
    image: &DecodedImage,
    alpha: Option<f32>,
) -> Result<Vec<u8>, Report<TextureError>> {
    let mut rgba = to_rgba_image(image)?;
    if let Some(alpha) = alpha {
        scale_alpha(&mut rgba, alpha);
    }
    encode_png(&rgba)
}

/// Writes each entry to `<out_dir>/<name>.png`.
///
/// Entry names come from the container, so they are reduced to ASCII
/// alphanumerics, `_` and `-` before use. Repeated names get a `_<n>` suffix.
pub struct PngDirectorySink {
    out_dir: PathBuf,
    written: Vec<PathBuf>,
    used_stems: HashSet<String>,
}

/// File stem for an entry name; never empty and never a path.
pub fn sanitize_entry_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "entry".to_string()
    } else {
        stem
    }
}

impl PngDirectorySink {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            written: Vec::new(),
            used_stems: HashSet::new(),
        }
    }

    fn unique_stem(&mut self, name: &str) -> String {
        let base = sanitize_entry_name(name);
        let mut stem = base.clone();
        let mut n = 1;
        while !self.used_stems.insert(stem.clone()) {
            stem = format!("{base}_{n}");
            n += 1;
        }
        stem
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ImageSink for PngDirectorySink {
    type Error = Report<TextureError>;

    fn add_image(&mut self, name: &str, image: &DecodedImage) -> Result<(), Self::Error> {
        let png = decoded_to_png(image, None)?;
        let stem = self.unique_stem(name);
        let path = self.out_dir.join(format!("{stem}.png"));
        std::fs::write(&path, png).map_err(|e| {
            Report::new(TextureError::Io {
                path: path.clone(),
                message: e.to_string(),
            })
        })?;
        debug!(path = %path.display(), "wrote texture");
        self.written.push(path);
        Ok(())
    }
}
