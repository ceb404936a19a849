//! Palettes, bitmap payloads and the index-to-RGBA pipeline.
//!
//! Both palette and bitmap payloads begin with a 12-byte header of six
//! little-endian `u16`s. For bitmaps this is [`ImageMetadata`]; palettes reuse
//! the first three fields as a `width x 1` table descriptor.

use std::borrow::Cow;

use winnow::Parser;
use winnow::binary::le_u16;

use crate::data::parser_utils::WResult;
use crate::error::{DecodeError, DecodeResult};

pub const PAYLOAD_HEADER_SIZE: usize = 12;

pub type Rgba = [u8; 4];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageMetadata {
    pub width: u16,
    pub height: u16,
    pub x_center: u16,
    pub y_center: u16,
    pub x_offset: u16,
    pub y_offset: u16,
}

impl ImageMetadata {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

fn parse_metadata(input: &mut &[u8]) -> WResult<ImageMetadata> {
    (le_u16, le_u16, le_u16, le_u16, le_u16, le_u16)
        .map(
            |(width, height, x_center, y_center, x_offset, y_offset)| ImageMetadata {
                width,
                height,
                x_center,
                y_center,
                x_offset,
                y_offset,
            },
        )
        .parse_next(input)
}

/// Split a payload into its 12-byte header and the data that follows.
fn split_payload(payload: &[u8], offset: usize) -> DecodeResult<(ImageMetadata, &[u8])> {
    if payload.len() < PAYLOAD_HEADER_SIZE {
        return Err(DecodeError::ShortRead {
            offset,
            needed: PAYLOAD_HEADER_SIZE,
            available: payload.len(),
        });
    }
    let (mut header, rest) = payload.split_at(PAYLOAD_HEADER_SIZE);
    let metadata = parse_metadata(&mut header).map_err(|_| DecodeError::ShortRead {
        offset,
        needed: PAYLOAD_HEADER_SIZE,
        available: payload.len(),
    })?;
    Ok((metadata, rest))
}

/// Color record layout of a palette chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PaletteFormat {
    /// R, G, B; alpha is opaque.
    Rgb24,
    /// Stored B, G, R, A.
    Argb32,
}

impl PaletteFormat {
    pub fn record_size(self) -> usize {
        match self {
            PaletteFormat::Rgb24 => 3,
            PaletteFormat::Argb32 => 4,
        }
    }

    fn to_rgba(self, record: &[u8]) -> Rgba {
        match self {
            PaletteFormat::Rgb24 => [record[0], record[1], record[2], 0xFF],
            PaletteFormat::Argb32 => [record[2], record[1], record[0], record[3]],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgba>,
}

impl Palette {
    pub fn new(colors: Vec<Rgba>) -> Self {
        Self { colors }
    }

    /// Parse a palette chunk payload. `offset` locates the payload for
    /// diagnostics.
    pub fn parse(format: PaletteFormat, payload: &[u8], offset: usize) -> DecodeResult<Self> {
        let (header, records) = split_payload(payload, offset)?;
        if header.height != 1 || header.x_center != header.width {
            return Err(DecodeError::InvalidPaletteGeometry {
                width: header.width,
                height: header.height,
                x_center: header.x_center,
                offset,
            });
        }

        let colors = records
            .chunks_exact(format.record_size())
            .map(|record| format.to_rgba(record))
            .collect();
        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<Rgba> {
        self.colors.get(index as usize).copied()
    }

    pub fn colors(&self) -> &[Rgba] {
        &self.colors
    }
}

/// Pixel encoding of a bitmap chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum BitmapFormat {
    Indexed4,
    Indexed8,
    /// Direct color, stored B, G, R, A.
    Argb32,
}

impl BitmapFormat {
    pub fn bits_per_pixel(self) -> u8 {
        match self {
            BitmapFormat::Indexed4 => 4,
            BitmapFormat::Indexed8 => 8,
            BitmapFormat::Argb32 => 32,
        }
    }

    pub fn needs_palette(self) -> bool {
        !matches!(self, BitmapFormat::Argb32)
    }

    /// Bytes of pixel data required for `pixel_count` pixels, rounded up to
    /// a whole byte.
    pub fn data_len(self, pixel_count: usize) -> usize {
        (pixel_count * self.bits_per_pixel() as usize).div_ceil(8)
    }
}

/// A bitmap chunk's metadata and (borrowed) pixel data.
#[derive(Debug, Clone, Copy)]
pub struct Bitmap<'a> {
    pub format: BitmapFormat,
    pub metadata: ImageMetadata,
    /// Start of the chunk payload in the container.
    pub offset: usize,
    data: &'a [u8],
}

impl<'a> Bitmap<'a> {
    pub fn parse(format: BitmapFormat, payload: &'a [u8], offset: usize) -> DecodeResult<Self> {
        let (metadata, data) = split_payload(payload, offset)?;
        Ok(Self {
            format,
            metadata,
            offset,
            data,
        })
    }

    /// Exactly the pixel bytes the metadata calls for.
    fn pixel_data(&self) -> DecodeResult<&'a [u8]> {
        let needed = self.format.data_len(self.metadata.pixel_count());
        self.data.get(..needed).ok_or(DecodeError::ShortRead {
            offset: self.offset + PAYLOAD_HEADER_SIZE,
            needed,
            available: self.data.len(),
        })
    }

    /// Resolve every pixel to RGBA, row-major. Indexed formats look colors
    /// up in `palette`.
    pub fn to_rgba(&self, palette: &Palette) -> DecodeResult<Vec<Rgba>> {
        let data = self.pixel_data()?;
        match self.format {
            BitmapFormat::Indexed4 | BitmapFormat::Indexed8 => {
                let indices = expand_indices(
                    data,
                    self.format.bits_per_pixel(),
                    self.metadata.pixel_count(),
                );
                apply_palette(&indices, self.metadata.width as usize, palette)
            }
            BitmapFormat::Argb32 => Ok(data
                .chunks_exact(4)
                .map(|bgra| [bgra[2], bgra[1], bgra[0], bgra[3]])
                .collect()),
        }
    }
}

/// Unpack sub-byte indices into one byte per pixel, lowest-order bits first.
/// 8-bit data is borrowed unchanged.
pub fn expand_indices(source: &[u8], bits: u8, pixel_count: usize) -> Cow<'_, [u8]> {
    if bits >= 8 {
        return Cow::Borrowed(source);
    }

    let mask = 0xFFu8 >> (8 - bits);
    let mut indices: Vec<u8> = source
        .iter()
        .flat_map(|&byte| (0..8).step_by(bits as usize).map(move |shift| (byte >> shift) & mask))
        .collect();
    indices.truncate(pixel_count);
    Cow::Owned(indices)
}

/// Map one index byte per pixel through `palette`, row by row.
pub fn apply_palette(indices: &[u8], width: usize, palette: &Palette) -> DecodeResult<Vec<Rgba>> {
    if width == 0 {
        return Ok(Vec::new());
    }

    let mut pixels = Vec::with_capacity(indices.len());
    for (y, row) in indices.chunks(width).enumerate() {
        for (x, &index) in row.iter().enumerate() {
            let color = palette.get(index).ok_or(DecodeError::PaletteIndexOutOfRange {
                index,
                palette_len: palette.len(),
                x,
                y,
            })?;
            pixels.push(color);
        }
    }
    Ok(pixels)
}

/// A fully decoded texture-container entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub metadata: ImageMetadata,
    pub format: BitmapFormat,
    /// Row-major RGBA, `width * height` entries.
    pub pixels: Vec<Rgba>,
    /// Text of the entry's name chunk, if it had one.
    pub label: Option<String>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.metadata.width as u32
    }

    pub fn height(&self) -> u32 {
        self.metadata.height as u32
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width() {
            return None;
        }
        self.pixels
            .get(y as usize * self.width() as usize + x as usize)
            .copied()
    }

    /// Flat `RGBARGBA...` bytes.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.concat()
    }
}
