//! Chunk-linked records inside one texture-container entry.
//!
//! Each chunk starts with a 4-byte header `b0 b1 b2 b3`: the record kind is
//! `b0 & 0x7F` and `b1 | b2 << 8 | b3 << 16` is the offset of the next chunk,
//! relative to the start of this one. A next offset of 0 ends the chain.
//! Payload length is implied by the next offset (`next - 4`), except for name
//! chunks, which carry a NUL-terminated string instead.

use std::fmt;

use tracing::{debug, warn};
use variantly::Variantly;

use crate::data::ByteCursor;
use crate::data::parser_utils::MAX_NAME_LEN;
use crate::error::{DecodeError, DecodeResult};
use crate::recognized::Recognized;
use crate::textures::bitmap::{Bitmap, BitmapFormat, DecodedImage, Palette, PaletteFormat};

pub const CHUNK_HEADER_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, Variantly, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ChunkKind {
    PaletteRgb24,
    PaletteArgb32,
    Dxt1,
    Dxt3,
    Argb4444,
    Rgb565,
    Indexed4,
    Indexed8,
    Argb32,
    Argb1555,
    Name,
}

impl ChunkKind {
    pub fn from_raw(raw: u8) -> Recognized<Self> {
        match raw {
            0x24 => Recognized::Known(Self::PaletteRgb24),
            0x2A => Recognized::Known(Self::PaletteArgb32),
            0x60 => Recognized::Known(Self::Dxt1),
            0x61 => Recognized::Known(Self::Dxt3),
            0x6D => Recognized::Known(Self::Argb4444),
            0x70 => Recognized::Known(Self::Name),
            0x78 => Recognized::Known(Self::Rgb565),
            0x79 => Recognized::Known(Self::Indexed4),
            0x7B => Recognized::Known(Self::Indexed8),
            0x7D => Recognized::Known(Self::Argb32),
            0x7E => Recognized::Known(Self::Argb1555),
            other => Recognized::Unknown(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::PaletteRgb24 => 0x24,
            Self::PaletteArgb32 => 0x2A,
            Self::Dxt1 => 0x60,
            Self::Dxt3 => 0x61,
            Self::Argb4444 => 0x6D,
            Self::Name => 0x70,
            Self::Rgb565 => 0x78,
            Self::Indexed4 => 0x79,
            Self::Indexed8 => 0x7B,
            Self::Argb32 => 0x7D,
            Self::Argb1555 => 0x7E,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::PaletteRgb24 => "RGB-24 palette",
            Self::PaletteArgb32 => "ARGB-32 palette",
            Self::Dxt1 => "DXT1",
            Self::Dxt3 => "DXT3",
            Self::Argb4444 => "ARGB-4444",
            Self::Rgb565 => "RGB-565",
            Self::Indexed4 => "4-bit indexed",
            Self::Indexed8 => "8-bit indexed",
            Self::Argb32 => "ARGB-32",
            Self::Argb1555 => "ARGB-1555",
            Self::Name => "name",
        }
    }

    pub fn palette_format(self) -> Option<PaletteFormat> {
        match self {
            Self::PaletteRgb24 => Some(PaletteFormat::Rgb24),
            Self::PaletteArgb32 => Some(PaletteFormat::Argb32),
            _ => None,
        }
    }

    pub fn bitmap_format(self) -> Option<BitmapFormat> {
        match self {
            Self::Indexed4 => Some(BitmapFormat::Indexed4),
            Self::Indexed8 => Some(BitmapFormat::Indexed8),
            Self::Argb32 => Some(BitmapFormat::Argb32),
            _ => None,
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x})", self.display_name(), self.raw())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub kind: Recognized<ChunkKind>,
    /// Offset of the next chunk relative to the start of this one.
    pub next_block_offset: u32,
}

impl ChunkHeader {
    pub fn decode(bytes: [u8; 4]) -> Self {
        let [b0, b1, b2, b3] = bytes;
        Self {
            kind: ChunkKind::from_raw(b0 & 0x7F),
            next_block_offset: u32::from_le_bytes([b1, b2, b3, 0]),
        }
    }

    pub fn has_next(&self) -> bool {
        self.next_block_offset > 0
    }

    fn is_name(&self) -> bool {
        self.kind.known().is_some_and(ChunkKind::is_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPayload<'a> {
    None,
    Bytes(&'a [u8]),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Absolute offset of the chunk header.
    pub offset: usize,
    pub header: ChunkHeader,
    pub payload: ChunkPayload<'a>,
}

impl Chunk<'_> {
    /// Absolute offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        self.offset + CHUNK_HEADER_SIZE
    }
}

/// Walks a chunk chain starting at an entry offset. Stops after the first
/// chunk whose next-block offset is 0, or after the first error.
#[derive(Debug, Clone)]
pub struct ChunkChain<'a> {
    cursor: ByteCursor<'a>,
    next: Option<usize>,
}

impl<'a> ChunkChain<'a> {
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            next: Some(start),
        }
    }

    fn read_chunk(&mut self, offset: usize) -> DecodeResult<Chunk<'a>> {
        self.cursor.seek(offset, "chunk")?;
        let header_bytes = self.cursor.take(CHUNK_HEADER_SIZE)?;
        let header = ChunkHeader::decode([
            header_bytes[0],
            header_bytes[1],
            header_bytes[2],
            header_bytes[3],
        ]);

        let payload = if header.is_name() {
            ChunkPayload::Name(self.cursor.read_null_terminated(MAX_NAME_LEN))
        } else if header.has_next() {
            let len = (header.next_block_offset as usize)
                .checked_sub(CHUNK_HEADER_SIZE)
                .ok_or(DecodeError::InvalidChunkLength {
                    offset,
                    next_block_offset: header.next_block_offset,
                })?;
            ChunkPayload::Bytes(self.cursor.take(len)?)
        } else {
            ChunkPayload::None
        };

        debug!(
            offset,
            kind = %header.kind,
            next = header.next_block_offset,
            "chunk"
        );
        Ok(Chunk {
            offset,
            header,
            payload,
        })
    }
}

impl<'a> Iterator for ChunkChain<'a> {
    type Item = DecodeResult<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.take()?;
        let chunk = self.read_chunk(offset);
        self.next = chunk
            .as_ref()
            .ok()
            .filter(|chunk| chunk.header.has_next())
            .map(|chunk| offset + chunk.header.next_block_offset as usize);
        Some(chunk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Variantly)]
pub enum EntryState {
    /// Reading chunks; not enough data yet to build an image.
    Scanning,
    /// A bitmap and (for indexed formats) a palette have been seen.
    Ready,
    Built,
    Failed,
}

/// Accumulates the chunks of one entry and builds the final image.
#[derive(Debug, Clone)]
pub struct EntryDecoder<'a> {
    state: EntryState,
    bitmap: Option<Bitmap<'a>>,
    palette: Option<Palette>,
    label: Option<String>,
}

impl Default for EntryDecoder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> EntryDecoder<'a> {
    pub fn new() -> Self {
        Self {
            state: EntryState::Scanning,
            bitmap: None,
            palette: None,
            label: None,
        }
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Consume one chunk. Any error moves the decoder to `Failed`.
    pub fn feed(&mut self, chunk: Chunk<'a>) -> DecodeResult<()> {
        let result = self.apply(chunk);
        match &result {
            Ok(()) => self.update_state(),
            Err(_) => self.state = EntryState::Failed,
        }
        result
    }

    fn apply(&mut self, chunk: Chunk<'a>) -> DecodeResult<()> {
        let payload_offset = chunk.payload_offset();
        let kind = match chunk.header.kind {
            Recognized::Known(kind) => kind,
            Recognized::Unknown(_) => {
                return Err(DecodeError::UnsupportedChunkKind {
                    kind: chunk.header.kind.to_string(),
                    offset: chunk.offset,
                });
            }
        };

        let payload = match chunk.payload {
            ChunkPayload::Name(name) => {
                self.label = Some(name);
                return Ok(());
            }
            ChunkPayload::Bytes(bytes) => bytes,
            ChunkPayload::None => &[],
        };

        if let Some(format) = kind.palette_format() {
            let palette = Palette::parse(format, payload, payload_offset)?;
            if let Some(previous) = &self.palette {
                warn!(
                    offset = chunk.offset,
                    previous = previous.len(),
                    colors = palette.len(),
                    "entry has more than one palette; keeping the last"
                );
            }
            self.palette = Some(palette);
        } else if let Some(format) = kind.bitmap_format() {
            if self.bitmap.is_some() {
                return Err(DecodeError::DuplicateBitmap {
                    offset: chunk.offset,
                });
            }
            self.bitmap = Some(Bitmap::parse(format, payload, payload_offset)?);
        } else {
            return Err(DecodeError::UnsupportedChunkKind {
                kind: kind.to_string(),
                offset: chunk.offset,
            });
        }
        Ok(())
    }

    fn update_state(&mut self) {
        let ready = match &self.bitmap {
            Some(bitmap) if bitmap.format.needs_palette() => {
                self.palette.as_ref().is_some_and(|p| !p.is_empty())
            }
            Some(_) => true,
            None => false,
        };
        self.state = if ready {
            EntryState::Ready
        } else {
            EntryState::Scanning
        };
    }

    /// Build the image from the accumulated chunks.
    pub fn finish(&mut self) -> DecodeResult<DecodedImage> {
        let result = self.build();
        self.state = if result.is_ok() {
            EntryState::Built
        } else {
            EntryState::Failed
        };
        result
    }

    fn build(&mut self) -> DecodeResult<DecodedImage> {
        let palette = self.palette.take().unwrap_or_default();
        let bitmap = match self.bitmap.take() {
            Some(bitmap) if self.state.is_ready() => bitmap,
            bitmap => {
                return Err(DecodeError::MissingImageData {
                    has_bitmap: bitmap.is_some(),
                    palette_len: palette.len(),
                });
            }
        };

        let pixels = bitmap.to_rgba(&palette)?;
        Ok(DecodedImage {
            metadata: bitmap.metadata,
            format: bitmap.format,
            pixels,
            label: self.label.take(),
        })
    }
}

/// Decode the entry whose first chunk is at `offset`.
pub fn decode_entry(data: &[u8], offset: usize) -> DecodeResult<DecodedImage> {
    let mut decoder = EntryDecoder::new();
    for chunk in ChunkChain::new(data, offset) {
        decoder.feed(chunk?)?;
    }
    decoder.finish()
}

/// Builds chunk bytes for tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A chunk of `kind` with `payload`, linked to a following chunk when
    /// `last` is false.
    pub fn chunk(kind: ChunkKind, payload: &[u8], last: bool) -> Vec<u8> {
        let next = if last { 0 } else { (CHUNK_HEADER_SIZE + payload.len()) as u32 };
        let next = next.to_le_bytes();
        let mut data = vec![kind.raw(), next[0], next[1], next[2]];
        data.extend_from_slice(payload);
        data
    }

    /// A terminating name chunk. The last chunk of a chain carries no
    /// payload, so entries end with one of these.
    pub fn name_chunk(name: &str) -> Vec<u8> {
        let mut data = chunk(ChunkKind::Name, &[], true);
        data.extend_from_slice(name.as_bytes());
        data.push(0);
        data
    }

    pub fn payload_header(width: u16, height: u16, x_center: u16) -> Vec<u8> {
        [width, height, x_center, 0, 0, 0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }

    pub fn argb_palette(colors: &[[u8; 4]]) -> Vec<u8> {
        let count = colors.len() as u16;
        let mut payload = payload_header(count, 1, count);
        for [r, g, b, a] in colors {
            payload.extend_from_slice(&[*b, *g, *r, *a]);
        }
        payload
    }

    pub fn rgb_palette(colors: &[[u8; 3]]) -> Vec<u8> {
        let count = colors.len() as u16;
        let mut payload = payload_header(count, 1, count);
        for rgb in colors {
            payload.extend_from_slice(rgb);
        }
        payload
    }

    pub fn indexed8(width: u16, height: u16, indices: &[u8]) -> Vec<u8> {
        let mut payload = payload_header(width, height, 0);
        payload.extend_from_slice(indices);
        payload
    }
}
