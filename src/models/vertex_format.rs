//! Fixed vertex-record layouts used by FPM shape blocks.
//!
//! The layout is selected solely by the shape's vertex stride. Every record is
//! tightly packed little-endian `f32` data:
//!
//! | stride | layout |
//! |--------|--------|
//! | `0x14` | position, uv |
//! | `0x18` | position, 4 bytes padding, uv |
//! | `0x20` | position, normal, uv |
//! | `0x24` | position, normal, uv, 4 bytes padding |

use variantly::Variantly;
use winnow::Parser;
use winnow::binary::le_f32;
use winnow::token::take;

use crate::data::parser_utils::WResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum VertexLayout {
    /// Position + uv.
    Compact,
    /// Position + padding + uv.
    CompactPadded,
    /// Position + normal + uv.
    Full,
    /// Position + normal + uv + padding.
    FullPadded,
}

/// One decoded vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: Option<[f32; 3]>,
    pub uv: [f32; 2],
}

impl VertexLayout {
    pub fn from_stride(stride: u8) -> Option<Self> {
        match stride {
            0x14 => Some(VertexLayout::Compact),
            0x18 => Some(VertexLayout::CompactPadded),
            0x20 => Some(VertexLayout::Full),
            0x24 => Some(VertexLayout::FullPadded),
            _ => None,
        }
    }

    pub fn stride(self) -> usize {
        match self {
            VertexLayout::Compact => 0x14,
            VertexLayout::CompactPadded => 0x18,
            VertexLayout::Full => 0x20,
            VertexLayout::FullPadded => 0x24,
        }
    }

    /// Decode one `stride()`-byte record.
    pub fn parse_record(self, input: &mut &[u8]) -> WResult<Vertex> {
        let position = parse_vec3(input)?;
        let normal = match self {
            VertexLayout::Compact => None,
            VertexLayout::CompactPadded => {
                skip_padding(input)?;
                None
            }
            VertexLayout::Full | VertexLayout::FullPadded => Some(parse_vec3(input)?),
        };
        let uv = parse_vec2(input)?;
        if self.is_full_padded() {
            skip_padding(input)?;
        }
        Ok(Vertex {
            position,
            normal,
            uv,
        })
    }
}

fn parse_vec3(input: &mut &[u8]) -> WResult<[f32; 3]> {
    (le_f32, le_f32, le_f32)
        .map(|(x, y, z)| [x, y, z])
        .parse_next(input)
}

fn parse_vec2(input: &mut &[u8]) -> WResult<[f32; 2]> {
    (le_f32, le_f32).map(|(u, v)| [u, v]).parse_next(input)
}

fn skip_padding(input: &mut &[u8]) -> WResult<()> {
    take(4usize).void().parse_next(input)
}

/// Random-access view over a shape's vertex block.
///
/// Borrows the block straight out of the container buffer; vertices are
/// decoded on demand from `index * stride`.
#[derive(Debug, Clone, Copy)]
pub struct ShapeGeometry<'a> {
    layout: VertexLayout,
    data: &'a [u8],
}

impl<'a> ShapeGeometry<'a> {
    /// `data` must hold exactly `layout.stride() * vertex_count` bytes.
    pub fn new(layout: VertexLayout, data: &'a [u8]) -> Self {
        debug_assert_eq!(data.len() % layout.stride(), 0);
        Self { layout, data }
    }

    pub fn vertex_count(&self) -> usize {
        self.data.len() / self.layout.stride()
    }

    pub fn vertex(&self, index: usize) -> Option<Vertex> {
        let stride = self.layout.stride();
        let start = index.checked_mul(stride)?;
        let record = &mut self.data.get(start..start.checked_add(stride)?)?;
        self.layout.parse_record(record).ok()
    }
}
