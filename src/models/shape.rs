//! Shape data blocks: the per-shape vertex block and triangle strip referenced
//! by a [`ShapeNode`].
//!
//! Layout at `ShapeNode::data_offset`:
//! - 0x20-byte header ([`ShapeDataHeader`]), followed by 0x10 reserved bytes
//! - vertex block (`stride * vertex_count` bytes), 16-byte aligned
//! - strip (`face_count` little-endian `u16` indices), 16-byte aligned

use tracing::debug;
use winnow::Parser;
use winnow::binary::{le_u8, le_u16, le_u32};
use winnow::combinator::repeat;
use winnow::token::take;

use crate::data::ByteCursor;
use crate::data::parser_utils::WResult;
use crate::error::{DecodeError, DecodeResult};
use crate::models::fpm::ShapeNode;
use crate::models::strip::{TriangleStrip, Triangles};
use crate::models::vertex_format::{ShapeGeometry, VertexLayout};

pub const SHAPE_DATA_HEADER_SIZE: usize = 0x20;
const SHAPE_DATA_RESERVED_SIZE: usize = 0x10;
const BLOCK_ALIGNMENT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShapeDataHeader {
    pub face_data_offset: u32,
    /// Number of strip indices.
    pub face_count: u16,
    pub vertex_stride: u8,
    pub vertex_count: u16,
}

impl ShapeDataHeader {
    pub fn block_size(&self) -> usize {
        self.vertex_stride as usize * self.vertex_count as usize
    }
}

fn parse_shape_data_header(input: &mut &[u8]) -> WResult<ShapeDataHeader> {
    (
        le_u32,
        le_u32,
        take(0x0Ausize),
        le_u16,
        le_u8,
        le_u8,
        le_u16,
        take(0x08usize),
    )
        .map(
            |(_unk, face_data_offset, _, face_count, vertex_stride, _pad, vertex_count, _)| {
                ShapeDataHeader {
                    face_data_offset,
                    face_count,
                    vertex_stride,
                    vertex_count,
                }
            },
        )
        .parse_next(input)
}

/// A decoded shape, ready for triangle emission.
#[derive(Debug, Clone)]
pub struct Shape<'a> {
    pub header: ShapeDataHeader,
    pub texture_index: u16,
    pub geometry: ShapeGeometry<'a>,
    pub strip: TriangleStrip,
}

impl<'a> Shape<'a> {
    pub fn triangles(&self) -> Triangles<'_, 'a> {
        self.strip.triangles(self.geometry)
    }
}

/// Decode the shape block referenced by `node`.
///
/// An unsupported vertex stride fails this shape only; the caller decides
/// whether to continue with the rest of the model.
pub fn decode_shape<'a>(file_data: &'a [u8], node: &ShapeNode) -> DecodeResult<Shape<'a>> {
    let data_offset = node.data_offset as usize;
    let mut cursor = ByteCursor::new(file_data);
    cursor.seek(data_offset, "shape data")?;

    let header = cursor.parse(SHAPE_DATA_HEADER_SIZE, parse_shape_data_header)?;
    let layout = VertexLayout::from_stride(header.vertex_stride).ok_or(
        DecodeError::UnsupportedVertexStride {
            stride: header.vertex_stride,
            offset: data_offset,
        },
    )?;
    cursor.skip(SHAPE_DATA_RESERVED_SIZE)?;

    cursor.align_to(BLOCK_ALIGNMENT);
    let vertex_block = cursor.take(header.block_size())?;
    let geometry = ShapeGeometry::new(layout, vertex_block);

    cursor.align_to(BLOCK_ALIGNMENT);
    let face_count = header.face_count as usize;
    let indices: Vec<u16> =
        cursor.parse(face_count * 2, |input| repeat(face_count, le_u16).parse_next(input))?;
    let strip = TriangleStrip::new(indices, geometry.vertex_count())?;

    debug!(
        offset = data_offset,
        ?layout,
        vertices = header.vertex_count,
        strip_len = face_count,
        "decoded shape"
    );

    Ok(Shape {
        header,
        texture_index: node.texture_index,
        geometry,
        strip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parser_utils::BoundingBox;

    fn shape_block(stride: u8, vertex_count: u16, strip: &[u16], vertex_bytes: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; SHAPE_DATA_HEADER_SIZE + SHAPE_DATA_RESERVED_SIZE];
        data[0x12..0x14].copy_from_slice(&(strip.len() as u16).to_le_bytes());
        data[0x14] = stride;
        data[0x16..0x18].copy_from_slice(&vertex_count.to_le_bytes());
        data.extend_from_slice(vertex_bytes);
        data.resize(data.len().next_multiple_of(16), 0);
        for index in strip {
            data.extend_from_slice(&index.to_le_bytes());
        }
        data
    }

    fn node_at(data_offset: u32) -> ShapeNode {
        ShapeNode {
            bounding_box: BoundingBox::default(),
            data_offset,
            texture_index: 3,
        }
    }

    #[test]
    fn reads_vertex_block_and_strip() {
        let mut vertices = Vec::new();
        for i in 0..3 {
            for v in [i as f32, 1.0, 2.0, 0.5, 0.25] {
                vertices.extend_from_slice(&v.to_le_bytes());
            }
        }
        let data = shape_block(0x14, 3, &[0, 1, 2], &vertices);
        let shape = decode_shape(&data, &node_at(0)).unwrap();

        assert_eq!(shape.texture_index, 3);
        assert_eq!(shape.header.face_count, 3);
        assert_eq!(shape.geometry.vertex_count(), 3);
        assert_eq!(shape.strip.indices(), &[0, 1, 2]);
        let triangles: Vec<_> = shape.triangles().collect();
        assert_eq!(triangles.len(), 1);
        assert_eq!(triangles[0].vertices[2].position, [2.0, 1.0, 2.0]);
    }

    #[test]
    fn unsupported_stride_fails_the_shape() {
        let data = shape_block(0x1C, 1, &[], &[0; 0x1C]);
        assert_eq!(
            decode_shape(&data, &node_at(0)).unwrap_err(),
            DecodeError::UnsupportedVertexStride {
                stride: 0x1C,
                offset: 0
            }
        );
    }

    #[test]
    fn truncated_vertex_block_is_a_short_read() {
        let mut data = shape_block(0x20, 2, &[], &[0; 0x20]);
        data.truncate(SHAPE_DATA_HEADER_SIZE + SHAPE_DATA_RESERVED_SIZE + 0x20);
        assert!(matches!(
            decode_shape(&data, &node_at(0)),
            Err(DecodeError::ShortRead { needed: 0x40, .. })
        ));
    }

    #[test]
    fn data_offset_past_end_is_rejected() {
        let data = vec![0u8; 0x10];
        assert!(matches!(
            decode_shape(&data, &node_at(0x10)),
            Err(DecodeError::OffsetOutOfRange {
                what: "shape data",
                ..
            })
        ));
    }
}
