//! FPM model container parser.
//!
//! An FPM file is a shallow spatial hierarchy: a root directory lists node
//! entries, each node entry points at shape-header records, and each of those
//! points at an array of [`ShapeNode`]s referencing vertex/strip blocks and a
//! texture. Offsets are absolute from the start of the file.
//!
//! ```text
//! 0x00  header (magic "FPM1", length, unk, first shape offset)
//! 0x10  0x50 reserved bytes
//! 0x60  root bounding box
//! 0x80  directory (node count, first node offset, texture count, 0x90)
//! 0x90  texture info records
//! ```

use tracing::{debug, warn};
use winnow::Parser;
use winnow::binary::{le_u16, le_u32};
use winnow::token::take;

use crate::data::ByteCursor;
use crate::data::parser_utils::{BoundingBox, MAX_NAME_LEN, WResult, parse_bounding_box};
use crate::error::{DecodeError, DecodeResult};
use crate::models::shape::{self, Shape};

/// "FPM1" read as a little-endian u32.
pub const FPM_MAGIC: u32 = 0x314D5046;
/// The directory's fixed trailing value; also where the texture table starts.
pub const DIRECTORY_SENTINEL: u32 = 0x90;

const HEADER_SIZE: usize = 0x10;
const RESERVED_SIZE: usize = 0x50;
const DIRECTORY_SIZE: usize = 0x10;
const TEXTURE_INFO_SIZE: usize = 0x0C;
const NODE_ENTRY_SIZE: usize = 0x30;
const SHAPE_NODE_SIZE: usize = 0x30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FpmHeader {
    pub magic: u32,
    pub length: u32,
    pub unknown: u32,
    pub first_shape_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FpmDirectory {
    pub bounding_box: BoundingBox,
    pub node_count: u32,
    pub first_entry_offset: u32,
    pub texture_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TextureRef {
    /// Name as stored in the model, without extension.
    pub name: String,
}

impl TextureRef {
    /// The texture container this name resolves to.
    pub fn file_name(&self) -> String {
        format!("{}.fsh", self.name)
    }

    pub fn is_lightmap(&self) -> bool {
        self.name
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("lm_"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NodeEntry {
    pub bounding_box: BoundingBox,
    pub child_count: u32,
    pub sub_node_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShapeNode {
    pub bounding_box: BoundingBox,
    pub data_offset: u32,
    pub texture_index: u16,
}

/// Shapes belonging to one top-level node entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ShapeGroup {
    pub node: NodeEntry,
    pub shapes: Vec<ShapeNode>,
}

/// A parsed model container. Shape blocks are decoded lazily through
/// [`FpmFile::decode_shape`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FpmFile<'a> {
    #[cfg_attr(feature = "serde", serde(skip))]
    data: &'a [u8],
    pub header: FpmHeader,
    pub directory: FpmDirectory,
    pub textures: Vec<TextureRef>,
    pub groups: Vec<ShapeGroup>,
}

impl<'a> FpmFile<'a> {
    pub fn texture(&self, index: u16) -> Option<&TextureRef> {
        self.textures.get(index as usize)
    }

    pub fn shape_count(&self) -> usize {
        self.groups.iter().map(|group| group.shapes.len()).sum()
    }

    /// Decode the vertex block and strip of one shape.
    pub fn decode_shape(&self, node: &ShapeNode) -> DecodeResult<Shape<'a>> {
        shape::decode_shape(self.data, node)
    }
}

fn parse_header(input: &mut &[u8]) -> WResult<FpmHeader> {
    (le_u32, le_u32, le_u32, le_u32)
        .map(|(magic, length, unknown, first_shape_offset)| FpmHeader {
            magic,
            length,
            unknown,
            first_shape_offset,
        })
        .parse_next(input)
}

fn parse_node_entry(input: &mut &[u8]) -> WResult<NodeEntry> {
    let bounding_box = parse_bounding_box(input)?;
    (le_u32, le_u32, take(8usize))
        .map(|(child_count, sub_node_offset, _)| NodeEntry {
            bounding_box,
            child_count,
            sub_node_offset,
        })
        .parse_next(input)
}

/// Returns (shape count, shape array offset).
fn parse_shape_header(input: &mut &[u8]) -> WResult<(u32, u32)> {
    (take(0x20usize), le_u32, le_u32, le_u32, take(4usize))
        .map(|(_, count, _, offset, _)| (count, offset))
        .parse_next(input)
}

fn parse_shape_node(input: &mut &[u8]) -> WResult<ShapeNode> {
    let bounding_box = parse_bounding_box(input)?;
    (le_u32, take(8usize), le_u16, take(2usize))
        .map(|(data_offset, _, texture_index, _)| ShapeNode {
            bounding_box,
            data_offset,
            texture_index,
        })
        .parse_next(input)
}

/// Parse the container structure: header, directory, texture table and the
/// node/shape hierarchy.
///
/// Any structural violation aborts the whole parse.
pub fn parse_fpm(file_data: &[u8]) -> DecodeResult<FpmFile<'_>> {
    let mut cursor = ByteCursor::new(file_data);

    let header = cursor.parse(HEADER_SIZE, parse_header)?;
    if header.magic != FPM_MAGIC {
        return Err(DecodeError::MalformedHeader {
            what: "FPM magic",
            offset: 0,
            expected: FPM_MAGIC,
            found: header.magic,
        });
    }
    cursor.skip(RESERVED_SIZE)?;

    let bounding_box = cursor.parse(BoundingBox::SIZE, parse_bounding_box)?;
    let directory_offset = cursor.position();
    let (node_count, first_entry_offset, texture_count, sentinel) =
        cursor.parse(DIRECTORY_SIZE, |input| {
            (le_u32, le_u32, le_u32, le_u32).parse_next(input)
        })?;
    if sentinel != DIRECTORY_SENTINEL {
        return Err(DecodeError::MalformedHeader {
            what: "directory sentinel",
            offset: directory_offset + 0x0C,
            expected: DIRECTORY_SENTINEL,
            found: sentinel,
        });
    }
    let directory = FpmDirectory {
        bounding_box,
        node_count,
        first_entry_offset,
        texture_count,
    };
    debug!(
        nodes = node_count,
        textures = texture_count,
        "parsed FPM directory"
    );

    let textures = parse_textures(&mut cursor, texture_count)?;

    // Read every node entry before following any sub-node offset.
    cursor.seek(first_entry_offset as usize, "first node entry")?;
    let mut nodes = Vec::new();
    for _ in 0..node_count {
        let entry_offset = cursor.position();
        let node = cursor.parse(NODE_ENTRY_SIZE, parse_node_entry)?;
        if node.sub_node_offset as usize >= file_data.len() {
            return Err(DecodeError::OffsetOutOfRange {
                what: "sub-node",
                offset: node.sub_node_offset as usize,
                len: file_data.len(),
            });
        }
        if node.child_count != 1 {
            warn!(
                offset = entry_offset,
                child_count = node.child_count,
                "node entry does not have exactly one child"
            );
        }
        nodes.push(node);
    }

    let groups = nodes
        .into_iter()
        .map(|node| {
            let shapes = parse_group_shapes(&mut cursor, &node, texture_count)?;
            Ok(ShapeGroup { node, shapes })
        })
        .collect::<DecodeResult<Vec<_>>>()?;

    Ok(FpmFile {
        data: file_data,
        header,
        directory,
        textures,
        groups,
    })
}

fn parse_textures(cursor: &mut ByteCursor<'_>, texture_count: u32) -> DecodeResult<Vec<TextureRef>> {
    let name_offsets = (0..texture_count)
        .map(|_| cursor.parse(TEXTURE_INFO_SIZE, |input| {
            (le_u32, le_u32, le_u32)
                .map(|(name_offset, _, _)| name_offset)
                .parse_next(input)
        }))
        .collect::<DecodeResult<Vec<_>>>()?;

    name_offsets
        .into_iter()
        .map(|name_offset| {
            cursor.seek(name_offset as usize, "texture name")?;
            let name = cursor.read_null_terminated(MAX_NAME_LEN);
            debug!(%name, "texture");
            Ok(TextureRef { name })
        })
        .collect()
}

/// Follow a node entry's shape-header records and read the shapes they list.
fn parse_group_shapes(
    cursor: &mut ByteCursor<'_>,
    node: &NodeEntry,
    texture_count: u32,
) -> DecodeResult<Vec<ShapeNode>> {
    let mut shapes = Vec::new();
    for child in 0..node.child_count as usize {
        let record_offset = node.sub_node_offset as usize + child * SHAPE_NODE_SIZE;
        cursor.seek(record_offset, "shape header")?;
        let (count, array_offset) = cursor.parse(SHAPE_NODE_SIZE, parse_shape_header)?;

        if count == 0 {
            continue;
        }
        cursor.seek(array_offset as usize, "shape array")?;
        for _ in 0..count {
            let shape = cursor.parse(SHAPE_NODE_SIZE, parse_shape_node)?;
            if shape.data_offset as usize >= cursor.len() {
                return Err(DecodeError::OffsetOutOfRange {
                    what: "shape data",
                    offset: shape.data_offset as usize,
                    len: cursor.len(),
                });
            }
            if u32::from(shape.texture_index) >= texture_count {
                return Err(DecodeError::TextureIndexOutOfRange {
                    index: shape.texture_index,
                    count: texture_count as usize,
                });
            }
            shapes.push(shape);
        }
    }
    debug!(
        offset = node.sub_node_offset,
        shapes = shapes.len(),
        "parsed node group"
    );
    Ok(shapes)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    fn compact_vertices(count: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|i| [i as f32, 0.0, 0.0, 0.0, 0.0])
            .flat_map(f32::to_le_bytes)
            .collect()
    }

    fn sample() -> Vec<u8> {
        build_fpm(
            &["wall", "lm_wall"],
            &[
                vec![TestShape {
                    texture_index: 1,
                    stride: 0x14,
                    vertices: compact_vertices(3),
                    strip: vec![0, 1, 2],
                }],
                vec![],
            ],
        )
    }

    #[test]
    fn parses_hierarchy_and_textures() {
        let data = sample();
        let fpm = parse_fpm(&data).unwrap();
        assert_eq!(fpm.header.magic, FPM_MAGIC);
        assert_eq!(fpm.directory.node_count, 2);
        assert_eq!(fpm.textures.len(), 2);
        assert_eq!(fpm.textures[0].file_name(), "wall.fsh");
        assert!(fpm.textures[1].is_lightmap());
        assert!(!fpm.textures[0].is_lightmap());
        assert_eq!(fpm.groups.len(), 2);
        assert_eq!(fpm.groups[0].shapes.len(), 1);
        assert!(fpm.groups[1].shapes.is_empty());
        assert_eq!(fpm.shape_count(), 1);

        let shape = fpm.decode_shape(&fpm.groups[0].shapes[0]).unwrap();
        assert_eq!(shape.texture_index, 1);
        assert_eq!(shape.triangles().count(), 1);
    }

    #[test]
    fn flipped_magic_byte_is_malformed() {
        let mut data = sample();
        data[3] ^= 0x01;
        assert!(matches!(
            parse_fpm(&data),
            Err(DecodeError::MalformedHeader {
                what: "FPM magic",
                expected: FPM_MAGIC,
                ..
            })
        ));
    }

    #[test]
    fn wrong_sentinel_is_malformed() {
        let mut data = sample();
        data[0x8C..0x90].copy_from_slice(&0x91u32.to_le_bytes());
        assert_eq!(
            parse_fpm(&data).unwrap_err(),
            DecodeError::MalformedHeader {
                what: "directory sentinel",
                offset: 0x8C,
                expected: 0x90,
                found: 0x91,
            }
        );
    }

    #[test]
    fn sub_node_offset_past_end_is_rejected() {
        let mut data = sample();
        let first_entry = u32::from_le_bytes(data[0x84..0x88].try_into().unwrap()) as usize;
        let len = data.len() as u32;
        data[first_entry + 0x24..first_entry + 0x28].copy_from_slice(&len.to_le_bytes());
        assert!(matches!(
            parse_fpm(&data),
            Err(DecodeError::OffsetOutOfRange {
                what: "sub-node",
                ..
            })
        ));
    }

    #[test]
    fn texture_index_past_table_is_rejected() {
        let data = build_fpm(
            &["wall"],
            &[vec![TestShape {
                texture_index: 1,
                stride: 0x14,
                vertices: compact_vertices(3),
                strip: vec![0, 1, 2],
            }]],
        );
        assert_eq!(
            parse_fpm(&data).unwrap_err(),
            DecodeError::TextureIndexOutOfRange { index: 1, count: 1 }
        );
    }

    #[test]
    fn truncated_header_is_a_short_read() {
        assert!(matches!(
            parse_fpm(&[0x46, 0x50, 0x4D]),
            Err(DecodeError::ShortRead { offset: 0, .. })
        ));
    }

    #[test]
    fn huge_node_count_runs_out_of_data() {
        let mut data = build_fpm(&["wall"], &[vec![]]);
        data[0x80..0x84].copy_from_slice(&u32::MAX.to_le_bytes());
        let len = data.len();
        assert_eq!(
            parse_fpm(&data).unwrap_err(),
            DecodeError::ShortRead {
                offset: len,
                needed: NODE_ENTRY_SIZE,
                available: 0
            }
        );
    }
}
