use thiserror::Error;

/// Structural decode failures for model and texture containers.
///
/// Every variant is terminal for the asset being decoded: there is no partial
/// result. Offsets are absolute byte positions within the decoded buffer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("malformed {what} at 0x{offset:X}: expected 0x{expected:08X}, found 0x{found:08X}")]
    MalformedHeader {
        what: &'static str,
        offset: usize,
        expected: u32,
        found: u32,
    },
    #[error("{what} offset 0x{offset:X} is outside the stream (length 0x{len:X})")]
    OffsetOutOfRange {
        what: &'static str,
        offset: usize,
        len: usize,
    },
    #[error("short read at 0x{offset:X}: need 0x{needed:X} bytes, have 0x{available:X}")]
    ShortRead {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("unsupported vertex stride 0x{stride:02X} in shape at 0x{offset:X}")]
    UnsupportedVertexStride { stride: u8, offset: usize },
    #[error("unsupported chunk kind {kind} at 0x{offset:X}")]
    UnsupportedChunkKind { kind: String, offset: usize },
    #[error(
        "invalid palette geometry at 0x{offset:X}: width={width}, height={height}, x_center={x_center}"
    )]
    InvalidPaletteGeometry {
        width: u16,
        height: u16,
        x_center: u16,
        offset: usize,
    },
    #[error("palette index {index} at ({x}, {y}) is out of range (palette has {palette_len} colors)")]
    PaletteIndexOutOfRange {
        index: u8,
        palette_len: usize,
        x: usize,
        y: usize,
    },
    #[error("texture container declares a negative entry count ({count})")]
    NegativeEntryCount { count: i32 },
    #[error("chunk at 0x{offset:X} has next-block offset {next_block_offset}, smaller than its header")]
    InvalidChunkLength {
        offset: usize,
        next_block_offset: u32,
    },
    #[error("texture index {index} is out of range (model has {count} textures)")]
    TextureIndexOutOfRange { index: u16, count: usize },
    #[error("strip references vertex {index} but the shape has {vertex_count} vertices")]
    VertexIndexOutOfRange { index: u16, vertex_count: usize },
    #[error("second bitmap chunk at 0x{offset:X}; an entry carries exactly one")]
    DuplicateBitmap { offset: usize },
    #[error("entry is incomplete: bitmap present={has_bitmap}, palette colors={palette_len}")]
    MissingImageData { has_bitmap: bool, palette_len: usize },
}

pub type DecodeResult<T> = Result<T, DecodeError>;
