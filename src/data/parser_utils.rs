//! Shared winnow-based parsing utilities used by the model and texture parsers.

use winnow::Parser;
use winnow::binary::le_f32;
use winnow::error::ContextError;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, winnow::error::ErrMode<ContextError>>;

/// Longest name (excluding the terminator) stored in either container.
pub const MAX_NAME_LEN: usize = 0xFF;

/// Axis-aligned extent stored as two `Vector4`s (0x20 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BoundingBox {
    pub min: [f32; 4],
    pub max: [f32; 4],
}

impl BoundingBox {
    pub const SIZE: usize = 0x20;
}

fn parse_vector4(input: &mut &[u8]) -> WResult<[f32; 4]> {
    (le_f32, le_f32, le_f32, le_f32)
        .map(|(x, y, z, w)| [x, y, z, w])
        .parse_next(input)
}

pub fn parse_bounding_box(input: &mut &[u8]) -> WResult<BoundingBox> {
    let min = parse_vector4(input)?;
    let max = parse_vector4(input)?;
    Ok(BoundingBox { min, max })
}

/// Round `offset` up to the next multiple of `alignment` (a power of two).
pub fn align_up(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

/// Read a NUL-terminated ASCII string from the front of `data`.
///
/// Reading stops at the terminator, after `max_len` bytes, or at the end of
/// `data`, whichever comes first. Returns the string and the number of bytes
/// consumed (including the terminator, if one was found).
pub fn read_null_terminated_string(data: &[u8], max_len: usize) -> (String, usize) {
    let window = &data[..data.len().min(max_len)];
    match window.iter().position(|&b| b == 0) {
        Some(end) => (String::from_utf8_lossy(&window[..end]).into_owned(), end + 1),
        None => (String::from_utf8_lossy(window).into_owned(), window.len()),
    }
}
