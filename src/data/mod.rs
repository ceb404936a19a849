/// Bounds-checked seek/read cursor over an in-memory container
pub mod cursor;
/// Shared winnow helpers (bounding boxes, alignment, NUL-terminated strings)
pub mod parser_utils;

pub use cursor::ByteCursor;
