/// Palettes, bitmap payloads, bit-depth expansion and palette application
pub mod bitmap;
/// Chunk header codec, chunk-chain traversal and the per-entry decoder
pub mod chunk;
/// FSH container header and directory
pub mod fsh;

pub use bitmap::{DecodedImage, ImageMetadata, Palette};
pub use chunk::{ChunkKind, decode_entry};
pub use fsh::{FshFile, load_all_images, load_first_image, parse_fsh};
