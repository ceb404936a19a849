/// FPM model container: header, directory, texture table, node hierarchy
pub mod fpm;
/// Per-shape data blocks (vertex block + index strip)
pub mod shape;
/// Triangle-strip to triangle-list conversion
pub mod strip;
/// The four stride-selected vertex record layouts
pub mod vertex_format;

pub use fpm::{FpmFile, ShapeNode, TextureRef, parse_fpm};
pub use shape::Shape;
pub use strip::{Triangle, TriangleStrip};
pub use vertex_format::{Vertex, VertexLayout};
