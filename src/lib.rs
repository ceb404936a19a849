/// Byte cursor and shared parsing helpers
pub mod data;
/// Error definitions
pub mod error;
/// Sink traits and drivers that feed decoded assets into output formats
pub mod export;
/// FPM model container, shape geometry and triangle strips
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;
/// FSH texture container, chunk chains and palette-indexed bitmaps
pub mod textures;
