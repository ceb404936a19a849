//! Feeding decoded containers into output formats.
//!
//! Decoders never write files themselves. A [`MeshSink`] receives one
//! triangle sequence per shape and an [`ImageSink`] receives one RGBA image
//! per texture entry; the drivers here walk a parsed container and report
//! per-asset decode failures without stopping the batch.

use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::models::fpm::{FpmFile, NodeEntry};
use crate::models::strip::Triangle;
use crate::textures::bitmap::DecodedImage;
use crate::textures::fsh::FshFile;

#[cfg(feature = "models")]
pub mod gltf_export;
#[cfg(feature = "models")]
pub mod texture;

/// Receives model geometry, one shape at a time.
pub trait MeshSink {
    type Error;

    /// Called once per top-level node entry, before its shapes.
    fn begin_group(&mut self, index: usize, node: &NodeEntry) -> Result<(), Self::Error>;

    /// Whether shapes using this texture should be decoded at all.
    fn accepts_material(&self, _texture_index: u16) -> bool {
        true
    }

    fn add_shape(
        &mut self,
        texture_index: u16,
        triangles: impl Iterator<Item = Triangle>,
    ) -> Result<(), Self::Error>;
}

/// Receives decoded texture-container entries.
pub trait ImageSink {
    type Error;

    fn add_image(&mut self, name: &str, image: &DecodedImage) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFailure {
    pub group: usize,
    pub shape: usize,
    pub data_offset: u32,
    pub error: DecodeError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelEmitSummary {
    pub shapes_emitted: usize,
    /// Shapes whose material the sink declined.
    pub shapes_skipped: usize,
    pub failures: Vec<ShapeFailure>,
}

/// Decode every shape of `fpm` into `sink`, group by group.
///
/// A shape that fails to decode is recorded in the summary and skipped; sink
/// errors abort immediately.
pub fn emit_model<S: MeshSink>(
    fpm: &FpmFile<'_>,
    sink: &mut S,
) -> Result<ModelEmitSummary, S::Error> {
    let mut summary = ModelEmitSummary::default();

    for (group_index, group) in fpm.groups.iter().enumerate() {
        sink.begin_group(group_index, &group.node)?;

        for (shape_index, node) in group.shapes.iter().enumerate() {
            if !sink.accepts_material(node.texture_index) {
                summary.shapes_skipped += 1;
                continue;
            }

            match fpm.decode_shape(node) {
                Ok(shape) => {
                    sink.add_shape(shape.texture_index, shape.triangles())?;
                    summary.shapes_emitted += 1;
                }
                Err(error) => {
                    warn!(
                        group = group_index,
                        shape = shape_index,
                        offset = node.data_offset,
                        %error,
                        "skipping shape"
                    );
                    summary.failures.push(ShapeFailure {
                        group: group_index,
                        shape: shape_index,
                        data_offset: node.data_offset,
                        error,
                    });
                }
            }
        }
    }

    debug!(
        emitted = summary.shapes_emitted,
        skipped = summary.shapes_skipped,
        failed = summary.failures.len(),
        "model emitted"
    );
    Ok(summary)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryFailure {
    pub name: String,
    pub error: DecodeError,
}

/// Decode every entry of `fsh` into `sink`. Entries that fail to decode are
/// returned; sink errors abort immediately.
pub fn emit_textures<S: ImageSink>(
    fsh: &FshFile<'_>,
    sink: &mut S,
) -> Result<Vec<EntryFailure>, S::Error> {
    let mut failures = Vec::new();
    for (entry, image) in fsh.entries() {
        match image {
            Ok(image) => sink.add_image(&entry.name, &image)?,
            Err(error) => {
                warn!(name = %entry.name, %error, "failed to decode texture entry");
                failures.push(EntryFailure {
                    name: entry.name.clone(),
                    error,
                });
            }
        }
    }
    Ok(failures)
}
