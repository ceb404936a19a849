//! Export FPM models to glTF/GLB format.
//!
//! Scene layout: a `Root` node with one `Node[i]` child per top-level node
//! entry, each holding one mesh node per shape, named after the shape's
//! material. Textures are embedded as PNG in the binary chunk.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use bon::Builder;
use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use rootcause::Report;
use thiserror::Error;
use tracing::{debug, warn};

use crate::export::texture::decoded_to_png;
use crate::export::{MeshSink, ModelEmitSummary, emit_model};
use crate::models::fpm::{FpmFile, NodeEntry, TextureRef};
use crate::models::strip::Triangle;
use crate::textures::fsh::load_first_image;

const UNLIT_EXTENSION: &str = "KHR_materials_unlit";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("texture index {index} has no material (model has {count} textures)")]
    MaterialOutOfRange { index: u16, count: usize },
    #[error("shape added before any group")]
    NoGroup,
    #[error("glTF serialization error: {0}")]
    Serialize(String),
    #[error("I/O error: {0}")]
    Io(String),
}

#[derive(Builder, Debug, Clone)]
pub struct ModelExportOptions {
    /// Export lightmap (`lm_*`) textures and the shapes that use them.
    #[builder(default = true)]
    pub lightmaps: bool,
    /// Opacity applied to lightmap textures.
    #[builder(default = 0.5)]
    pub lightmap_alpha: f32,
}

impl Default for ModelExportOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Load `<texture>.fsh` from `texture_dir` and convert its first entry to PNG.
///
/// Returns `None` (with a warning) when the texture cannot be loaded; the
/// material is then exported untextured.
pub fn load_texture_png(
    texture_dir: &Path,
    texture: &TextureRef,
    options: &ModelExportOptions,
) -> Option<Vec<u8>> {
    let path = texture_dir.join(texture.file_name());
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "texture not readable; exporting untextured");
            return None;
        }
    };

    let image = match load_first_image(&bytes) {
        Ok(Some(image)) => image,
        Ok(None) => {
            warn!(path = %path.display(), "texture container has no entries");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to decode texture");
            return None;
        }
    };

    let alpha = texture.is_lightmap().then_some(options.lightmap_alpha);
    match decoded_to_png(&image, alpha) {
        Ok(png) => Some(png),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to convert texture");
            None
        }
    }
}

/// Decode every shape of `fpm` and write a GLB to `writer`.
///
/// Texture containers are looked up in `texture_dir`.
pub fn export_model_glb(
    fpm: &FpmFile<'_>,
    texture_dir: &Path,
    options: &ModelExportOptions,
    writer: &mut impl Write,
) -> Result<ModelEmitSummary, Report<ExportError>> {
    let images = fpm
        .textures
        .iter()
        .map(|texture| {
            if texture.is_lightmap() && !options.lightmaps {
                None
            } else {
                load_texture_png(texture_dir, texture, options)
            }
        })
        .collect();

    let mut sink = GlbMeshSink::new(&fpm.textures, images, options);
    let summary = emit_model(fpm, &mut sink)?;
    sink.write_glb(writer)?;
    Ok(summary)
}

/// Accumulates a glTF document from emitted shapes.
pub struct GlbMeshSink {
    root: json::Root,
    bin_data: Vec<u8>,
    /// One slot per model texture; `None` for textures that were left out.
    materials: Vec<Option<(json::Index<json::Material>, String)>>,
    groups: Vec<Vec<json::Index<json::Node>>>,
}

impl GlbMeshSink {
    /// `images` holds PNG bytes per texture, in model texture order.
    pub fn new(
        textures: &[TextureRef],
        images: Vec<Option<Vec<u8>>>,
        options: &ModelExportOptions,
    ) -> Self {
        let mut root = json::Root::default();
        root.asset = json::Asset {
            version: "2.0".to_string(),
            generator: Some("fpmunpack".to_string()),
            ..Default::default()
        };
        let mut bin_data = Vec::new();

        let materials: Vec<_> = textures
            .iter()
            .zip(images.into_iter().chain(std::iter::repeat(None)))
            .map(|(texture, png)| {
                let lightmap = texture.is_lightmap();
                if lightmap && !options.lightmaps {
                    return None;
                }
                let base_color_texture = png
                    .map(|png| embed_png(&mut root, &mut bin_data, &png, &texture.name));
                let material = root.push(material(&texture.name, lightmap, base_color_texture));
                Some((material, texture.name.clone()))
            })
            .collect();

        if textures.iter().any(|texture| !texture.is_lightmap()) {
            root.extensions_used.push(UNLIT_EXTENSION.to_string());
        }

        Self {
            root,
            bin_data,
            materials,
            groups: Vec::new(),
        }
    }

    /// Finish the scene hierarchy and write the GLB.
    pub fn write_glb(mut self, writer: &mut impl Write) -> Result<(), Report<ExportError>> {
        let group_nodes: Vec<_> = self
            .groups
            .into_iter()
            .enumerate()
            .map(|(i, children)| {
                self.root.push(json::Node {
                    children: if children.is_empty() {
                        None
                    } else {
                        Some(children)
                    },
                    name: Some(format!("Node[{i}]")),
                    ..Default::default()
                })
            })
            .collect();

        let root_node = self.root.push(json::Node {
            children: if group_nodes.is_empty() {
                None
            } else {
                Some(group_nodes)
            },
            name: Some("Root".to_string()),
            ..Default::default()
        });

        pad_to_4(&mut self.bin_data);
        if !self.bin_data.is_empty() {
            let buffer = self.root.push(json::Buffer {
                byte_length: USize64::from(self.bin_data.len()),
                uri: None,
                name: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
            for bv in self.root.buffer_views.iter_mut() {
                bv.buffer = buffer;
            }
        }

        let scene = self.root.push(json::Scene {
            nodes: vec![root_node],
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.root.scene = Some(scene);

        let json_string = json::serialize::to_string(&self.root)
            .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;

        let glb = gltf::binary::Glb {
            header: gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                length: 0, // to_writer computes this
            },
            json: Cow::Owned(json_string.into_bytes()),
            bin: if self.bin_data.is_empty() {
                None
            } else {
                Some(Cow::Owned(self.bin_data))
            },
        };

        glb.to_writer(writer)
            .map_err(|e| Report::new(ExportError::Io(e.to_string())))?;

        Ok(())
    }
}

impl MeshSink for GlbMeshSink {
    type Error = Report<ExportError>;

    fn begin_group(&mut self, _index: usize, _node: &NodeEntry) -> Result<(), Self::Error> {
        self.groups.push(Vec::new());
        Ok(())
    }

    fn accepts_material(&self, texture_index: u16) -> bool {
        matches!(self.materials.get(texture_index as usize), Some(Some(_)))
    }

    fn add_shape(
        &mut self,
        texture_index: u16,
        triangles: impl Iterator<Item = Triangle>,
    ) -> Result<(), Self::Error> {
        let (material, material_name) = self
            .materials
            .get(texture_index as usize)
            .cloned()
            .flatten()
            .ok_or_else(|| {
                Report::new(ExportError::MaterialOutOfRange {
                    index: texture_index,
                    count: self.materials.len(),
                })
            })?;

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        for triangle in triangles {
            for vertex in triangle.vertices {
                positions.push(vertex.position);
                normals.extend(vertex.normal);
                uvs.push(vertex.uv);
            }
        }
        if positions.is_empty() {
            debug!(material = %material_name, "shape has no triangles");
            return Ok(());
        }

        let mut attributes = BTreeMap::new();
        let (min, max) = bounding_coords(&positions);
        let pos = push_accessor(
            &mut self.root,
            &mut self.bin_data,
            &positions,
            json::accessor::Type::Vec3,
            Some((min.to_vec(), max.to_vec())),
        );
        attributes.insert(Valid(json::mesh::Semantic::Positions), pos);
        if normals.len() == positions.len() {
            let norm = push_accessor(
                &mut self.root,
                &mut self.bin_data,
                &normals,
                json::accessor::Type::Vec3,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::Normals), norm);
        }
        let uv = push_accessor(
            &mut self.root,
            &mut self.bin_data,
            &uvs,
            json::accessor::Type::Vec2,
            None,
        );
        attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), uv);

        let mesh = self.root.push(json::Mesh {
            primitives: vec![json::mesh::Primitive {
                attributes,
                indices: None,
                material: Some(material),
                mode: Valid(json::mesh::Mode::Triangles),
                targets: None,
                extensions: Default::default(),
                extras: Default::default(),
            }],
            weights: None,
            name: Some(material_name.clone()),
            extensions: Default::default(),
            extras: Default::default(),
        });

        let node = self.root.push(json::Node {
            mesh: Some(mesh),
            name: Some(material_name),
            ..Default::default()
        });

        self.groups
            .last_mut()
            .ok_or_else(|| Report::new(ExportError::NoGroup))?
            .push(node);
        Ok(())
    }
}

/// Lightmaps blend over the base geometry; everything else is unlit and
/// alpha-masked.
fn material(
    name: &str,
    lightmap: bool,
    base_color_texture: Option<json::texture::Info>,
) -> json::Material {
    if lightmap {
        json::Material {
            name: Some(name.to_string()),
            alpha_mode: Valid(json::material::AlphaMode::Blend),
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_texture,
                metallic_factor: json::material::StrengthFactor(0.0),
                roughness_factor: json::material::StrengthFactor(0.0),
                ..Default::default()
            },
            double_sided: true,
            ..Default::default()
        }
    } else {
        json::Material {
            name: Some(name.to_string()),
            alpha_mode: Valid(json::material::AlphaMode::Mask),
            alpha_cutoff: Some(json::material::AlphaCutoff(0.0)),
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_texture,
                ..Default::default()
            },
            double_sided: true,
            extensions: Some(json::extensions::material::Material {
                unlit: Some(json::extensions::material::Unlit {}),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Embed a PNG image in the binary buffer and return a texture reference to it.
fn embed_png(
    root: &mut json::Root,
    bin_data: &mut Vec<u8>,
    png_bytes: &[u8],
    image_name: &str,
) -> json::texture::Info {
    let byte_offset = bin_data.len();
    bin_data.extend_from_slice(png_bytes);
    pad_to_4(bin_data);

    let bv = root.push(json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64::from(png_bytes.len()),
        byte_offset: Some(USize64::from(byte_offset)),
        byte_stride: None,
        target: None,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    let image = root.push(json::Image {
        buffer_view: Some(bv),
        mime_type: Some(json::image::MimeType("image/png".to_string())),
        uri: None,
        name: Some(image_name.to_string()),
        extensions: Default::default(),
        extras: Default::default(),
    });

    let sampler = root.push(json::texture::Sampler {
        mag_filter: Some(Valid(json::texture::MagFilter::Linear)),
        min_filter: Some(Valid(json::texture::MinFilter::LinearMipmapLinear)),
        wrap_s: Valid(json::texture::WrappingMode::Repeat),
        wrap_t: Valid(json::texture::WrappingMode::Repeat),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    let texture = root.push(json::Texture {
        source: image,
        sampler: Some(sampler),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    json::texture::Info {
        index: texture,
        tex_coord: 0,
        extensions: Default::default(),
        extras: Default::default(),
    }
}

/// Append `items` as tightly packed f32 components and create an accessor.
fn push_accessor<const N: usize>(
    root: &mut json::Root,
    bin_data: &mut Vec<u8>,
    items: &[[f32; N]],
    type_: json::accessor::Type,
    bounds: Option<(Vec<f32>, Vec<f32>)>,
) -> json::Index<json::Accessor> {
    let byte_offset = bin_data.len();
    for component in items.iter().flatten() {
        bin_data.extend_from_slice(&component.to_le_bytes());
    }
    pad_to_4(bin_data);
    let byte_length = bin_data.len() - byte_offset;

    let bv = root.push(json::buffer::View {
        buffer: json::Index::new(0),
        byte_length: USize64::from(byte_length),
        byte_offset: Some(USize64::from(byte_offset)),
        byte_stride: None,
        target: Some(Valid(json::buffer::Target::ArrayBuffer)),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    let (min, max) = match bounds {
        Some((min, max)) => (Some(json::Value::from(min)), Some(json::Value::from(max))),
        None => (None, None),
    };

    root.push(json::Accessor {
        buffer_view: Some(bv),
        byte_offset: Some(USize64(0)),
        count: USize64::from(items.len()),
        component_type: Valid(json::accessor::GenericComponentType(
            json::accessor::ComponentType::F32,
        )),
        type_: Valid(type_),
        min,
        max,
        name: None,
        normalized: false,
        sparse: None,
        extensions: Default::default(),
        extras: Default::default(),
    })
}

fn pad_to_4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

fn bounding_coords(points: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in points {
        for i in 0..3 {
            min[i] = f32::min(min[i], p[i]);
            max[i] = f32::max(max[i], p[i]);
        }
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fpm::parse_fpm;
    use crate::models::fpm::test_support::{TestShape, build_fpm};
    use crate::textures::chunk::ChunkKind;
    use crate::textures::chunk::test_support::{argb_palette, chunk, indexed8, name_chunk};
    use crate::textures::fsh::test_support::build_fsh;

    fn triangle_shape(texture_index: u16) -> TestShape {
        let vertices = [
            [0.0f32, 0.0, 0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0, 1.0, 0.0],
            [0.0, 1.0, 0.0, 0.0, 1.0],
        ];
        TestShape {
            texture_index,
            stride: 0x14,
            vertices: vertices.iter().flatten().flat_map(|v| v.to_le_bytes()).collect(),
            strip: vec![0, 1, 2],
        }
    }

    fn texture_container() -> Vec<u8> {
        let mut chain = chunk(ChunkKind::Indexed8, &indexed8(1, 1, &[0]), false);
        chain.extend(chunk(
            ChunkKind::PaletteArgb32,
            &argb_palette(&[[200, 100, 50, 255]]),
            false,
        ));
        chain.extend(name_chunk("floor"));
        build_fsh(&[("flr0", chain)])
    }

    fn export(
        textures: &[&str],
        shapes: Vec<TestShape>,
        options: &ModelExportOptions,
    ) -> (ModelEmitSummary, gltf::Gltf) {
        let dir = std::env::temp_dir().join(format!(
            "fpmunpack-glb-{}-{}",
            std::process::id(),
            textures.join("-")
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("floor.fsh"), texture_container()).unwrap();

        let data = build_fpm(textures, &[shapes]);
        let fpm = parse_fpm(&data).unwrap();
        let mut out = Vec::new();
        let summary = export_model_glb(&fpm, &dir, options, &mut out).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        (summary, gltf::Gltf::from_slice(&out).unwrap())
    }

    #[test]
    fn options_default_to_half_alpha_lightmaps() {
        let options = ModelExportOptions::default();
        assert!(options.lightmaps);
        assert_eq!(options.lightmap_alpha, 0.5);
        let options = ModelExportOptions::builder().lightmaps(false).build();
        assert!(!options.lightmaps);
    }

    #[test]
    fn glb_has_group_hierarchy_and_embedded_texture() {
        let (summary, gltf) = export(
            &["floor", "missing"],
            vec![triangle_shape(0), triangle_shape(1)],
            &ModelExportOptions::default(),
        );
        assert_eq!(summary.shapes_emitted, 2);

        let names: Vec<_> = gltf.nodes().filter_map(|n| n.name()).collect();
        assert!(names.contains(&"Root"));
        assert!(names.contains(&"Node[0]"));
        assert!(names.contains(&"floor"));
        assert!(names.contains(&"missing"));

        assert_eq!(gltf.meshes().count(), 2);
        assert_eq!(gltf.images().count(), 1);
        let floor = gltf
            .materials()
            .find(|m| m.name() == Some("floor"))
            .unwrap();
        assert!(floor.double_sided());
        assert_eq!(floor.alpha_mode(), gltf::material::AlphaMode::Mask);
        assert!(floor.unlit());
        assert!(gltf.extensions_used().any(|ext| ext == "KHR_materials_unlit"));
        assert!(floor.pbr_metallic_roughness().base_color_texture().is_some());
        let missing = gltf
            .materials()
            .find(|m| m.name() == Some("missing"))
            .unwrap();
        assert!(missing.pbr_metallic_roughness().base_color_texture().is_none());

        let mesh = gltf.meshes().next().unwrap();
        let primitive = mesh.primitives().next().unwrap();
        assert_eq!(
            primitive.get(&gltf::Semantic::Positions).unwrap().count(),
            3
        );
        assert!(primitive.get(&gltf::Semantic::Normals).is_none());
    }

    #[test]
    fn disabled_lightmaps_drop_their_shapes() {
        let options = ModelExportOptions::builder().lightmaps(false).build();
        let (summary, gltf) = export(
            &["floor", "LM_floor"],
            vec![triangle_shape(0), triangle_shape(1)],
            &options,
        );
        assert_eq!(summary.shapes_emitted, 1);
        assert_eq!(summary.shapes_skipped, 1);
        assert_eq!(gltf.meshes().count(), 1);
        assert_eq!(gltf.materials().count(), 1);
    }

    #[test]
    fn lightmaps_blend() {
        let (_, gltf) = export(
            &["lm_floor"],
            vec![triangle_shape(0)],
            &ModelExportOptions::default(),
        );
        let material = gltf.materials().next().unwrap();
        assert_eq!(material.alpha_mode(), gltf::material::AlphaMode::Blend);
        assert!(!material.unlit());
        assert_eq!(gltf.extensions_used().count(), 0);
    }
}
