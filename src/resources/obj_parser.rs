//! Wavefront OBJ parsing into the CPU intermediate form.

use std::{collections::HashMap, path::Path};

use anyhow::Context as _;

use crate::{
    data_structures::material::TextureSlot,
    resources::{
        cpu::{IDENTITY, ImageCpuData, MaterialCpuData, MeshCpuData, ModelCpuData, NodeCpuData},
        parser::ModelParser,
    },
};

/// Parses `.obj` files and their `.mtl` libraries.
///
/// Faces are triangulated and every tobj model becomes one mesh under its own
/// child of the root node. Texture paths are resolved next to the `.obj`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjParser;

impl ModelParser for ObjParser {
    fn parse(&self, path: &Path) -> anyhow::Result<ModelCpuData> {
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .with_context(|| format!("reading {}", path.display()))?;
        let materials = materials.unwrap_or_else(|e| {
            log::warn!("{}: material library not loaded: {e}", path.display());
            Vec::new()
        });

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut model = ModelCpuData::empty(path.to_path_buf());
        for m in &materials {
            let material = parse_material(m, base, &mut model.images);
            model.materials.push(material);
        }

        let mut root = NodeCpuData {
            name: path
                .file_stem()
                .map_or_else(|| "root".to_string(), |s| s.to_string_lossy().into_owned()),
            ..Default::default()
        };
        for m in models {
            let mesh = &m.mesh;
            let material = mesh.material_id.filter(|&id| {
                let known = id < model.materials.len();
                if !known {
                    log::warn!("{}: unknown material {id}", m.name);
                }
                known
            });
            root.children.push(NodeCpuData {
                name: m.name.clone(),
                transform: IDENTITY,
                meshes: vec![model.meshes.len()],
                children: Vec::new(),
            });
            model.meshes.push(MeshCpuData {
                name: m.name,
                positions: mesh
                    .positions
                    .chunks_exact(3)
                    .map(|p| [p[0], p[1], p[2]])
                    .collect(),
                normals: mesh
                    .normals
                    .chunks_exact(3)
                    .map(|n| [n[0], n[1], n[2]])
                    .collect(),
                // OBJ puts the uv origin at the bottom left
                uvs: mesh
                    .texcoords
                    .chunks_exact(2)
                    .map(|t| [t[0], 1.0 - t[1]])
                    .collect(),
                indices: mesh.indices.clone(),
                material,
            });
        }
        model.root = root;
        Ok(model)
    }
}

fn parse_material(
    m: &tobj::Material,
    base: &Path,
    images: &mut HashMap<String, ImageCpuData>,
) -> MaterialCpuData {
    let diffuse = m.diffuse.unwrap_or([1.0; 3]);
    let mut material = MaterialCpuData {
        name: m.name.clone(),
        base_colour: [diffuse[0], diffuse[1], diffuse[2], m.dissolve.unwrap_or(1.0)],
        ..Default::default()
    };
    let slots = [
        (TextureSlot::BaseColour, &m.diffuse_texture),
        (TextureSlot::Normal, &m.normal_texture),
    ];
    for (slot, texture) in slots {
        let Some(file) = texture else { continue };
        let key = base.join(file).to_string_lossy().into_owned();
        if !images.contains_key(&key) {
            match image::open(&key) {
                Ok(img) => {
                    let rgba = img.to_rgba8();
                    images.insert(
                        key.clone(),
                        ImageCpuData {
                            width: rgba.width(),
                            height: rgba.height(),
                            rgba: rgba.into_raw(),
                        },
                    );
                }
                Err(e) => {
                    log::warn!("{}: {slot:?} texture {key} not loaded: {e}", m.name);
                    continue;
                }
            }
        }
        material.textures.insert(slot, key);
    }
    material
}
