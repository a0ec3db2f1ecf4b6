//! glTF 2.0 parsing into the CPU intermediate form.
//!
//! Every triangle primitive becomes one mesh. Images are decoded here, on the
//! worker thread; an image that fails to load only drops the texture slots
//! that use it.

use std::{collections::HashMap, path::Path};

use anyhow::Context as _;

use crate::{
    data_structures::material::TextureSlot,
    resources::{
        cpu::{IDENTITY, ImageCpuData, MaterialCpuData, MeshCpuData, ModelCpuData, NodeCpuData},
        parser::ModelParser,
    },
};

#[derive(Clone, Copy, Debug, Default)]
pub struct GltfParser;

impl ModelParser for GltfParser {
    fn parse(&self, path: &Path) -> anyhow::Result<ModelCpuData> {
        let gltf::Gltf { document, blob } =
            gltf::Gltf::open(path).with_context(|| format!("reading {}", path.display()))?;
        let base = path.parent();
        let buffers = gltf::import_buffers(&document, base, blob)
            .with_context(|| format!("loading buffers of {}", path.display()))?;

        let images = load_images(&document, base, &buffers);

        let mut model = ModelCpuData::empty(path.to_path_buf());
        for material in document.materials() {
            model.materials.push(parse_material(&material, &images));
        }
        model.images = images.into_values().collect();

        // glTF mesh index -> indices of the meshes built from its primitives
        let mut primitive_meshes: HashMap<usize, Vec<usize>> = HashMap::new();
        for mesh in document.meshes() {
            let name = mesh
                .name()
                .map_or_else(|| format!("mesh{}", mesh.index()), str::to_string);
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "{}: primitive {} of {name} is not a triangle list, skipping",
                        path.display(),
                        primitive.index()
                    );
                    continue;
                }
                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()].0[..]));
                let cpu = MeshCpuData {
                    name: format!("{name}/{}", primitive.index()),
                    positions: reader.read_positions().map_or_else(Vec::new, Iterator::collect),
                    normals: reader.read_normals().map_or_else(Vec::new, Iterator::collect),
                    uvs: reader
                        .read_tex_coords(0)
                        .map_or_else(Vec::new, |uvs| uvs.into_f32().collect()),
                    indices: reader
                        .read_indices()
                        .map_or_else(Vec::new, |indices| indices.into_u32().collect()),
                    material: primitive.material().index(),
                };
                primitive_meshes
                    .entry(mesh.index())
                    .or_default()
                    .push(model.meshes.len());
                model.meshes.push(cpu);
            }
        }

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .context("the file contains no scene")?;
        model.root = NodeCpuData {
            name: path
                .file_stem()
                .map_or_else(|| "root".to_string(), |s| s.to_string_lossy().into_owned()),
            transform: IDENTITY,
            meshes: Vec::new(),
            children: scene
                .nodes()
                .map(|node| to_cpu_node(&node, &primitive_meshes))
                .collect(),
        };
        Ok(model)
    }
}

fn to_cpu_node(node: &gltf::Node, primitive_meshes: &HashMap<usize, Vec<usize>>) -> NodeCpuData {
    NodeCpuData {
        name: node
            .name()
            .map_or_else(|| format!("node{}", node.index()), str::to_string),
        transform: node.transform().matrix(),
        meshes: node
            .mesh()
            .and_then(|mesh| primitive_meshes.get(&mesh.index()).cloned())
            .unwrap_or_default(),
        children: node
            .children()
            .map(|child| to_cpu_node(&child, primitive_meshes))
            .collect(),
    }
}

/// Key an image is deduplicated by: its URI, else its name, else its index.
fn image_key(image: &gltf::Image) -> String {
    match image.source() {
        gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => uri.to_string(),
        _ => image
            .name()
            .map_or_else(|| format!("image{}", image.index()), str::to_string),
    }
}

/// Decoded images by glTF image index, each with its key.
fn load_images(
    document: &gltf::Document,
    base: Option<&Path>,
    buffers: &[gltf::buffer::Data],
) -> HashMap<usize, (String, ImageCpuData)> {
    let mut images = HashMap::new();
    for image in document.images() {
        let key = image_key(&image);
        let decoded = gltf::image::Data::from_source(image.source(), base, buffers)
            .map_err(anyhow::Error::from)
            .and_then(to_rgba);
        match decoded {
            Ok(data) => {
                images.insert(image.index(), (key, data));
            }
            Err(e) => log::warn!("image {key} could not be loaded: {e:#}"),
        }
    }
    images
}

fn to_rgba(data: gltf::image::Data) -> anyhow::Result<ImageCpuData> {
    use gltf::image::Format;

    let rgba = match data.format {
        Format::R8G8B8A8 => data.pixels,
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => data
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[1], 0, 255])
            .collect(),
        Format::R8 => data.pixels.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        other => anyhow::bail!("unsupported pixel format {other:?}"),
    };
    Ok(ImageCpuData {
        width: data.width,
        height: data.height,
        rgba,
    })
}

fn parse_material(
    material: &gltf::Material,
    images: &HashMap<usize, (String, ImageCpuData)>,
) -> MaterialCpuData {
    let pbr = material.pbr_metallic_roughness();
    let mut cpu = MaterialCpuData {
        name: material.name().map_or_else(
            || format!("material{}", material.index().unwrap_or(usize::MAX)),
            str::to_string,
        ),
        base_colour: pbr.base_color_factor(),
        emissive: material.emissive_factor(),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        ..Default::default()
    };
    if let Some(normal) = material.normal_texture() {
        cpu.normal_scale = normal.scale();
    }
    if let Some(occlusion) = material.occlusion_texture() {
        cpu.occlusion_strength = occlusion.strength();
    }

    let slots = [
        (TextureSlot::BaseColour, pbr.base_color_texture().map(|t| t.texture())),
        (
            TextureSlot::MetallicRoughness,
            pbr.metallic_roughness_texture().map(|t| t.texture()),
        ),
        (TextureSlot::Emissive, material.emissive_texture().map(|t| t.texture())),
        (TextureSlot::Normal, material.normal_texture().map(|t| t.texture())),
        (TextureSlot::Occlusion, material.occlusion_texture().map(|t| t.texture())),
    ];
    for (slot, texture) in slots {
        let Some(texture) = texture else { continue };
        match images.get(&texture.source().index()) {
            Some((key, _)) => {
                cpu.textures.insert(slot, key.clone());
            }
            None => log::warn!("{}: {slot:?} texture is missing", cpu.name),
        }
    }
    cpu
}
