//! The CPU intermediate form of a parsed model.
//!
//! Parsers produce a [`ModelCpuData`] on a worker thread; the uploader
//! consumes it on the device thread. It holds plain values only, no GPU
//! handles, so it can cross threads freely.

use std::{collections::HashMap, path::PathBuf};

use crate::data_structures::material::{Material, MaterialTextures, TextureSlot};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshCpuData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// Index into [`ModelCpuData::materials`].
    pub material: Option<usize>,
}

impl MeshCpuData {
    /// Zero-fills absent normal and uv streams and generates a sequential
    /// index list for non-indexed geometry.
    pub fn fill_missing_attributes(&mut self) {
        let count = self.positions.len();
        if self.normals.len() != count {
            if !self.normals.is_empty() {
                log::warn!(
                    "{}: {} normals for {count} positions, ignoring them",
                    self.name,
                    self.normals.len()
                );
            } else if count > 0 {
                log::warn!("{} has no normals, using zeroes", self.name);
            }
            self.normals = vec![[0.0; 3]; count];
        }
        if self.uvs.len() != count {
            if !self.uvs.is_empty() {
                log::warn!(
                    "{}: {} uvs for {count} positions, ignoring them",
                    self.name,
                    self.uvs.len()
                );
            } else if count > 0 {
                log::warn!("{} has no uvs, using zeroes", self.name);
            }
            self.uvs = vec![[0.0; 2]; count];
        }
        if self.indices.is_empty() && count > 0 {
            self.indices = (0..count as u32).collect();
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialCpuData {
    /// Materials with the same name are the same material.
    pub name: String,
    pub base_colour: [f32; 4],
    pub emissive: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub unlit: bool,
    pub receive_shadows: bool,
    /// Image keys into [`ModelCpuData::images`].
    pub textures: HashMap<TextureSlot, String>,
}

impl Default for MaterialCpuData {
    fn default() -> Self {
        let defaults = Material::default();
        Self {
            name: defaults.name,
            base_colour: defaults.base_colour,
            emissive: defaults.emissive,
            metallic: defaults.metallic,
            roughness: defaults.roughness,
            normal_scale: defaults.normal_scale,
            occlusion_strength: defaults.occlusion_strength,
            unlit: defaults.unlit,
            receive_shadows: defaults.receive_shadows,
            textures: HashMap::new(),
        }
    }
}

impl MaterialCpuData {
    /// The material factors with the given resolved texture indices.
    pub fn to_material(&self, textures: MaterialTextures) -> Material {
        Material {
            name: self.name.clone(),
            base_colour: self.base_colour,
            emissive: self.emissive,
            metallic: self.metallic,
            roughness: self.roughness,
            normal_scale: self.normal_scale,
            occlusion_strength: self.occlusion_strength,
            unlit: self.unlit,
            receive_shadows: self.receive_shadows,
            textures,
        }
    }
}

/// Decoded 8-bit RGBA pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageCpuData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeCpuData {
    pub name: String,
    /// Column-major local transform.
    pub transform: [[f32; 4]; 4],
    /// Indices into [`ModelCpuData::meshes`].
    pub meshes: Vec<usize>,
    pub children: Vec<NodeCpuData>,
}

impl Default for NodeCpuData {
    fn default() -> Self {
        Self {
            name: String::from("root"),
            transform: IDENTITY,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

pub const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelCpuData {
    pub source: PathBuf,
    pub meshes: Vec<MeshCpuData>,
    pub materials: Vec<MaterialCpuData>,
    pub root: NodeCpuData,
    pub images: HashMap<String, ImageCpuData>,
}

impl ModelCpuData {
    /// The form substituted for a model that could not be parsed.
    pub fn empty(source: PathBuf) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_streams_are_zero_filled() {
        let mut mesh = MeshCpuData {
            name: "tri".into(),
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            ..Default::default()
        };
        mesh.fill_missing_attributes();
        assert_eq!(mesh.normals, vec![[0.0; 3]; 3]);
        assert_eq!(mesh.uvs, vec![[0.0; 2]; 3]);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }
}
