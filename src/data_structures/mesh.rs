//! Indexed triangle meshes stored as one GPU buffer per attribute.

use crate::{
    context::Context,
    data_structures::buffer::Buffer,
    gpu::command::CommandList,
    resources::cpu::MeshCpuData,
};

/// A mesh whose attributes live in separate structured buffers.
///
/// Shaders pull vertices by index from the position, normal and uv buffers
/// through their shader-resource descriptors.
pub struct Mesh {
    pub name: String,
    pub positions: Buffer,
    pub normals: Buffer,
    pub uvs: Buffer,
    pub indices: Buffer,
    pub index_count: u32,
    /// Index into the owning model's material list.
    pub material: usize,
}

impl Mesh {
    /// Creates the attribute buffers and records their uploads on `list`.
    ///
    /// Returns `None` for meshes without geometry.
    pub fn upload(
        ctx: &mut Context,
        list: &mut CommandList,
        data: &MeshCpuData,
        material: usize,
    ) -> anyhow::Result<Option<Self>> {
        if data.positions.is_empty() || data.indices.is_empty() {
            log::warn!("mesh {} has no geometry and is skipped", data.name);
            return Ok(None);
        }
        let label = |attribute: &str| format!("{} {attribute}", data.name);
        Ok(Some(Self {
            name: data.name.clone(),
            positions: Buffer::structured(ctx, list, &label("positions"), &data.positions)?,
            normals: Buffer::structured(ctx, list, &label("normals"), &data.normals)?,
            uvs: Buffer::structured(ctx, list, &label("uvs"), &data.uvs)?,
            indices: Buffer::index(ctx, list, &label("indices"), &data.indices)?,
            index_count: data.indices.len() as u32,
            material,
        }))
    }

    /// Shader-resource indices of the position, normal and uv buffers.
    pub fn attribute_indices(&self) -> [u32; 3] {
        [
            self.positions.srv.unwrap_or(0),
            self.normals.srv.unwrap_or(0),
            self.uvs.srv.unwrap_or(0),
        ]
    }
}
