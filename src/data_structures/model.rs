//! Uploaded models: meshes, materials, textures and the node tree that places
//! them.

use std::{collections::HashMap, path::PathBuf};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    context::Context,
    data_structures::{
        material::{Material, MaterialTextures, TextureSlot},
        mesh::Mesh,
        scene_graph::{NodeId, NodeTree},
        texture::TextureRegistry,
    },
    gpu::command::CommandList,
    pipelines::geometry::DrawConstants,
    resources::cpu::{ImageCpuData, ModelCpuData, NodeCpuData},
};

/// A model whose buffers and textures live on the device.
pub struct Model {
    pub source: PathBuf,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub textures: TextureRegistry,
    pub tree: NodeTree,
}

impl Model {
    /// Uploads `cpu` through the copy queue and blocks until the copy fence
    /// has passed, so the model is drawable as soon as this returns.
    ///
    /// Textures are uploaded once per key and materials once per name. Meshes
    /// without a material share one [`Material::default`], kept apart from the
    /// parsed names. A model that parsed to nothing still yields a `Model`,
    /// just one with no meshes.
    pub fn upload(ctx: &mut Context, mut cpu: ModelCpuData) -> anyhow::Result<Self> {
        let mut list = ctx.copy_queue.get_command_list();
        let mut textures = TextureRegistry::default();
        let mut materials = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        let mut material_indices = Vec::with_capacity(cpu.materials.len());
        for material in &cpu.materials {
            let index = match by_name.get(&material.name) {
                Some(&index) => index,
                None => {
                    let mut resolved = MaterialTextures::default();
                    for (&slot, key) in &material.textures {
                        resolved.set(
                            slot,
                            upload_image(ctx, &mut list, &mut textures, &cpu.images, slot, key)?,
                        );
                    }
                    materials.push(material.to_material(resolved));
                    by_name.insert(material.name.clone(), materials.len() - 1);
                    materials.len() - 1
                }
            };
            material_indices.push(index);
        }

        let mut fallback = None;
        let mut meshes = Vec::new();
        let mut mesh_indices = Vec::with_capacity(cpu.meshes.len());
        for data in &mut cpu.meshes {
            data.fill_missing_attributes();
            let material = match data.material.and_then(|i| material_indices.get(i)) {
                Some(&index) => index,
                None => *fallback.get_or_insert_with(|| {
                    materials.push(Material::default());
                    materials.len() - 1
                }),
            };
            let mesh = Mesh::upload(ctx, &mut list, data, material)?;
            mesh_indices.push(mesh.map(|mesh| {
                meshes.push(mesh);
                meshes.len() - 1
            }));
        }

        let mut tree = NodeTree::new(&cpu.root.name, Matrix4::from(cpu.root.transform));
        let root = tree.root();
        attach(&mut tree, root, &cpu.root, &mesh_indices, &meshes);

        if !list.is_empty() {
            let fence = ctx.copy_queue.execute(list)?;
            ctx.copy_queue.wait_for_fence_value(fence)?;
            // Upload lists carry every texel and vertex of the model.
            ctx.copy_queue.release_completed();
        }
        log::info!(
            "uploaded {}: {} meshes, {} materials, {} textures, {} nodes",
            cpu.source.display(),
            meshes.len(),
            materials.len(),
            textures.len(),
            tree.len()
        );
        Ok(Self {
            source: cpu.source,
            meshes,
            materials,
            textures,
            tree,
        })
    }

    /// Records one indexed draw per mesh-bearing node, depth first.
    ///
    /// `model_transform` is applied after every node's world transform. The
    /// caller has already bound the pipeline and render targets.
    pub fn draw(&self, list: &mut CommandList, view_proj: Matrix4<f32>, model_transform: Matrix4<f32>) {
        for id in self.tree.depth_first() {
            let node = self.tree.node(id);
            let Some(mesh) = node.mesh.and_then(|i| self.meshes.get(i)) else {
                continue;
            };
            let material = &self.materials[mesh.material];
            let world = model_transform * self.tree.world_transform(id);
            list.set_inline_constants(&DrawConstants::new(world, view_proj, mesh, material));
            list.set_index_buffer(mesh.indices.resource(), wgpu::IndexFormat::Uint32);
            list.draw_indexed(mesh.index_count);
        }
    }

    /// Number of draws [`draw`](Self::draw) records.
    pub fn draw_count(&self) -> usize {
        self.tree
            .depth_first()
            .filter(|&id| self.tree.node(id).mesh.is_some())
            .count()
    }
}

fn upload_image(
    ctx: &mut Context,
    list: &mut CommandList,
    textures: &mut TextureRegistry,
    images: &HashMap<String, ImageCpuData>,
    slot: TextureSlot,
    key: &str,
) -> anyhow::Result<Option<u32>> {
    match images.get(key) {
        Some(image) => Ok(Some(textures.get_or_upload(ctx, list, key, image)?)),
        None => {
            log::warn!("{slot:?} texture {key} was not decoded, leaving the slot empty");
            Ok(None)
        }
    }
}

/// Adds `cpu`'s meshes to `id` and its children below it. A node listing
/// several meshes keeps the first and gets one identity child per extra mesh.
fn attach(
    tree: &mut NodeTree,
    id: NodeId,
    cpu: &NodeCpuData,
    mesh_indices: &[Option<usize>],
    meshes: &[Mesh],
) {
    let uploaded: Vec<usize> = cpu
        .meshes
        .iter()
        .filter_map(|&i| mesh_indices.get(i).copied().flatten())
        .collect();
    for (n, &mesh) in uploaded.iter().enumerate() {
        let target = if n == 0 {
            id
        } else {
            tree.add_child(id, &format!("{}#{n}", cpu.name), Matrix4::identity())
        };
        let node = tree.node_mut(target);
        node.mesh = Some(mesh);
        node.material = Some(meshes[mesh].material);
    }
    for child in &cpu.children {
        let child_id = tree.add_child(id, &child.name, Matrix4::from(child.transform));
        attach(tree, child_id, child, mesh_indices, meshes);
    }
}
