mod common;

use std::{path::Path, sync::Arc};

use bindless_renderer::{
    data_structures::{material::TextureSlot, model::Model},
    gpu::{QueueKind, headless::Completion},
    resources::{
        cpu::{MaterialCpuData, MeshCpuData, ModelCpuData},
        model_manager::ModelManager,
        parser::ModelParser,
    },
};

use crate::common::test_utils::{fixtures_dir, headless_context};

fn find_node(model: &Model, name: &str) -> bindless_renderer::data_structures::scene_graph::NodeId {
    model
        .tree
        .depth_first()
        .find(|&id| model.tree.node(id).name == name)
        .unwrap_or_else(|| panic!("no node named {name}"))
}

#[test]
fn queueing_does_no_io_until_parsing_starts() {
    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("does_not_exist.obj");
    assert_eq!(manager.queued(), &[fixtures_dir().join("does_not_exist.obj")]);
    assert_eq!(manager.pending(), 0);

    manager.load_queued_models_async();
    assert!(manager.queued().is_empty());
    assert_eq!(manager.pending(), 1);
}

#[test]
fn obj_materials_share_one_texture() {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("two_quads.obj");
    manager.load_queued_models_async();
    assert_eq!(manager.load_models_gpu(&mut ctx).unwrap(), 1);

    let model = &manager.models()[0];
    assert_eq!(model.meshes.len(), 2);
    assert!(model.meshes.iter().all(|mesh| mesh.index_count == 6));
    assert_eq!(model.materials.len(), 2);
    assert_eq!(model.textures.len(), 1);

    let red = &model.materials[0];
    let blue = &model.materials[1];
    assert_eq!(red.name, "red");
    assert_eq!(blue.base_colour, [0.0, 0.0, 1.0, 0.5]);
    let shared = red.textures.get(TextureSlot::BaseColour);
    assert!(shared.is_some());
    assert_eq!(blue.textures.get(TextureSlot::BaseColour), shared);
}

#[test]
fn gltf_hierarchy_keeps_transforms_and_dedups_images() {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("hierarchy.gltf");
    manager.load_queued_models_async();
    manager.load_models_gpu(&mut ctx).unwrap();

    let model = &manager.models()[0];
    assert_eq!(model.meshes.len(), 2);
    assert_eq!(model.textures.len(), 1);
    assert_eq!(model.tree.len(), 4);
    assert_eq!(model.draw_count(), 2);

    let checker = &model.materials[0];
    assert_eq!(checker.metallic, 0.25);
    assert_eq!(checker.roughness, 0.75);
    let emissive = &model.materials[1];
    assert_eq!(emissive.emissive, [0.1, 0.2, 0.3]);
    let texture = checker.textures.get(TextureSlot::BaseColour);
    assert!(texture.is_some());
    assert_eq!(emissive.textures.get(TextureSlot::BaseColour), texture);
    assert_eq!(emissive.textures.get(TextureSlot::Emissive), texture);

    let child = find_node(model, "child");
    let world = model.tree.world_transform(child);
    assert_eq!((world.w.x, world.w.y, world.w.z), (1.0, 2.0, 0.0));
    let parent = find_node(model, "parent");
    assert_eq!(model.tree.node(child).parent(), Some(parent));
    assert_eq!(model.tree.node(parent).parent(), Some(model.tree.root()));
}

#[test]
fn failed_parses_yield_empty_models_without_stopping_the_batch() {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("broken.gltf");
    manager.queue_model("missing.obj");
    manager.queue_model("two_quads.obj");
    manager.load_queued_models_async();
    assert_eq!(manager.load_models_gpu(&mut ctx).unwrap(), 3);

    let models = manager.models();
    assert!(models[0].meshes.is_empty());
    assert!(models[1].meshes.is_empty());
    assert_eq!(models[1].tree.len(), 1);
    assert_eq!(models[2].meshes.len(), 2);
}

#[test]
fn a_missing_texture_leaves_its_slot_empty() {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("missing_texture.obj");
    manager.load_queued_models_async();
    assert_eq!(manager.load_models_gpu(&mut ctx).unwrap(), 1);

    let model = &manager.models()[0];
    assert_eq!(model.meshes.len(), 1);
    assert!(model.textures.is_empty());
    let material = &model.materials[model.meshes[0].material];
    assert_eq!(material.name, "faded");
    assert_eq!(material.base_colour, [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(material.flags() & TextureSlot::BaseColour.flag(), 0);
    assert_eq!(material.texture_index(TextureSlot::BaseColour), 0);
}

#[test]
fn two_models_load_end_to_end() {
    let (backend, mut ctx) = headless_context(Completion::OnWait);
    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("two_quads.obj");
    manager.queue_model("hierarchy.gltf");
    manager.load_queued_models_async();
    assert_eq!(manager.load_models_gpu(&mut ctx).unwrap(), 2);

    assert_eq!(manager.models().len(), 2);
    for model in manager.models() {
        assert!(!model.tree.is_empty());
        assert!(!model.meshes.is_empty());
        assert!(model.meshes.iter().all(|mesh| mesh.index_count > 0));
    }

    // Every upload was fenced before returning.
    let copy = &ctx.copy_queue;
    assert!(copy.is_fence_complete(copy.last_fence_value()));
    assert_eq!(backend.blocking_waits(QueueKind::Copy), 2);
    // Upload payloads are not kept once their fence has passed.
    assert_eq!(copy.in_flight(), 0);
}

#[test]
fn missing_attributes_are_zero_filled() {
    let (backend, mut ctx) = headless_context(Completion::Immediate);
    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("bare_triangle.obj");
    manager.load_queued_models_async();
    manager.load_models_gpu(&mut ctx).unwrap();

    let model = &manager.models()[0];
    let mesh = &model.meshes[0];
    assert_eq!(mesh.index_count, 3);
    assert_eq!(model.materials[mesh.material].name, "default");

    let normals = backend.resource_contents(mesh.normals.resource()).unwrap();
    assert_eq!(normals.len(), 3 * 12);
    assert!(normals.iter().all(|&b| b == 0));
    let positions = backend.resource_contents(mesh.positions.resource()).unwrap();
    let floats: Vec<f32> = positions
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(floats, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
}

struct PanickingParser;

impl ModelParser for PanickingParser {
    fn parse(&self, path: &Path) -> anyhow::Result<ModelCpuData> {
        if path.ends_with("boom.obj") {
            panic!("parser crashed on {}", path.display());
        }
        let mut model = ModelCpuData::empty(path.to_path_buf());
        model.meshes.push(MeshCpuData {
            name: "tri".into(),
            positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            ..Default::default()
        });
        model.root.meshes.push(0);
        Ok(model)
    }
}

fn triangle(name: &str, material: Option<usize>) -> MeshCpuData {
    MeshCpuData {
        name: name.into(),
        positions: vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        material,
        ..Default::default()
    }
}

/// Hands back a fixed model regardless of the path.
struct FixedParser(ModelCpuData);

impl ModelParser for FixedParser {
    fn parse(&self, path: &Path) -> anyhow::Result<ModelCpuData> {
        Ok(ModelCpuData {
            source: path.to_path_buf(),
            ..self.0.clone()
        })
    }
}

fn with_fixed_model(cpu: ModelCpuData, check: impl FnOnce(&Model)) {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut manager = ModelManager::with_parser(fixtures_dir(), Arc::new(FixedParser(cpu))).unwrap();
    manager.queue_model("fixed.obj");
    manager.load_queued_models_async();
    assert_eq!(manager.load_models_gpu(&mut ctx).unwrap(), 1);
    check(&manager.models()[0]);
}

#[test]
fn materials_with_the_same_name_are_uploaded_once() {
    let mut cpu = ModelCpuData::default();
    for _ in 0..2 {
        cpu.materials.push(MaterialCpuData {
            name: "stone".into(),
            roughness: 0.5,
            ..Default::default()
        });
    }
    cpu.meshes = vec![triangle("a", Some(0)), triangle("b", Some(1))];
    cpu.root.meshes = vec![0, 1];

    with_fixed_model(cpu, |model| {
        assert_eq!(model.materials.len(), 1);
        assert_eq!(model.meshes[0].material, model.meshes[1].material);
        assert_eq!(model.materials[model.meshes[0].material].roughness, 0.5);
    });
}

#[test]
fn unassigned_meshes_ignore_a_parsed_material_named_default() {
    let mut cpu = ModelCpuData::default();
    cpu.materials.push(MaterialCpuData {
        name: "default".into(),
        base_colour: [1.0, 0.0, 0.0, 1.0],
        ..Default::default()
    });
    cpu.meshes = vec![triangle("painted", Some(0)), triangle("bare", None), triangle("bare2", None)];
    cpu.root.meshes = vec![0, 1, 2];

    with_fixed_model(cpu, |model| {
        assert_eq!(model.materials.len(), 2);
        let painted = &model.materials[model.meshes[0].material];
        assert_eq!(painted.base_colour, [1.0, 0.0, 0.0, 1.0]);
        let bare = &model.materials[model.meshes[1].material];
        assert_eq!(bare.base_colour, [1.0; 4]);
        assert_ne!(model.meshes[0].material, model.meshes[1].material);
        assert_eq!(model.meshes[1].material, model.meshes[2].material);
    });
}

#[test]
fn a_panicking_parse_task_yields_an_empty_model() {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut manager = ModelManager::with_parser(fixtures_dir(), Arc::new(PanickingParser)).unwrap();
    manager.queue_model("boom.obj");
    manager.queue_model("fine.obj");
    manager.load_queued_models_async();
    assert_eq!(manager.load_models_gpu(&mut ctx).unwrap(), 2);

    assert!(manager.models()[0].meshes.is_empty());
    let fine = &manager.models()[1];
    assert_eq!(fine.meshes.len(), 1);
    assert_eq!(fine.meshes[0].index_count, 3);
    assert_eq!(fine.tree.node(fine.tree.root()).mesh, Some(0));
}
