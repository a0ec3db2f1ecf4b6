mod common;

use std::{rc::Rc, time::Duration};

use cgmath::{Matrix4, SquareMatrix};

use bindless_renderer::{
    Renderer,
    gpu::{
        QueueKind, ResourceState,
        headless::{Completion, HeadlessBackend, HeadlessSurface},
    },
    pipelines::{geometry::SPIN_PERIOD, shader::WgslCompiler, ui::Panel},
    surface::PresentationSurface,
};

use crate::common::test_utils::{headless_renderer, init_logger, model_matrix_entry, test_config};

#[test]
fn frame_after_the_buffering_depth_blocks_exactly_once() {
    let (backend, mut renderer) = headless_renderer(Completion::OnWait, test_config(2));

    renderer.render().unwrap();
    renderer.render().unwrap();
    assert_eq!(backend.blocking_waits(QueueKind::Direct), 0);

    renderer.render().unwrap();
    assert_eq!(backend.blocking_waits(QueueKind::Direct), 1);
    assert_eq!(renderer.surface().presents(), 3);
}

#[test]
fn slots_remember_their_last_fence() {
    let (_backend, mut renderer) = headless_renderer(Completion::Immediate, test_config(3));
    for _ in 0..4 {
        renderer.render().unwrap();
    }
    let fences: Vec<u64> = renderer.slots().iter().map(|slot| slot.fence_value).collect();
    assert_eq!(fences, vec![4, 2, 3]);
    assert_eq!(renderer.frames_rendered(), 4);
}

#[test]
fn every_frame_clears_its_own_back_buffer() {
    let config = test_config(2);
    let clear_colour = config.clear_colour;
    let (backend, mut renderer) = headless_renderer(Completion::Immediate, config);
    renderer.render().unwrap();
    renderer.render().unwrap();

    let targets: Vec<_> = renderer.slots().iter().map(|slot| slot.target).collect();
    assert_eq!(
        backend.clears(),
        vec![(targets[0], clear_colour), (targets[1], clear_colour)]
    );
    for target in targets {
        assert_eq!(backend.resource_state(target), Some(ResourceState::Present));
    }
}

#[test]
fn geometry_pushes_world_transforms_per_mesh() {
    let (backend, mut renderer) = headless_renderer(Completion::Immediate, test_config(2));
    renderer.queue_model("hierarchy.gltf");
    renderer.load_queued_models_async();
    assert_eq!(renderer.load_models_gpu().unwrap(), 1);

    renderer.geometry_mut().set_spin(false);
    renderer.update(Duration::from_millis(16));
    renderer.render().unwrap();

    let draws = backend.draws();
    assert_eq!(draws.len(), 2);
    for draw in &draws {
        assert_eq!(draw.index_count, Some(3));
        assert_eq!(backend.pipeline_label(draw.pipeline).as_deref(), Some("Geometry Pipeline"));
        assert_eq!(draw.render_target, renderer.slots()[0].target);
    }

    // Depth first: "child" (translated by its parent) comes before "sibling".
    let child = &draws[0].constants;
    assert_eq!(model_matrix_entry(child, 3, 0), 1.0);
    assert_eq!(model_matrix_entry(child, 3, 1), 2.0);
    let sibling = &draws[1].constants;
    assert_eq!(model_matrix_entry(sibling, 3, 0), 1.0);
    assert_eq!(model_matrix_entry(sibling, 3, 1), 0.0);

    let model = &renderer.geometry().models().models()[0];
    let position_index = model.meshes[0].positions.srv.unwrap();
    assert_eq!(child[44], position_index);
}

#[test]
fn spin_clock_wraps_and_drives_the_model_transform() {
    let (_backend, mut renderer) = headless_renderer(Completion::Immediate, test_config(2));

    renderer.update(Duration::from_secs(3));
    renderer.update(Duration::from_secs(2));
    let clock = renderer.geometry().clock();
    assert!((clock - 1.0).abs() < 1e-4, "clock {clock}");
    assert!(clock < SPIN_PERIOD);

    // A quarter turn about (0, 1, 1) takes +x to (0, 1, -1) / sqrt(2).
    let transform = renderer.geometry().model_transform();
    let s = std::f32::consts::FRAC_1_SQRT_2;
    assert!(transform.x.x.abs() < 1e-5);
    assert!((transform.x.y - s).abs() < 1e-5);
    assert!((transform.x.z + s).abs() < 1e-5);
}

#[test]
fn models_spin_unless_turned_off() {
    let (_backend, mut renderer) = headless_renderer(Completion::Immediate, test_config(2));
    assert_eq!(renderer.geometry().model_transform(), Matrix4::identity());

    renderer.update(Duration::from_secs(1));
    assert_ne!(renderer.geometry().model_transform(), Matrix4::identity());

    renderer.geometry_mut().set_spin(false);
    assert_eq!(renderer.geometry().model_transform(), Matrix4::identity());
}

#[test]
fn ui_records_nothing_without_panels() {
    let (backend, mut renderer) = headless_renderer(Completion::Immediate, test_config(2));
    renderer.render().unwrap();
    assert!(backend.draws().is_empty());

    renderer.ui_mut().add_panel(Panel {
        x: 8.0,
        y: 8.0,
        width: 16.0,
        height: 8.0,
        colour: [0.0, 0.0, 0.0, 0.5],
        texture: None,
    });
    renderer.render().unwrap();

    let draws = backend.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].vertex_count, Some(6));
    assert_eq!(backend.pipeline_label(draws[0].pipeline).as_deref(), Some("UI Pipeline"));
    assert_eq!(f32::from_bits(draws[0].constants[7]), 0.5);
}

#[test]
fn tick_updates_and_renders() {
    let (_backend, mut renderer) = headless_renderer(Completion::Immediate, test_config(2));
    renderer.tick().unwrap();
    renderer.tick().unwrap();
    assert_eq!(renderer.frames_rendered(), 2);
    assert_eq!(renderer.surface().presents(), 2);
}

#[test]
fn dropping_the_renderer_drains_the_queues() {
    let (backend, mut renderer) = headless_renderer(Completion::OnWait, test_config(2));
    renderer.queue_model("two_quads.obj");
    renderer.load_queued_models_async();
    renderer.load_models_gpu().unwrap();
    renderer.render().unwrap();
    let last = renderer.context().direct_queue.last_fence_value();
    assert!(!renderer.context().direct_queue.is_fence_complete(last));

    drop(renderer);
    assert_eq!(backend.blocking_waits(QueueKind::Direct), 1);
    assert_eq!(backend.live_resources(), 0);
}

#[test]
fn surface_must_match_the_buffering_depth() {
    init_logger();
    let backend = Rc::new(HeadlessBackend::new(Completion::Immediate));
    let surface = HeadlessSurface::new(
        backend.clone(),
        3,
        64,
        48,
        wgpu::TextureFormat::Bgra8UnormSrgb,
    )
    .unwrap();
    assert_eq!(surface.back_buffer_count(), 3);
    assert!(Renderer::new(backend, surface, test_config(2), &WgslCompiler).is_err());
}
