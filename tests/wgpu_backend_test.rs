#![cfg(feature = "integration-tests")]

mod common;

use std::rc::Rc;

use bindless_renderer::{
    context::Context,
    gpu::{QueueKind, wgpu_backend::WgpuBackend},
    resources::model_manager::ModelManager,
};

use crate::common::test_utils::{fixtures_dir, init_logger, test_config};

#[test]
fn models_upload_and_fence_on_a_real_device() {
    init_logger();
    let config = test_config(2);
    let instance = wgpu::Instance::default();
    let (_adapter, backend) =
        pollster::block_on(WgpuBackend::request(&instance, None, &config)).expect("device");
    let mut ctx = Context::new(Rc::new(backend), &config).unwrap();

    let mut manager = ModelManager::new(fixtures_dir()).unwrap();
    manager.queue_model("two_quads.obj");
    manager.queue_model("hierarchy.gltf");
    manager.load_queued_models_async();
    assert_eq!(manager.load_models_gpu(&mut ctx).unwrap(), 2);

    let copy = ctx.queue(QueueKind::Copy);
    assert!(copy.is_fence_complete(copy.last_fence_value()));
    manager.clear(&ctx).unwrap();
    assert!(manager.models().is_empty());
}

#[test]
fn empty_frames_complete_in_order() {
    init_logger();
    let config = test_config(2);
    let instance = wgpu::Instance::default();
    let (_adapter, backend) =
        pollster::block_on(WgpuBackend::request(&instance, None, &config)).expect("device");
    let mut ctx = Context::new(Rc::new(backend), &config).unwrap();

    let mut last = 0;
    for _ in 0..3 {
        let list = ctx.direct_queue.get_command_list();
        let value = ctx.direct_queue.execute(list).unwrap();
        assert!(value > last);
        last = value;
    }
    ctx.flush().unwrap();
    assert!(ctx.direct_queue.is_fence_complete(last));
}
