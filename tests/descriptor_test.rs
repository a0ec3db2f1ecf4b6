mod common;

use bindless_renderer::{
    RenderError,
    context::Context,
    data_structures::{buffer::Buffer, texture::Texture},
    gpu::{
        descriptor::{HeapKind, SamplerDesc, ShaderResourceViewDesc, ViewDesc},
        headless::{Completion, HeadlessBackend},
    },
    resources::cpu::ImageCpuData,
};
use std::rc::Rc;

use crate::common::test_utils::{headless_context, init_logger, test_config};

#[test]
fn interleaved_allocations_are_strictly_increasing() {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut list = ctx.copy_queue.get_command_list();

    let positions = Buffer::structured(&mut ctx, &mut list, "positions", &[[0.0f32; 3]; 3]).unwrap();
    let image = ImageCpuData {
        width: 1,
        height: 1,
        rgba: vec![255; 4],
    };
    let texture =
        Texture::from_rgba(&mut ctx, &mut list, "texture", 1, 1, &image.rgba).unwrap();
    let normals = Buffer::structured(&mut ctx, &mut list, "normals", &[[0.0f32; 3]; 3]).unwrap();
    let uvs = Buffer::structured(&mut ctx, &mut list, "uvs", &[[0.0f32; 2]; 3]).unwrap();

    let indices = [
        positions.srv.unwrap(),
        texture.srv.unwrap(),
        normals.srv.unwrap(),
        uvs.srv.unwrap(),
    ];
    assert_eq!(indices, [0, 1, 2, 3]);
    assert!(indices.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn descriptors_are_written_for_their_resource() {
    let (backend, mut ctx) = headless_context(Completion::Immediate);
    let mut list = ctx.copy_queue.get_command_list();
    let buffer = Buffer::structured(&mut ctx, &mut list, "data", &[1u32, 2, 3, 4]).unwrap();

    let (view, resource) = backend
        .descriptor(HeapKind::ShaderResource, buffer.srv.unwrap())
        .unwrap();
    assert_eq!(resource, Some(buffer.resource()));
    assert_eq!(
        view,
        ViewDesc::ShaderResource(ShaderResourceViewDesc::StructuredBuffer {
            first_element: 0,
            num_elements: 4,
            stride: 4,
        })
    );
}

#[test]
fn default_sampler_occupies_slot_zero() {
    let (backend, ctx) = headless_context(Completion::Immediate);
    assert_eq!(ctx.heap(HeapKind::Sampler).allocator().allocated(), 1);
    let (view, resource) = backend.descriptor(HeapKind::Sampler, 0).unwrap();
    assert_eq!(view, ViewDesc::Sampler(SamplerDesc::default()));
    assert_eq!(resource, None);
}

#[test]
fn handles_pair_cpu_and_gpu_addresses() {
    let (_backend, mut ctx) = headless_context(Completion::Immediate);
    let mut list = ctx.copy_queue.get_command_list();
    let a = Buffer::structured(&mut ctx, &mut list, "a", &[0u32]).unwrap();
    let b = Buffer::structured(&mut ctx, &mut list, "b", &[0u32]).unwrap();

    let heap = ctx.heap(HeapKind::ShaderResource);
    let first = heap.handle_at(a.srv.unwrap()).unwrap();
    let second = heap.handle_at(b.srv.unwrap()).unwrap();
    assert!(second.cpu.0 > first.cpu.0);
    assert!(first.gpu.is_some());
}

#[test]
fn exhausting_a_heap_is_a_fatal_error() {
    init_logger();
    let backend = Rc::new(HeadlessBackend::new(Completion::Immediate));
    let config = bindless_renderer::RendererConfig {
        resource_heap_capacity: 2,
        ..test_config(2)
    };
    let mut ctx = Context::new(backend, &config).unwrap();
    let mut list = ctx.copy_queue.get_command_list();

    let _a = Buffer::structured(&mut ctx, &mut list, "a", &[0u32]).unwrap();
    let _b = Buffer::structured(&mut ctx, &mut list, "b", &[0u32]).unwrap();
    let err = match Buffer::structured(&mut ctx, &mut list, "c", &[0u32]) {
        Ok(_) => panic!("third descriptor fit into a heap of two"),
        Err(e) => e,
    };
    match err.downcast_ref::<RenderError>() {
        Some(RenderError::HeapExhausted { kind, capacity }) => {
            assert_eq!(*kind, HeapKind::ShaderResource);
            assert_eq!(*capacity, 2);
        }
        other => panic!("unexpected error {other:?}"),
    }
}
