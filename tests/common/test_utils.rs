#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use bindless_renderer::{
    Renderer, RendererConfig,
    context::Context,
    gpu::headless::{Completion, HeadlessBackend, HeadlessSurface},
    pipelines::shader::WgslCompiler,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fixture(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// A small-target config that loads models from the fixtures directory and
/// shaders from the crate's assets.
pub fn test_config(frame_count: u32) -> RendererConfig {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    RendererConfig {
        frame_count,
        width: 64,
        height: 48,
        asset_root: fixtures_dir(),
        geometry_shader: root.join("assets/shaders/geometry.wgsl"),
        ui_shader: root.join("assets/shaders/ui.wgsl"),
        ..RendererConfig::default()
    }
}

pub fn headless_context(completion: Completion) -> (Rc<HeadlessBackend>, Context) {
    init_logger();
    let backend = Rc::new(HeadlessBackend::new(completion));
    let ctx = Context::new(backend.clone(), &test_config(2)).expect("context");
    (backend, ctx)
}

pub fn headless_renderer(
    completion: Completion,
    config: RendererConfig,
) -> (Rc<HeadlessBackend>, Renderer<HeadlessSurface>) {
    init_logger();
    let backend = Rc::new(HeadlessBackend::new(completion));
    let surface = HeadlessSurface::new(
        backend.clone(),
        config.frame_count,
        config.width,
        config.height,
        wgpu::TextureFormat::Bgra8UnormSrgb,
    )
    .expect("surface");
    let renderer =
        Renderer::new(backend.clone(), surface, config, &WgslCompiler).expect("renderer");
    (backend, renderer)
}

/// Reads column `col`, row `row` of the model matrix at the start of a draw's
/// inline constants.
pub fn model_matrix_entry(constants: &[u32], col: usize, row: usize) -> f32 {
    f32::from_bits(constants[col * 4 + row])
}
