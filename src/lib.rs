//! bindless-renderer
//!
//! A bindless real-time 3D rendering core. Shaders reach every buffer,
//! texture and sampler through integer indices into shader-visible descriptor
//! heaps, carried in small per-draw inline constant blocks. Frames are
//! buffered and fenced so the CPU records ahead of the GPU without ever
//! touching a target the GPU may still be reading, and models load in two
//! phases: parsed on worker threads, uploaded on the device thread.
//!
//! High-level modules
//! - `gpu`: the device seam, descriptor heaps, command lists and queues,
//!   with a wgpu backend and a headless one
//! - `context`: owns the backend, both queues and the descriptor heaps
//! - `data_structures`: buffers, textures, meshes, materials, node trees, models
//! - `resources`: model parsing and the two-phase model manager
//! - `pipelines`: the geometry and UI pipelines and shader compilation
//! - `renderer`: the frame loop
//! - `camera`, `config`, `surface`, `error`: supporting types
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod gpu;
pub mod pipelines;
pub mod renderer;
pub mod resources;
pub mod surface;

pub use config::RendererConfig;
pub use error::RenderError;
pub use renderer::Renderer;

/// Installs `env_logger` as the `log` sink, configured through `RUST_LOG`.
///
/// Installing twice is harmless; the second attempt only prints a warning.
pub fn init_logger() {
    if let Err(e) = env_logger::try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }
}
