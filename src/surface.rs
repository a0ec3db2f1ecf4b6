//! The presentation surface the renderer draws into.
//!
//! Windowing and resize handling live outside this crate. A surface only has
//! to expose a fixed chain of back buffers, say which one is current, and
//! present it.

use crate::gpu::ResourceId;

pub trait PresentationSurface {
    fn back_buffer_count(&self) -> u32;

    /// The resource backing back buffer `index`. Stable for the surface's lifetime.
    fn back_buffer(&self, index: u32) -> ResourceId;

    fn current_back_buffer_index(&self) -> u32;

    fn format(&self) -> wgpu::TextureFormat;

    fn size(&self) -> (u32, u32);

    /// Makes the current back buffer available for rendering and returns its index.
    fn acquire(&mut self) -> anyhow::Result<u32>;

    /// Presents the current back buffer and moves on to the next one.
    fn present(&mut self) -> anyhow::Result<()>;
}
