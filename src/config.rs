//! Renderer configuration.
//!
//! Build one with struct-update syntax over [`RendererConfig::default`]:
//!
//! ```
//! use bindless_renderer::config::RendererConfig;
//!
//! let config = RendererConfig {
//!     frame_count: 3,
//!     ..RendererConfig::default()
//! };
//! assert_eq!(config.render_target_heap_capacity(), 3);
//! ```

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Buffering depth: number of frame slots and back buffers. At least 1.
    pub frame_count: u32,
    pub width: u32,
    pub height: u32,
    pub clear_colour: wgpu::Color,
    pub resource_heap_capacity: u32,
    pub sampler_heap_capacity: u32,
    /// Defaults to one view per back buffer when `None`.
    pub render_target_heap_capacity: Option<u32>,
    pub depth_target_heap_capacity: u32,
    /// Relative model paths are resolved against this directory.
    pub asset_root: PathBuf,
    pub geometry_shader: PathBuf,
    pub ui_shader: PathBuf,
    pub field_of_view_degrees: f32,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_count: 2,
            width: 1280,
            height: 720,
            clear_colour: wgpu::Color {
                r: 1.0,
                g: 182.0 / 255.0,
                b: 193.0 / 255.0,
                a: 1.0,
            },
            resource_heap_capacity: 4096,
            sampler_heap_capacity: 16,
            render_target_heap_capacity: None,
            depth_target_heap_capacity: 1,
            asset_root: PathBuf::from("assets/models"),
            geometry_shader: PathBuf::from("assets/shaders/geometry.wgsl"),
            ui_shader: PathBuf::from("assets/shaders/ui.wgsl"),
            field_of_view_degrees: 45.0,
            near_plane: 0.1,
            far_plane: 1000.0,
        }
    }
}

impl RendererConfig {
    pub fn render_target_heap_capacity(&self) -> u32 {
        self.render_target_heap_capacity.unwrap_or(self.frame_count)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.frame_count >= 1, "frame_count must be at least 1");
        anyhow::ensure!(
            self.render_target_heap_capacity() >= self.frame_count,
            "the render target heap needs one view per frame slot"
        );
        anyhow::ensure!(
            self.depth_target_heap_capacity >= 1,
            "the depth target heap needs a slot for the depth buffer"
        );
        anyhow::ensure!(
            self.sampler_heap_capacity >= 1,
            "the sampler heap needs a slot for the default sampler"
        );
        Ok(())
    }
}
