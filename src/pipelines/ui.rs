//! The UI overlay pipeline.
//!
//! Draws screen-space panels after the scene: alpha-blended, no depth, one
//! six-vertex quad per panel whose corners the vertex shader derives from
//! `vertex_index` and the panel's inline constants.

use std::time::Duration;

use bytemuck::{Pod, Zeroable};

use crate::{
    camera::{Camera, Projection},
    config::RendererConfig,
    context::Context,
    gpu::{PipelineId, PipelineStateDesc, ShaderStage, command::CommandList},
    pipelines::{Pipeline, shader::ShaderCompiler},
};

/// A rectangle in pixels, origin at the top left of the target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Panel {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub colour: [f32; 4],
    /// Shader-resource index of a texture multiplied into the colour.
    pub texture: Option<u32>,
}

pub const PANEL_TEXTURED: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PanelConstants {
    /// Left, top, right, bottom in clip space.
    pub rect: [f32; 4],
    pub colour: [f32; 4],
    pub texture: u32,
    pub flags: u32,
    pub _padding: [u32; 2],
}

impl PanelConstants {
    pub fn new(panel: &Panel, screen: (u32, u32)) -> Self {
        let (w, h) = (screen.0.max(1) as f32, screen.1.max(1) as f32);
        let to_x = |px: f32| px / w * 2.0 - 1.0;
        let to_y = |py: f32| 1.0 - py / h * 2.0;
        Self {
            rect: [
                to_x(panel.x),
                to_y(panel.y),
                to_x(panel.x + panel.width),
                to_y(panel.y + panel.height),
            ],
            colour: panel.colour,
            texture: panel.texture.unwrap_or(0),
            flags: if panel.texture.is_some() { PANEL_TEXTURED } else { 0 },
            _padding: [0; 2],
        }
    }
}

pub struct UiPipeline {
    state: PipelineId,
    panels: Vec<Panel>,
    screen: (u32, u32),
}

impl UiPipeline {
    pub fn new(
        ctx: &Context,
        compiler: &dyn ShaderCompiler,
        config: &RendererConfig,
        color_format: wgpu::TextureFormat,
    ) -> anyhow::Result<Self> {
        let vertex = compiler.compile(ShaderStage::Vertex, &config.ui_shader, "vs_main")?;
        let pixel = compiler.compile(ShaderStage::Pixel, &config.ui_shader, "fs_main")?;
        let state = ctx.backend().create_pipeline_state(&PipelineStateDesc {
            label: "UI Pipeline",
            vertex: &vertex,
            pixel: &pixel,
            color_format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            depth: None,
            cull_mode: None,
        })?;
        log::info!("created UI pipeline from {}", config.ui_shader.display());
        Ok(Self {
            state,
            panels: Vec::new(),
            screen: (config.width, config.height),
        })
    }

    pub fn add_panel(&mut self, panel: Panel) {
        self.panels.push(panel);
    }

    pub fn clear_panels(&mut self) {
        self.panels.clear();
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.screen = (width, height);
    }

    pub fn state(&self) -> PipelineId {
        self.state
    }
}

impl Pipeline for UiPipeline {
    fn label(&self) -> &str {
        "ui"
    }

    fn update(&mut self, _dt: Duration, _camera: &Camera, _projection: &Projection) {}

    fn populate_command_list(&self, list: &mut CommandList) {
        if self.panels.is_empty() {
            return;
        }
        list.set_pipeline_state(self.state);
        for panel in &self.panels {
            list.set_inline_constants(&PanelConstants::new(panel, self.screen));
            list.draw(6);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_screen_panel_covers_clip_space() {
        let panel = Panel {
            x: 0.0,
            y: 0.0,
            width: 800.0,
            height: 600.0,
            colour: [1.0; 4],
            texture: None,
        };
        let constants = PanelConstants::new(&panel, (800, 600));
        assert_eq!(constants.rect, [-1.0, 1.0, 1.0, -1.0]);
        assert_eq!(constants.flags, 0);
    }
}
