//! The geometry pipeline: opaque, depth-tested drawing of loaded models.

use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use cgmath::{Deg, InnerSpace, Matrix4, SquareMatrix, Vector3};

use crate::{
    camera::{Camera, Projection, view_projection},
    config::RendererConfig,
    context::Context,
    data_structures::{
        material::{Material, TextureSlot},
        mesh::Mesh,
        texture::Texture,
    },
    gpu::{DepthState, PipelineId, PipelineStateDesc, ShaderStage, command::CommandList},
    pipelines::{Pipeline, shader::ShaderCompiler},
    resources::model_manager::ModelManager,
};

/// Seconds after which the spin clock wraps.
pub const SPIN_PERIOD: f32 = 4.0;

/// Inline constants pushed before every mesh draw. Matches `DrawConstants` in
/// `geometry.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawConstants {
    pub model: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub base_colour: [f32; 4],
    pub emissive: [f32; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub flags: u32,
    pub position_buffer: u32,
    pub normal_buffer: u32,
    pub uv_buffer: u32,
    pub base_colour_texture: u32,
    pub metallic_roughness_texture: u32,
    pub emissive_texture: u32,
    pub normal_texture: u32,
    pub occlusion_texture: u32,
}

impl DrawConstants {
    pub fn new(model: Matrix4<f32>, view_proj: Matrix4<f32>, mesh: &Mesh, material: &Material) -> Self {
        let [position_buffer, normal_buffer, uv_buffer] = mesh.attribute_indices();
        Self {
            model: model.into(),
            view_proj: view_proj.into(),
            base_colour: material.base_colour,
            emissive: material.emissive,
            metallic: material.metallic,
            roughness: material.roughness,
            normal_scale: material.normal_scale,
            occlusion_strength: material.occlusion_strength,
            flags: material.flags(),
            position_buffer,
            normal_buffer,
            uv_buffer,
            base_colour_texture: material.texture_index(TextureSlot::BaseColour),
            metallic_roughness_texture: material.texture_index(TextureSlot::MetallicRoughness),
            emissive_texture: material.texture_index(TextureSlot::Emissive),
            normal_texture: material.texture_index(TextureSlot::Normal),
            occlusion_texture: material.texture_index(TextureSlot::Occlusion),
        }
    }
}

/// Draws every model of its [`ModelManager`], one indexed draw per mesh node.
pub struct GeometryPipeline {
    state: PipelineId,
    models: ModelManager,
    /// Seconds into the current spin period.
    clock: f32,
    spin: bool,
    view_proj: Matrix4<f32>,
}

impl GeometryPipeline {
    pub fn new(
        ctx: &Context,
        compiler: &dyn ShaderCompiler,
        config: &RendererConfig,
        color_format: wgpu::TextureFormat,
    ) -> anyhow::Result<Self> {
        let vertex = compiler.compile(ShaderStage::Vertex, &config.geometry_shader, "vs_main")?;
        let pixel = compiler.compile(ShaderStage::Pixel, &config.geometry_shader, "fs_main")?;
        let state = ctx.backend().create_pipeline_state(&PipelineStateDesc {
            label: "Geometry Pipeline",
            vertex: &vertex,
            pixel: &pixel,
            color_format,
            blend: Some(wgpu::BlendState::REPLACE),
            depth: Some(DepthState {
                format: Texture::DEPTH_FORMAT,
                write: true,
                compare: wgpu::CompareFunction::Less,
            }),
            cull_mode: Some(wgpu::Face::Back),
        })?;
        log::info!("created geometry pipeline from {}", config.geometry_shader.display());
        Ok(Self {
            state,
            models: ModelManager::new(&config.asset_root)?,
            clock: 0.0,
            spin: true,
            view_proj: Matrix4::identity(),
        })
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelManager {
        &mut self.models
    }

    pub fn set_spin(&mut self, spin: bool) {
        self.spin = spin;
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    pub fn state(&self) -> PipelineId {
        self.state
    }

    /// Applied to every model root: a rotation of `clock * 90deg` about
    /// (0, 1, 1) while spinning, identity otherwise.
    pub fn model_transform(&self) -> Matrix4<f32> {
        if self.spin {
            Matrix4::from_axis_angle(Vector3::new(0.0, 1.0, 1.0).normalize(), Deg(self.clock * 90.0))
        } else {
            Matrix4::identity()
        }
    }
}

impl Pipeline for GeometryPipeline {
    fn label(&self) -> &str {
        "geometry"
    }

    fn update(&mut self, dt: Duration, camera: &Camera, projection: &Projection) {
        self.clock = (self.clock + dt.as_secs_f32()) % SPIN_PERIOD;
        self.view_proj = view_projection(camera, projection).into();
    }

    fn populate_command_list(&self, list: &mut CommandList) {
        list.set_pipeline_state(self.state);
        self.models
            .draw_models(list, self.view_proj, self.model_transform());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_constants_fit_the_inline_block() {
        let words = std::mem::size_of::<DrawConstants>() / 4;
        assert_eq!(words, 52);
        assert!(words <= crate::gpu::MAX_INLINE_CONSTANTS);
    }
}
