//! Render pipelines: units that own a shading configuration and record draws
//! against the bindless layout.
//!
//! # Key types
//! - [`Pipeline`]: the per-frame contract the renderer drives
//! - [`shader::ShaderCompiler`]: turns a source file and entry point into a blob
//! - [`geometry::GeometryPipeline`]: draws loaded models
//! - [`ui::UiPipeline`]: draws screen-space panels over the scene

use std::time::Duration;

use crate::{
    camera::{Camera, Projection},
    gpu::command::CommandList,
};

pub mod geometry;
pub mod shader;
pub mod ui;

/// A pipeline the renderer updates and records every frame.
///
/// `update` runs before recording, never submits and never blocks.
/// `populate_command_list` is called with descriptor heaps, render targets,
/// viewport and scissor already set.
pub trait Pipeline {
    fn label(&self) -> &str;

    fn update(&mut self, dt: Duration, camera: &Camera, projection: &Projection);

    fn populate_command_list(&self, list: &mut CommandList);
}
