//! The per-frame driver.
//!
//! [`Renderer`] owns the context, the presentation surface, one [`FrameSlot`]
//! per back buffer, the depth target and the pipelines. Each tick runs
//! [`update`](Renderer::update) and then [`render`](Renderer::render):
//!
//! ```text
//! acquire ─▶ wait for slot fence ─▶ clear ─▶ record pipelines ─▶ submit ─▶ present
//! ```
//!
//! The wait is the only place the frame loop blocks. It keeps at most
//! `frame_count` frames of work in flight: a slot is re-recorded only once the
//! direct queue has passed the fence value of its previous submission.

use std::{path::Path, rc::Rc, time::Duration};

use cgmath::Deg;
use instant::Instant;

use crate::{
    camera::{Camera, Projection},
    config::RendererConfig,
    context::Context,
    data_structures::texture::Texture,
    gpu::{
        Backend, ResourceId, ResourceState,
        command::{ScissorRect, Viewport},
        descriptor::RenderTargetViewDesc,
    },
    pipelines::{
        Pipeline, geometry::GeometryPipeline, shader::ShaderCompiler, ui::UiPipeline,
    },
    surface::PresentationSurface,
};

/// A back buffer, its render-target view, and the fence value of the last
/// frame recorded into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    pub target: ResourceId,
    pub rtv: u32,
    pub fence_value: u64,
}

pub struct Renderer<S: PresentationSurface> {
    config: RendererConfig,
    ctx: Context,
    surface: S,
    slots: Vec<FrameSlot>,
    depth: Texture,
    camera: Camera,
    projection: Projection,
    geometry: GeometryPipeline,
    ui: UiPipeline,
    last_tick: Option<Instant>,
    frames_rendered: u64,
}

impl<S: PresentationSurface> Renderer<S> {
    pub fn new(
        backend: Rc<dyn Backend>,
        surface: S,
        config: RendererConfig,
        compiler: &dyn ShaderCompiler,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            surface.back_buffer_count() == config.frame_count,
            "surface has {} back buffers, expected {}",
            surface.back_buffer_count(),
            config.frame_count
        );
        let mut ctx = Context::new(backend, &config)?;
        let format = surface.format();
        let (width, height) = surface.size();

        let mut slots = Vec::with_capacity(config.frame_count as usize);
        for index in 0..config.frame_count {
            let target = surface.back_buffer(index);
            let rtv = ctx.create_rtv(target, RenderTargetViewDesc { format })?;
            slots.push(FrameSlot {
                target,
                rtv,
                fence_value: 0,
            });
        }
        let depth = Texture::create_depth_texture(&mut ctx, [width, height], "Depth Texture")?;

        let geometry = GeometryPipeline::new(&ctx, compiler, &config, format)?;
        let mut ui = UiPipeline::new(&ctx, compiler, &config, format)?;
        ui.resize(width, height);

        let projection = Projection::new(
            width,
            height,
            Deg(config.field_of_view_degrees),
            config.near_plane,
            config.far_plane,
        );
        log::info!(
            "renderer ready: {width}x{height} {format:?}, {} frame slots",
            slots.len()
        );
        Ok(Self {
            config,
            ctx,
            surface,
            slots,
            depth,
            camera: Camera::default(),
            projection,
            geometry,
            ui,
            last_tick: None,
            frames_rendered: 0,
        })
    }

    /// Advances camera-dependent state in every pipeline. Never submits and
    /// never blocks.
    pub fn update(&mut self, dt: Duration) {
        let (camera, projection) = (&self.camera, &self.projection);
        for pipeline in [&mut self.geometry as &mut dyn Pipeline, &mut self.ui] {
            pipeline.update(dt, camera, projection);
        }
    }

    /// Records, submits and presents one frame.
    ///
    /// Blocks only when the acquired slot's previous frame is still executing.
    pub fn render(&mut self) -> anyhow::Result<()> {
        let index = self.surface.acquire()? as usize;
        let slot = *self
            .slots
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("surface returned back buffer {index}"))?;
        self.ctx.direct_queue.wait_for_fence_value(slot.fence_value)?;

        let dsv = self
            .depth
            .dsv
            .ok_or_else(|| anyhow::anyhow!("depth texture has no depth view"))?;
        let (width, height) = self.surface.size();

        let mut list = self.ctx.direct_queue.get_command_list();
        list.set_descriptor_heaps();
        list.transition(slot.target, ResourceState::Present, ResourceState::RenderTarget);
        list.clear_render_target(slot.rtv, self.config.clear_colour);
        list.clear_depth(dsv, 1.0);
        list.set_render_targets(slot.rtv, Some(dsv));
        list.set_viewport(Viewport::full(width, height));
        list.set_scissor(ScissorRect::full(width, height));
        for pipeline in [&self.geometry as &dyn Pipeline, &self.ui] {
            pipeline.populate_command_list(&mut list);
        }
        list.transition(slot.target, ResourceState::RenderTarget, ResourceState::Present);

        let fence_value = self.ctx.direct_queue.execute(list)?;
        self.slots[index].fence_value = fence_value;
        self.surface.present()?;
        self.frames_rendered += 1;
        Ok(())
    }

    /// Runs `update` with the time since the previous tick, then `render`.
    pub fn tick(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = self.last_tick.map(|last| now - last).unwrap_or_default();
        self.last_tick = Some(now);
        self.update(dt);
        self.render()
    }

    pub fn queue_model(&mut self, path: impl AsRef<Path>) {
        self.geometry.models_mut().queue_model(path);
    }

    pub fn load_queued_models_async(&mut self) {
        self.geometry.models_mut().load_queued_models_async();
    }

    /// Joins the parse tasks and uploads their results. Returns the number of
    /// models added.
    pub fn load_models_gpu(&mut self) -> anyhow::Result<usize> {
        self.geometry.models_mut().load_models_gpu(&mut self.ctx)
    }

    /// Waits until the device has finished all submitted work.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.ctx.flush()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    pub fn depth_texture(&self) -> &Texture {
        &self.depth
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn geometry(&self) -> &GeometryPipeline {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut GeometryPipeline {
        &mut self.geometry
    }

    pub fn ui(&self) -> &UiPipeline {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut UiPipeline {
        &mut self.ui
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

impl<S: PresentationSurface> Drop for Renderer<S> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.flush() {
            log::error!("failed to drain the queues on shutdown: {e:#}");
        }
    }
}
