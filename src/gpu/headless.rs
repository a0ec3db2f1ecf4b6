//! An in-process device that executes command lists on the CPU.
//!
//! [`HeadlessBackend`] validates every command against the resources,
//! descriptors and pipelines it has created, stores upload payloads, and keeps a
//! log of draws and clears. It backs the test suite and offscreen runs where no
//! adapter is available.
//!
//! Fence completion is controlled by [`Completion`]. With
//! [`Completion::OnWait`] submitted work only finishes when someone waits for
//! it, and every such wait is counted, which makes CPU stalls observable.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use anyhow::{Context as _, bail};

use crate::{
    error::RenderError,
    gpu::{
        Backend, BufferDesc, BufferUsage, MAX_INLINE_CONSTANTS, PipelineId, PipelineStateDesc,
        QueueKind, ResourceId, ResourceState, ShaderStage, TextureDesc, TextureUsage,
        command::{Command, CommandList},
        descriptor::{HeapKind, HeapLayout, ViewDesc},
    },
    surface::PresentationSurface,
};

/// When submitted work is considered finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The fence is signalled as part of `execute`.
    Immediate,
    /// The fence only advances when waited on or on [`HeadlessBackend::complete_all`].
    OnWait,
}

/// One draw as the device saw it.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub queue_value: u64,
    pub pipeline: PipelineId,
    pub render_target: ResourceId,
    pub index_count: Option<u32>,
    pub vertex_count: Option<u32>,
    pub constants: Vec<u32>,
}

#[derive(Debug)]
enum ResourceKind {
    Buffer { size: u64, usage: BufferUsage },
    Texture { width: u32, height: u32, usage: TextureUsage },
}

#[derive(Debug)]
struct Resource {
    label: String,
    kind: ResourceKind,
    data: Vec<u8>,
    state: Option<ResourceState>,
}

#[derive(Debug)]
struct Heap {
    slots: Vec<Option<(ViewDesc, Option<ResourceId>)>>,
}

#[derive(Debug)]
struct PipelineRecord {
    label: String,
    depth: bool,
}

#[derive(Debug, Default)]
struct Fence {
    submitted: u64,
    completed: u64,
    blocking_waits: usize,
}

#[derive(Debug, Default)]
struct State {
    next_resource: u32,
    resources: HashMap<ResourceId, Resource>,
    heaps: HashMap<HeapKind, Heap>,
    pipelines: Vec<PipelineRecord>,
    fences: HashMap<QueueKind, Fence>,
    draws: Vec<DrawRecord>,
    clears: Vec<(ResourceId, wgpu::Color)>,
}

pub struct HeadlessBackend {
    completion: Completion,
    state: RefCell<State>,
}

const HANDLE_INCREMENT: u32 = 32;

impl HeadlessBackend {
    pub fn new(completion: Completion) -> Self {
        Self {
            completion,
            state: RefCell::new(State::default()),
        }
    }

    /// Finishes all submitted work on both queues without counting a wait.
    pub fn complete_all(&self) {
        let mut state = self.state.borrow_mut();
        for fence in state.fences.values_mut() {
            fence.completed = fence.submitted;
        }
    }

    /// Waits that found the fence behind the requested value.
    pub fn blocking_waits(&self, queue: QueueKind) -> usize {
        self.state
            .borrow()
            .fences
            .get(&queue)
            .map_or(0, |f| f.blocking_waits)
    }

    pub fn live_resources(&self) -> usize {
        self.state.borrow().resources.len()
    }

    pub fn resource_label(&self, id: ResourceId) -> Option<String> {
        self.state.borrow().resources.get(&id).map(|r| r.label.clone())
    }

    pub fn resource_contents(&self, id: ResourceId) -> Option<Vec<u8>> {
        self.state.borrow().resources.get(&id).map(|r| r.data.clone())
    }

    pub fn resource_state(&self, id: ResourceId) -> Option<ResourceState> {
        self.state.borrow().resources.get(&id).and_then(|r| r.state)
    }

    pub fn descriptor(&self, kind: HeapKind, index: u32) -> Option<(ViewDesc, Option<ResourceId>)> {
        self.state
            .borrow()
            .heaps
            .get(&kind)
            .and_then(|heap| heap.slots.get(index as usize).copied().flatten())
    }

    pub fn pipeline_label(&self, id: PipelineId) -> Option<String> {
        self.state
            .borrow()
            .pipelines
            .get(id.0 as usize)
            .map(|p| p.label.clone())
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    pub fn clears(&self) -> Vec<(ResourceId, wgpu::Color)> {
        self.state.borrow().clears.clone()
    }

    /// Forgets the draw and clear log.
    pub fn clear_records(&self) {
        let mut state = self.state.borrow_mut();
        state.draws.clear();
        state.clears.clear();
    }

    fn insert_resource(&self, label: &str, kind: ResourceKind, data: Vec<u8>, state: Option<ResourceState>) -> ResourceId {
        let mut s = self.state.borrow_mut();
        let id = ResourceId(s.next_resource);
        s.next_resource += 1;
        s.resources.insert(
            id,
            Resource {
                label: label.to_string(),
                kind,
                data,
                state,
            },
        );
        id
    }
}

/// Render state accumulated while walking one command list.
#[derive(Default)]
struct Walk {
    heaps_bound: bool,
    target: Option<(ResourceId, bool)>,
    pipeline: Option<PipelineId>,
    index_buffer: Option<ResourceId>,
    constants: Vec<u32>,
}

impl State {
    fn descriptor(&self, kind: HeapKind, index: u32) -> anyhow::Result<(ViewDesc, Option<ResourceId>)> {
        self.heaps
            .get(&kind)
            .and_then(|heap| heap.slots.get(index as usize).copied().flatten())
            .ok_or_else(|| {
                RenderError::InvalidCommand(format!("{kind:?} descriptor {index} was never written"))
                    .into()
            })
    }

    fn view_target(&self, kind: HeapKind, index: u32) -> anyhow::Result<ResourceId> {
        let (_, resource) = self.descriptor(kind, index)?;
        let id = resource.ok_or_else(|| {
            RenderError::InvalidCommand(format!("{kind:?} descriptor {index} has no resource"))
        })?;
        if !self.resources.contains_key(&id) {
            return Err(RenderError::UnknownResource(id.0).into());
        }
        Ok(id)
    }

    fn resource_mut(&mut self, id: ResourceId) -> anyhow::Result<&mut Resource> {
        self.resources
            .get_mut(&id)
            .ok_or_else(|| RenderError::UnknownResource(id.0).into())
    }

    fn run(&mut self, queue: QueueKind, list: &CommandList, signal: u64) -> anyhow::Result<()> {
        let mut walk = Walk {
            constants: vec![0; MAX_INLINE_CONSTANTS],
            ..Default::default()
        };
        for command in list.commands() {
            let graphics_only = !matches!(
                command,
                Command::UploadBuffer { .. } | Command::UploadTexture { .. } | Command::Transition { .. }
            );
            if queue == QueueKind::Copy && graphics_only {
                bail!(RenderError::InvalidCommand(format!(
                    "{command:?} is not allowed on the copy queue"
                )));
            }
            match command {
                Command::SetDescriptorHeaps => walk.heaps_bound = true,
                Command::Transition {
                    resource,
                    before,
                    after,
                } => {
                    let res = self.resource_mut(*resource)?;
                    if let Some(current) = res.state {
                        if current != *before {
                            bail!(RenderError::InvalidCommand(format!(
                                "{} is in state {current:?}, not {before:?}",
                                res.label
                            )));
                        }
                        res.state = Some(*after);
                    }
                }
                Command::ClearRenderTarget { rtv, colour } => {
                    let id = self.view_target(HeapKind::RenderTarget, *rtv)?;
                    self.clears.push((id, *colour));
                }
                Command::ClearDepth { dsv, .. } => {
                    self.view_target(HeapKind::DepthTarget, *dsv)?;
                }
                Command::SetRenderTargets { rtv, dsv } => {
                    let id = self.view_target(HeapKind::RenderTarget, *rtv)?;
                    if let Some(dsv) = dsv {
                        self.view_target(HeapKind::DepthTarget, *dsv)?;
                    }
                    walk.target = Some((id, dsv.is_some()));
                }
                Command::SetViewport(_) | Command::SetScissor(_) => {}
                Command::SetPipelineState(id) => {
                    if self.pipelines.get(id.0 as usize).is_none() {
                        bail!(RenderError::InvalidCommand(format!("unknown pipeline {}", id.0)));
                    }
                    walk.pipeline = Some(*id);
                }
                Command::SetInlineConstants { offset, words } => {
                    let values = list.constants(words.clone());
                    let start = *offset as usize;
                    walk.constants[start..start + values.len()].copy_from_slice(values);
                }
                Command::SetIndexBuffer { buffer, .. } => {
                    match self.resource_mut(*buffer)?.kind {
                        ResourceKind::Buffer {
                            usage: BufferUsage::Index,
                            ..
                        } => walk.index_buffer = Some(*buffer),
                        _ => bail!(RenderError::InvalidCommand(format!(
                            "resource {} is not an index buffer",
                            buffer.0
                        ))),
                    }
                }
                Command::DrawIndexed { index_count, .. } => {
                    if walk.index_buffer.is_none() {
                        bail!(RenderError::InvalidCommand("indexed draw without an index buffer".into()));
                    }
                    let record = self.draw_record(&walk, signal)?;
                    self.draws.push(DrawRecord {
                        index_count: Some(*index_count),
                        ..record
                    });
                }
                Command::Draw { vertex_count, .. } => {
                    let record = self.draw_record(&walk, signal)?;
                    self.draws.push(DrawRecord {
                        vertex_count: Some(*vertex_count),
                        ..record
                    });
                }
                Command::UploadBuffer { dst, offset, data } => {
                    let bytes = list.bytes(data.clone());
                    let res = self.resource_mut(*dst)?;
                    let ResourceKind::Buffer { size, .. } = res.kind else {
                        bail!(RenderError::InvalidCommand(format!("{} is not a buffer", res.label)));
                    };
                    let end = *offset + bytes.len() as u64;
                    if end > size {
                        bail!(RenderError::InvalidCommand(format!(
                            "upload of {} bytes at {offset} overflows {} ({size} bytes)",
                            bytes.len(),
                            res.label
                        )));
                    }
                    res.data[*offset as usize..end as usize].copy_from_slice(bytes);
                }
                Command::UploadTexture {
                    dst,
                    width,
                    height,
                    data,
                } => {
                    let bytes = list.bytes(data.clone());
                    let res = self.resource_mut(*dst)?;
                    let ResourceKind::Texture {
                        width: w,
                        height: h,
                        ..
                    } = res.kind
                    else {
                        bail!(RenderError::InvalidCommand(format!("{} is not a texture", res.label)));
                    };
                    if (w, h) != (*width, *height) || bytes.len() != (w * h * 4) as usize {
                        bail!(RenderError::InvalidCommand(format!(
                            "texture upload does not match {} ({w}x{h})",
                            res.label
                        )));
                    }
                    res.data.clear();
                    res.data.extend_from_slice(bytes);
                }
            }
        }
        Ok(())
    }

    fn draw_record(&self, walk: &Walk, signal: u64) -> anyhow::Result<DrawRecord> {
        if !walk.heaps_bound {
            bail!(RenderError::InvalidCommand("draw before the descriptor heaps were set".into()));
        }
        let Some((render_target, has_depth)) = walk.target else {
            bail!(RenderError::InvalidCommand("draw without a render target".into()));
        };
        let Some(pipeline) = walk.pipeline else {
            bail!(RenderError::InvalidCommand("draw without a pipeline state".into()));
        };
        if self.pipelines[pipeline.0 as usize].depth && !has_depth {
            bail!(RenderError::InvalidCommand(format!(
                "pipeline {} needs a depth target",
                self.pipelines[pipeline.0 as usize].label
            )));
        }
        Ok(DrawRecord {
            queue_value: signal,
            pipeline,
            render_target,
            index_count: None,
            vertex_count: None,
            constants: walk.constants.clone(),
        })
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_descriptor_heap(&self, kind: HeapKind, capacity: u32) -> anyhow::Result<HeapLayout> {
        let mut state = self.state.borrow_mut();
        if state.heaps.contains_key(&kind) {
            bail!("a {} heap already exists", kind.label());
        }
        state.heaps.insert(
            kind,
            Heap {
                slots: vec![None; capacity as usize],
            },
        );
        // Distinct, non-overlapping address ranges per heap kind.
        let base = (kind as u64 + 1) << 32;
        Ok(HeapLayout {
            cpu_start: base,
            gpu_start: kind.is_shader_visible().then_some(base | 1 << 31),
            increment: HANDLE_INCREMENT,
        })
    }

    fn write_descriptor(
        &self,
        kind: HeapKind,
        index: u32,
        view: &ViewDesc,
        resource: Option<ResourceId>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(id) = resource {
            if !state.resources.contains_key(&id) {
                return Err(RenderError::UnknownResource(id.0).into());
            }
        }
        let heap = state
            .heaps
            .get_mut(&kind)
            .with_context(|| format!("no {} heap", kind.label()))?;
        let slot = heap
            .slots
            .get_mut(index as usize)
            .with_context(|| format!("{} slot {index} is out of range", kind.label()))?;
        *slot = Some((*view, resource));
        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> anyhow::Result<ResourceId> {
        if desc.size == 0 {
            bail!("buffer {} has zero size", desc.label);
        }
        Ok(self.insert_resource(
            &desc.label,
            ResourceKind::Buffer {
                size: desc.size,
                usage: desc.usage,
            },
            vec![0; desc.size as usize],
            None,
        ))
    }

    fn create_texture(&self, desc: &TextureDesc) -> anyhow::Result<ResourceId> {
        if desc.width == 0 || desc.height == 0 {
            bail!("texture {} has an empty extent", desc.label);
        }
        let (data, state) = match desc.usage {
            TextureUsage::Sampled | TextureUsage::Storage => (
                vec![0; (desc.width * desc.height * 4) as usize],
                ResourceState::ShaderResource,
            ),
            TextureUsage::RenderTarget => (Vec::new(), ResourceState::Present),
            TextureUsage::DepthTarget => (Vec::new(), ResourceState::DepthWrite),
        };
        Ok(self.insert_resource(
            &desc.label,
            ResourceKind::Texture {
                width: desc.width,
                height: desc.height,
                usage: desc.usage,
            },
            data,
            Some(state),
        ))
    }

    fn destroy_resource(&self, id: ResourceId) {
        if self.state.borrow_mut().resources.remove(&id).is_none() {
            log::warn!("destroying unknown resource {}", id.0);
        }
    }

    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> anyhow::Result<PipelineId> {
        for (blob, stage) in [(desc.vertex, ShaderStage::Vertex), (desc.pixel, ShaderStage::Pixel)] {
            if blob.stage != stage || blob.bytecode.is_empty() {
                bail!(
                    "pipeline {}: {} is not a {stage:?} shader",
                    desc.label,
                    blob.entry_point
                );
            }
        }
        let mut state = self.state.borrow_mut();
        let id = PipelineId(state.pipelines.len() as u32);
        state.pipelines.push(PipelineRecord {
            label: desc.label.to_string(),
            depth: desc.depth.is_some(),
        });
        Ok(id)
    }

    fn execute(&self, queue: QueueKind, list: &CommandList, signal: u64) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        let submitted = state.fences.entry(queue).or_default().submitted;
        if signal <= submitted {
            bail!(RenderError::InvalidCommand(format!(
                "fence value {signal} does not advance the {queue:?} queue past {submitted}"
            )));
        }
        state.run(queue, list, signal)?;
        let fence = state.fences.entry(queue).or_default();
        fence.submitted = signal;
        if self.completion == Completion::Immediate {
            fence.completed = signal;
        }
        Ok(())
    }

    fn completed_value(&self, queue: QueueKind) -> u64 {
        self.state
            .borrow()
            .fences
            .get(&queue)
            .map_or(0, |f| f.completed)
    }

    fn wait_for_value(&self, queue: QueueKind, value: u64) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        let fence = state.fences.entry(queue).or_default();
        if fence.completed >= value {
            return Ok(());
        }
        if value > fence.submitted {
            bail!("fence value {value} was never submitted (last {})", fence.submitted);
        }
        fence.blocking_waits += 1;
        fence.completed = value;
        Ok(())
    }
}

/// A swap chain of render-target textures on a [`HeadlessBackend`].
pub struct HeadlessSurface {
    backend: Rc<HeadlessBackend>,
    back_buffers: Vec<ResourceId>,
    current: u32,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    presents: u64,
}

impl HeadlessSurface {
    pub fn new(
        backend: Rc<HeadlessBackend>,
        count: u32,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> anyhow::Result<Self> {
        let back_buffers = (0..count)
            .map(|i| {
                backend.create_texture(&TextureDesc {
                    label: format!("back buffer {i}"),
                    width,
                    height,
                    format,
                    usage: TextureUsage::RenderTarget,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            backend,
            back_buffers,
            current: 0,
            width,
            height,
            format,
            presents: 0,
        })
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }
}

impl PresentationSurface for HeadlessSurface {
    fn back_buffer_count(&self) -> u32 {
        self.back_buffers.len() as u32
    }

    fn back_buffer(&self, index: u32) -> ResourceId {
        self.back_buffers[index as usize]
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn acquire(&mut self) -> anyhow::Result<u32> {
        Ok(self.current)
    }

    fn present(&mut self) -> anyhow::Result<()> {
        let target = self.back_buffers[self.current as usize];
        if self.backend.resource_state(target) != Some(ResourceState::Present) {
            bail!(RenderError::InvalidCommand(format!(
                "back buffer {} presented outside the present state",
                self.current
            )));
        }
        self.presents += 1;
        self.current = (self.current + 1) % self.back_buffer_count();
        Ok(())
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        for id in self.back_buffers.drain(..) {
            self.backend.destroy_resource(id);
        }
    }
}
