//! [`Backend`] implementation on top of wgpu.
//!
//! The shader-visible resource heap becomes one bind group of binding arrays:
//! storage buffers at binding 0, sampled 2D textures at binding 1 and samplers
//! at binding 2, all indexed by descriptor index. A slot holds a placeholder in
//! the arrays that do not match its view. The bind group is rebuilt lazily
//! before the next submission whenever a descriptor changes.
//!
//! Inline constants are immediates. Render-target and depth descriptors only
//! record which view to use; a render pass is opened when targets are set and
//! pending clears become its load operations.
//!
//! wgpu exposes a single queue, so both [`QueueKind`]s submit to it with
//! separate fence counters. Completion is reported through
//! `Queue::on_submitted_work_done`.

use std::{
    borrow::Cow,
    cell::RefCell,
    collections::{HashMap, VecDeque},
    num::NonZeroU32,
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::{Context as _, bail};

use crate::{
    config::RendererConfig,
    error::RenderError,
    gpu::{
        Backend, BufferDesc, BufferUsage, PipelineId, PipelineStateDesc, QueueKind, ResourceId,
        ShaderBlob, TextureDesc, TextureUsage,
        command::{Command, CommandList, ScissorRect, Viewport},
        descriptor::{
            ConstantBufferViewDesc, HeapKind, HeapLayout, SamplerDesc, ShaderResourceViewDesc,
            UnorderedAccessViewDesc, ViewDesc,
        },
    },
    surface::PresentationSurface,
};

/// Bytes of inline constants every pipeline layout reserves.
pub const IMMEDIATE_BYTES: u32 = (super::MAX_INLINE_CONSTANTS * 4) as u32;

pub const REQUIRED_FEATURES: wgpu::Features = wgpu::Features::IMMEDIATES
    .union(wgpu::Features::TEXTURE_BINDING_ARRAY)
    .union(wgpu::Features::BUFFER_BINDING_ARRAY)
    .union(wgpu::Features::STORAGE_RESOURCE_BINDING_ARRAY)
    .union(wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING);

enum GpuResource {
    Buffer(wgpu::Buffer),
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    /// A swap-chain image, bound only between acquire and present.
    BackBuffer(Option<wgpu::TextureView>),
}

type Slot = Option<(ViewDesc, Option<ResourceId>)>;

struct Placeholders {
    buffer: wgpu::Buffer,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct State {
    next_resource: u32,
    resources: HashMap<ResourceId, GpuResource>,
    heaps: HashMap<HeapKind, Vec<Slot>>,
    samplers: Vec<Option<wgpu::Sampler>>,
    pipelines: Vec<wgpu::RenderPipeline>,
    /// `None` when a descriptor changed since the last build.
    bind_group: Option<wgpu::BindGroup>,
}

struct Fence {
    completed: Arc<AtomicU64>,
    submissions: VecDeque<(u64, wgpu::SubmissionIndex)>,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    resource_capacity: u32,
    sampler_capacity: u32,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    placeholders: Placeholders,
    state: RefCell<State>,
    fences: RefCell<HashMap<QueueKind, Fence>>,
}

impl WgpuBackend {
    /// Requests an adapter and a device able to run the bindless layout.
    pub async fn request(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
        config: &RendererConfig,
    ) -> anyhow::Result<(wgpu::Adapter, Self)> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::AdapterUnavailable(e.to_string()))?;

        let missing = REQUIRED_FEATURES - adapter.features();
        if !missing.is_empty() {
            return Err(RenderError::AdapterUnavailable(format!(
                "{} lacks {missing:?}",
                adapter.get_info().name
            ))
            .into());
        }
        let limits = adapter.limits();
        if limits.max_immediate_size < IMMEDIATE_BYTES
            || limits.max_binding_array_elements_per_shader_stage
                < config.resource_heap_capacity * 2
            || limits.max_binding_array_sampler_elements_per_shader_stage
                < config.sampler_heap_capacity
        {
            return Err(RenderError::AdapterUnavailable(format!(
                "{} cannot hold {} resource and {} sampler descriptors",
                adapter.get_info().name,
                config.resource_heap_capacity,
                config.sampler_heap_capacity
            ))
            .into());
        }

        log::info!("using adapter {}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("bindless device"),
                required_features: REQUIRED_FEATURES,
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(RenderError::from)?;

        let backend = Self::new(
            device,
            queue,
            config.resource_heap_capacity,
            config.sampler_heap_capacity,
        )?;
        Ok((adapter, backend))
    }

    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        resource_capacity: u32,
        sampler_capacity: u32,
    ) -> anyhow::Result<Self> {
        let resource_count = NonZeroU32::new(resource_capacity)
            .context("the resource heap needs at least one slot")?;
        let sampler_count = NonZeroU32::new(sampler_capacity)
            .context("the sampler heap needs at least one slot")?;
        let visibility = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bindless_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: Some(resource_count),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: Some(resource_count),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: Some(sampler_count),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bindless Pipeline Layout"),
            bind_group_layouts: &[Some(&bind_group_layout)],
            immediate_size: IMMEDIATE_BYTES,
        });

        let placeholders = Placeholders {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("placeholder buffer"),
                size: 16,
                usage: wgpu::BufferUsages::STORAGE,
                mapped_at_creation: false,
            }),
            view: device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("placeholder texture"),
                    size: wgpu::Extent3d {
                        width: 1,
                        height: 1,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default()),
            sampler: device.create_sampler(&sampler_descriptor(&SamplerDesc::default())),
        };

        Ok(Self {
            device,
            queue,
            resource_capacity,
            sampler_capacity,
            bind_group_layout,
            pipeline_layout,
            placeholders,
            state: RefCell::new(State {
                next_resource: 0,
                resources: HashMap::new(),
                heaps: HashMap::new(),
                samplers: Vec::new(),
                pipelines: Vec::new(),
                bind_group: None,
            }),
            fences: RefCell::new(HashMap::new()),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn insert(&self, resource: GpuResource) -> ResourceId {
        let mut state = self.state.borrow_mut();
        let id = ResourceId(state.next_resource);
        state.next_resource += 1;
        state.resources.insert(id, resource);
        id
    }

    fn bind_back_buffer(&self, id: ResourceId, view: Option<wgpu::TextureView>) {
        if let Some(GpuResource::BackBuffer(slot)) = self.state.borrow_mut().resources.get_mut(&id) {
            *slot = view;
        }
    }

    fn shader_module(&self, blob: &ShaderBlob) -> anyhow::Result<wgpu::ShaderModule> {
        let source = std::str::from_utf8(&blob.bytecode).map_err(|e| RenderError::ShaderCompile {
            path: blob.source_path.display().to_string(),
            entry_point: blob.entry_point.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(blob.entry_point.as_str()),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        }))
    }

    /// Rebuilds the bindless bind group if a descriptor changed.
    fn bind_group(&self, state: &mut State) -> wgpu::BindGroup {
        if let Some(group) = &state.bind_group {
            return group.clone();
        }
        let empty = Vec::new();
        let slots = state.heaps.get(&HeapKind::ShaderResource).unwrap_or(&empty);
        let mut buffers = Vec::with_capacity(self.resource_capacity as usize);
        let mut views = Vec::with_capacity(self.resource_capacity as usize);
        for i in 0..self.resource_capacity as usize {
            let slot = slots.get(i).copied().flatten();
            let resource = slot.and_then(|(_, id)| id).and_then(|id| state.resources.get(&id));
            buffers.push(match (slot, resource) {
                (Some((view, _)), Some(GpuResource::Buffer(buffer))) => {
                    buffer_binding(buffer, &view).unwrap_or_else(|| whole(&self.placeholders.buffer))
                }
                _ => whole(&self.placeholders.buffer),
            });
            views.push(match (slot, resource) {
                (
                    Some((ViewDesc::ShaderResource(ShaderResourceViewDesc::Texture2D { .. }), _)),
                    Some(GpuResource::Texture { view, .. }),
                ) => view,
                _ => &self.placeholders.view,
            });
        }
        let samplers: Vec<&wgpu::Sampler> = (0..self.sampler_capacity as usize)
            .map(|i| {
                state
                    .samplers
                    .get(i)
                    .and_then(Option::as_ref)
                    .unwrap_or(&self.placeholders.sampler)
            })
            .collect();

        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bindless_bind_group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::BufferArray(&buffers),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureViewArray(&views),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::SamplerArray(&samplers),
                },
            ],
        });
        state.bind_group = Some(group.clone());
        group
    }

    fn target_view(state: &State, kind: HeapKind, index: u32) -> anyhow::Result<wgpu::TextureView> {
        let (_, resource) = state
            .heaps
            .get(&kind)
            .and_then(|slots| slots.get(index as usize).copied().flatten())
            .ok_or_else(|| {
                RenderError::InvalidCommand(format!("{kind:?} descriptor {index} was never written"))
            })?;
        let id = resource
            .ok_or_else(|| RenderError::InvalidCommand(format!("{kind:?} descriptor {index} is empty")))?;
        match state.resources.get(&id) {
            Some(GpuResource::Texture { view, .. }) => Ok(view.clone()),
            Some(GpuResource::BackBuffer(Some(view))) => Ok(view.clone()),
            Some(GpuResource::BackBuffer(None)) => {
                bail!(RenderError::InvalidCommand("back buffer used before acquire".into()))
            }
            Some(GpuResource::Buffer(_)) => {
                bail!(RenderError::InvalidCommand(format!("{kind:?} descriptor {index} views a buffer")))
            }
            None => Err(RenderError::UnknownResource(id.0).into()),
        }
    }
}

fn whole(buffer: &wgpu::Buffer) -> wgpu::BufferBinding<'_> {
    wgpu::BufferBinding {
        buffer,
        offset: 0,
        size: None,
    }
}

fn buffer_binding<'a>(buffer: &'a wgpu::Buffer, view: &ViewDesc) -> Option<wgpu::BufferBinding<'a>> {
    let (offset, size) = match *view {
        ViewDesc::ShaderResource(ShaderResourceViewDesc::StructuredBuffer {
            first_element,
            num_elements,
            stride,
        })
        | ViewDesc::UnorderedAccess(UnorderedAccessViewDesc::StructuredBuffer {
            first_element,
            num_elements,
            stride,
        }) => (
            first_element * stride as u64,
            num_elements as u64 * stride as u64,
        ),
        ViewDesc::ConstantBuffer(ConstantBufferViewDesc { size }) => (0, size),
        _ => return None,
    };
    Some(wgpu::BufferBinding {
        buffer,
        offset,
        size: wgpu::BufferSize::new(size),
    })
}

fn sampler_descriptor(desc: &SamplerDesc) -> wgpu::SamplerDescriptor<'static> {
    wgpu::SamplerDescriptor {
        label: Some("bindless sampler"),
        address_mode_u: desc.address_mode,
        address_mode_v: desc.address_mode,
        address_mode_w: desc.address_mode,
        mag_filter: desc.filter,
        min_filter: desc.filter,
        ..Default::default()
    }
}

/// Render state replayed whenever a render pass is (re)opened.
#[derive(Default)]
struct PassState {
    targets: Option<(u32, Option<u32>)>,
    heaps_bound: bool,
    pipeline: Option<PipelineId>,
    constants: Vec<u32>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    index_buffer: Option<(wgpu::Buffer, wgpu::IndexFormat)>,
    colour_clears: HashMap<u32, wgpu::Color>,
    depth_clears: HashMap<u32, f32>,
}

impl WgpuBackend {
    fn open_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        state: &mut State,
        pass_state: &mut PassState,
        rtv: u32,
        dsv: Option<u32>,
    ) -> anyhow::Result<wgpu::RenderPass<'static>> {
        let colour = Self::target_view(state, HeapKind::RenderTarget, rtv)?;
        let depth = dsv
            .map(|dsv| Self::target_view(state, HeapKind::DepthTarget, dsv).map(|view| (dsv, view)))
            .transpose()?;
        let colour_load = pass_state
            .colour_clears
            .remove(&rtv)
            .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);

        let mut pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &colour,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: colour_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: depth.as_ref().map(|(dsv, view)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: pass_state
                                .depth_clears
                                .remove(dsv)
                                .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        if pass_state.heaps_bound {
            pass.set_bind_group(0, &self.bind_group(state), &[]);
        }
        if let Some(id) = pass_state.pipeline {
            pass.set_pipeline(&state.pipelines[id.0 as usize]);
            pass.set_immediates(0, bytemuck::cast_slice(&pass_state.constants));
        }
        if let Some(v) = pass_state.viewport {
            pass.set_viewport(v.x, v.y, v.width, v.height, v.min_depth, v.max_depth);
        }
        if let Some(s) = pass_state.scissor {
            pass.set_scissor_rect(s.x, s.y, s.width, s.height);
        }
        if let Some((buffer, format)) = &pass_state.index_buffer {
            pass.set_index_buffer(buffer.slice(..), *format);
        }
        Ok(pass)
    }

    fn record(
        &self,
        list: &CommandList,
        encoder: &mut wgpu::CommandEncoder,
    ) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        let mut ps = PassState {
            constants: vec![0; super::MAX_INLINE_CONSTANTS],
            ..Default::default()
        };
        let mut pass: Option<wgpu::RenderPass<'static>> = None;

        for command in list.commands() {
            match command {
                Command::SetDescriptorHeaps => {
                    ps.heaps_bound = true;
                    if let Some(pass) = pass.as_mut() {
                        pass.set_bind_group(0, &self.bind_group(&mut state), &[]);
                    }
                }
                Command::Transition { resource, .. } => {
                    // wgpu tracks resource usage itself.
                    if !state.resources.contains_key(resource) {
                        bail!(RenderError::UnknownResource(resource.0));
                    }
                }
                Command::ClearRenderTarget { rtv, colour } => {
                    ps.colour_clears.insert(*rtv, *colour);
                    if let Some((current, dsv)) = ps.targets.filter(|(current, _)| current == rtv) {
                        drop(pass.take());
                        pass = Some(self.open_pass(encoder, &mut state, &mut ps, current, dsv)?);
                    }
                }
                Command::ClearDepth { dsv, depth } => {
                    ps.depth_clears.insert(*dsv, *depth);
                    if let Some((rtv, current)) = ps.targets.filter(|(_, d)| *d == Some(*dsv)) {
                        drop(pass.take());
                        pass = Some(self.open_pass(encoder, &mut state, &mut ps, rtv, current)?);
                    }
                }
                Command::SetRenderTargets { rtv, dsv } => {
                    drop(pass.take());
                    ps.targets = Some((*rtv, *dsv));
                    pass = Some(self.open_pass(encoder, &mut state, &mut ps, *rtv, *dsv)?);
                }
                Command::SetViewport(viewport) => {
                    ps.viewport = Some(*viewport);
                    if let Some(pass) = pass.as_mut() {
                        pass.set_viewport(
                            viewport.x,
                            viewport.y,
                            viewport.width,
                            viewport.height,
                            viewport.min_depth,
                            viewport.max_depth,
                        );
                    }
                }
                Command::SetScissor(rect) => {
                    ps.scissor = Some(*rect);
                    if let Some(pass) = pass.as_mut() {
                        pass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
                    }
                }
                Command::SetPipelineState(id) => {
                    let pipeline = state.pipelines.get(id.0 as usize).ok_or_else(|| {
                        RenderError::InvalidCommand(format!("unknown pipeline {}", id.0))
                    })?;
                    ps.pipeline = Some(*id);
                    if let Some(pass) = pass.as_mut() {
                        pass.set_pipeline(pipeline);
                        pass.set_immediates(0, bytemuck::cast_slice(&ps.constants));
                    }
                }
                Command::SetInlineConstants { offset, words } => {
                    let values = list.constants(words.clone());
                    let start = *offset as usize;
                    ps.constants[start..start + values.len()].copy_from_slice(values);
                    if let (Some(pass), Some(_)) = (pass.as_mut(), ps.pipeline) {
                        pass.set_immediates(*offset * 4, bytemuck::cast_slice(values));
                    }
                }
                Command::SetIndexBuffer { buffer, format } => {
                    let Some(GpuResource::Buffer(buffer)) = state.resources.get(buffer) else {
                        bail!(RenderError::UnknownResource(buffer.0));
                    };
                    if let Some(pass) = pass.as_mut() {
                        pass.set_index_buffer(buffer.slice(..), *format);
                    }
                    ps.index_buffer = Some((buffer.clone(), *format));
                }
                Command::DrawIndexed {
                    index_count,
                    instance_count,
                } => {
                    let pass = pass.as_mut().ok_or_else(|| {
                        RenderError::InvalidCommand("draw without render targets".into())
                    })?;
                    pass.draw_indexed(0..*index_count, 0, 0..*instance_count);
                }
                Command::Draw {
                    vertex_count,
                    instance_count,
                } => {
                    let pass = pass.as_mut().ok_or_else(|| {
                        RenderError::InvalidCommand("draw without render targets".into())
                    })?;
                    pass.draw(0..*vertex_count, 0..*instance_count);
                }
                Command::UploadBuffer { dst, offset, data } => {
                    let Some(GpuResource::Buffer(buffer)) = state.resources.get(dst) else {
                        bail!(RenderError::UnknownResource(dst.0));
                    };
                    self.queue.write_buffer(buffer, *offset, list.bytes(data.clone()));
                }
                Command::UploadTexture {
                    dst,
                    width,
                    height,
                    data,
                } => {
                    let Some(GpuResource::Texture { texture, .. }) = state.resources.get(dst) else {
                        bail!(RenderError::UnknownResource(dst.0));
                    };
                    self.queue.write_texture(
                        wgpu::TexelCopyTextureInfo {
                            aspect: wgpu::TextureAspect::All,
                            texture,
                            mip_level: 0,
                            origin: wgpu::Origin3d::ZERO,
                        },
                        list.bytes(data.clone()),
                        wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(4 * width),
                            rows_per_image: Some(*height),
                        },
                        wgpu::Extent3d {
                            width: *width,
                            height: *height,
                            depth_or_array_layers: 1,
                        },
                    );
                }
            }
        }
        drop(pass);

        // Clears whose target was never bound still have to happen.
        let colour_clears: Vec<u32> = ps.colour_clears.keys().copied().collect();
        for rtv in colour_clears {
            drop(self.open_pass(encoder, &mut state, &mut ps, rtv, None)?);
        }
        if !ps.depth_clears.is_empty() {
            log::warn!("depth clears without a bound depth target were dropped");
        }
        Ok(())
    }
}

impl Backend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_descriptor_heap(&self, kind: HeapKind, capacity: u32) -> anyhow::Result<HeapLayout> {
        let limit = match kind {
            HeapKind::ShaderResource => self.resource_capacity,
            HeapKind::Sampler => self.sampler_capacity,
            HeapKind::RenderTarget | HeapKind::DepthTarget => u32::MAX,
        };
        if capacity > limit {
            bail!(
                "{} heap of {capacity} exceeds the bindless layout ({limit})",
                kind.label()
            );
        }
        let mut state = self.state.borrow_mut();
        state.heaps.insert(kind, vec![None; capacity as usize]);
        if kind == HeapKind::Sampler {
            state.samplers = (0..capacity).map(|_| None).collect();
        }
        let binding = match kind {
            HeapKind::RenderTarget | HeapKind::DepthTarget => None,
            HeapKind::ShaderResource => Some(0),
            HeapKind::Sampler => Some(2),
        };
        Ok(HeapLayout {
            cpu_start: 0,
            gpu_start: binding.map(|b: u64| b << 32),
            increment: 1,
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
        if let ViewDesc::Sampler(desc) = view {
            let sampler = self.device.create_sampler(&sampler_descriptor(desc));
            let slot = state
                .samplers
                .get_mut(index as usize)
                .with_context(|| format!("sampler slot {index} is out of range"))?;
            *slot = Some(sampler);
        }
        let slot = state
            .heaps
            .get_mut(&kind)
            .and_then(|slots| slots.get_mut(index as usize))
            .with_context(|| format!("{} slot {index} is out of range", kind.label()))?;
        *slot = Some((*view, resource));
        if kind.is_shader_visible() {
            state.bind_group = None;
        }
        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> anyhow::Result<ResourceId> {
        let usage = wgpu::BufferUsages::COPY_DST
            | match desc.usage {
                BufferUsage::Storage => wgpu::BufferUsages::STORAGE,
                BufferUsage::Index => wgpu::BufferUsages::INDEX,
                // Constant buffers are read through the storage array.
                BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::STORAGE,
            };
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label.as_str()),
            size: desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage,
            mapped_at_creation: false,
        });
        Ok(self.insert(GpuResource::Buffer(buffer)))
    }

    fn create_texture(&self, desc: &TextureDesc) -> anyhow::Result<ResourceId> {
        let usage = match desc.usage {
            TextureUsage::Sampled => {
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST
            }
            TextureUsage::RenderTarget => {
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
            }
            TextureUsage::DepthTarget => wgpu::TextureUsages::RENDER_ATTACHMENT,
            TextureUsage::Storage => {
                wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
            }
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label.as_str()),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(self.insert(GpuResource::Texture { texture, view }))
    }

    fn destroy_resource(&self, id: ResourceId) {
        let mut state = self.state.borrow_mut();
        if state.resources.remove(&id).is_some() {
            state.bind_group = None;
        }
    }

    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> anyhow::Result<PipelineId> {
        let vertex = self.shader_module(desc.vertex)?;
        let pixel = self.shader_module(desc.pixel)?;
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some(desc.vertex.entry_point.as_str()),
                // Vertices are pulled from the bindless buffer array.
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &pixel,
                entry_point: Some(desc.pixel.entry_point.as_str()),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.color_format,
                    blend: desc.blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: desc.cull_mode,
                ..Default::default()
            },
            depth_stencil: desc.depth.map(|depth| wgpu::DepthStencilState {
                format: depth.format,
                depth_write_enabled: Some(depth.write),
                depth_compare: Some(depth.compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        let mut state = self.state.borrow_mut();
        state.pipelines.push(pipeline);
        Ok(PipelineId(state.pipelines.len() as u32 - 1))
    }

    fn execute(&self, queue: QueueKind, list: &CommandList, signal: u64) -> anyhow::Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(match queue {
                    QueueKind::Direct => "Direct Encoder",
                    QueueKind::Copy => "Copy Encoder",
                }),
            });
        self.record(list, &mut encoder)?;
        let index = self.queue.submit(std::iter::once(encoder.finish()));

        let mut fences = self.fences.borrow_mut();
        let fence = fences.entry(queue).or_insert_with(|| Fence {
            completed: Arc::new(AtomicU64::new(0)),
            submissions: VecDeque::new(),
        });
        let completed = fence.completed.clone();
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(signal, Ordering::AcqRel);
        });
        fence.submissions.push_back((signal, index));
        Ok(())
    }

    fn completed_value(&self, queue: QueueKind) -> u64 {
        if let Err(e) = self.device.poll(wgpu::PollType::Poll) {
            log::error!("device poll failed: {e}");
        }
        self.fences
            .borrow()
            .get(&queue)
            .map_or(0, |f| f.completed.load(Ordering::Acquire))
    }

    fn wait_for_value(&self, queue: QueueKind, value: u64) -> anyhow::Result<()> {
        let mut fences = self.fences.borrow_mut();
        let Some(fence) = fences.get_mut(&queue) else {
            bail!("nothing was submitted to the {queue:?} queue");
        };
        let Some((_, index)) = fence.submissions.iter().find(|(v, _)| *v >= value).cloned() else {
            bail!("fence value {value} was never submitted");
        };
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(index),
                timeout: None,
            })
            .map_err(|e| anyhow::anyhow!("device poll failed: {e}"))?;
        fence.completed.fetch_max(value, Ordering::AcqRel);
        fence.submissions.retain(|(v, _)| *v > value);
        Ok(())
    }
}

/// A swap chain on a `wgpu::Surface`.
///
/// Back buffer resource ids are fixed; the acquired swap-chain image is bound
/// to the current one between [`acquire`](PresentationSurface::acquire) and
/// [`present`](PresentationSurface::present).
pub struct WgpuSurface {
    backend: Rc<WgpuBackend>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    back_buffers: Vec<ResourceId>,
    current: u32,
    frame: Option<wgpu::SurfaceTexture>,
}

impl WgpuSurface {
    pub fn new(
        backend: Rc<WgpuBackend>,
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        width: u32,
        height: u32,
        frame_count: u32,
    ) -> anyhow::Result<Self> {
        let caps = surface.get_capabilities(adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("the surface reports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: frame_count,
        };
        surface.configure(backend.device(), &config);
        let back_buffers = (0..frame_count)
            .map(|_| backend.insert(GpuResource::BackBuffer(None)))
            .collect();
        Ok(Self {
            backend,
            surface,
            config,
            back_buffers,
            current: 0,
            frame: None,
        })
    }
}

impl PresentationSurface for WgpuSurface {
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
        self.config.format
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn acquire(&mut self) -> anyhow::Result<u32> {
        let frame = self
            .surface
            .get_current_texture()
            .map_err(RenderError::from)?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.backend
            .bind_back_buffer(self.back_buffers[self.current as usize], Some(view));
        self.frame = Some(frame);
        Ok(self.current)
    }

    fn present(&mut self) -> anyhow::Result<()> {
        let frame = self
            .frame
            .take()
            .context("present called without an acquired back buffer")?;
        self.backend
            .bind_back_buffer(self.back_buffers[self.current as usize], None);
        frame.present();
        self.current = (self.current + 1) % self.back_buffer_count();
        Ok(())
    }
}

impl Drop for WgpuSurface {
    fn drop(&mut self) {
        for id in self.back_buffers.drain(..) {
            self.backend.destroy_resource(id);
        }
    }
}
