//! The device-owning context.
//!
//! [`Context`] holds the backend, the direct and copy queues and one descriptor
//! heap of each kind. It is the only way to create descriptors, and it is
//! `!Send`: everything that allocates descriptors or records commands stays on
//! the thread that built it.

use std::rc::Rc;

use crate::{
    config::RendererConfig,
    gpu::{
        Backend, QueueKind, ResourceId,
        descriptor::{
            ConstantBufferViewDesc, DepthTargetViewDesc, DescriptorHandle, DescriptorHeap,
            HeapKind, RenderTargetViewDesc, SamplerDesc, ShaderResourceViewDesc,
            UnorderedAccessViewDesc, ViewDesc,
        },
        queue::CommandQueue,
    },
};

pub struct Context {
    backend: Rc<dyn Backend>,
    pub direct_queue: CommandQueue,
    pub copy_queue: CommandQueue,
    rtv_heap: DescriptorHeap,
    dsv_heap: DescriptorHeap,
    srv_heap: DescriptorHeap,
    sampler_heap: DescriptorHeap,
}

impl Context {
    /// Creates the queues and heaps and writes the default sampler into
    /// sampler slot 0.
    pub fn new(backend: Rc<dyn Backend>, config: &RendererConfig) -> anyhow::Result<Self> {
        config.validate()?;
        log::info!("creating context on the {} backend", backend.name());
        let mut ctx = Self {
            direct_queue: CommandQueue::new(backend.clone(), QueueKind::Direct),
            copy_queue: CommandQueue::new(backend.clone(), QueueKind::Copy),
            rtv_heap: DescriptorHeap::new(
                backend.clone(),
                HeapKind::RenderTarget,
                config.render_target_heap_capacity(),
            )?,
            dsv_heap: DescriptorHeap::new(
                backend.clone(),
                HeapKind::DepthTarget,
                config.depth_target_heap_capacity,
            )?,
            srv_heap: DescriptorHeap::new(
                backend.clone(),
                HeapKind::ShaderResource,
                config.resource_heap_capacity,
            )?,
            sampler_heap: DescriptorHeap::new(
                backend.clone(),
                HeapKind::Sampler,
                config.sampler_heap_capacity,
            )?,
            backend,
        };
        ctx.create_sampler(SamplerDesc::default())?;
        Ok(ctx)
    }

    pub fn backend(&self) -> &Rc<dyn Backend> {
        &self.backend
    }

    pub fn queue(&mut self, kind: QueueKind) -> &mut CommandQueue {
        match kind {
            QueueKind::Direct => &mut self.direct_queue,
            QueueKind::Copy => &mut self.copy_queue,
        }
    }

    pub fn heap(&self, kind: HeapKind) -> &DescriptorHeap {
        match kind {
            HeapKind::RenderTarget => &self.rtv_heap,
            HeapKind::DepthTarget => &self.dsv_heap,
            HeapKind::ShaderResource => &self.srv_heap,
            HeapKind::Sampler => &self.sampler_heap,
        }
    }

    /// Allocates a descriptor in the heap `view` belongs to and writes it.
    pub fn create_descriptor(
        &mut self,
        view: ViewDesc,
        resource: Option<ResourceId>,
    ) -> anyhow::Result<DescriptorHandle> {
        let heap = match view.heap_kind() {
            HeapKind::RenderTarget => &mut self.rtv_heap,
            HeapKind::DepthTarget => &mut self.dsv_heap,
            HeapKind::ShaderResource => &mut self.srv_heap,
            HeapKind::Sampler => &mut self.sampler_heap,
        };
        heap.create(&view, resource)
    }

    pub fn create_rtv(&mut self, resource: ResourceId, desc: RenderTargetViewDesc) -> anyhow::Result<u32> {
        Ok(self
            .create_descriptor(ViewDesc::RenderTarget(desc), Some(resource))?
            .index)
    }

    pub fn create_dsv(&mut self, resource: ResourceId, desc: DepthTargetViewDesc) -> anyhow::Result<u32> {
        Ok(self
            .create_descriptor(ViewDesc::DepthTarget(desc), Some(resource))?
            .index)
    }

    pub fn create_srv(&mut self, resource: ResourceId, desc: ShaderResourceViewDesc) -> anyhow::Result<u32> {
        Ok(self
            .create_descriptor(ViewDesc::ShaderResource(desc), Some(resource))?
            .index)
    }

    pub fn create_uav(&mut self, resource: ResourceId, desc: UnorderedAccessViewDesc) -> anyhow::Result<u32> {
        Ok(self
            .create_descriptor(ViewDesc::UnorderedAccess(desc), Some(resource))?
            .index)
    }

    pub fn create_cbv(&mut self, resource: ResourceId, desc: ConstantBufferViewDesc) -> anyhow::Result<u32> {
        Ok(self
            .create_descriptor(ViewDesc::ConstantBuffer(desc), Some(resource))?
            .index)
    }

    pub fn create_sampler(&mut self, desc: SamplerDesc) -> anyhow::Result<u32> {
        Ok(self.create_descriptor(ViewDesc::Sampler(desc), None)?.index)
    }

    /// Waits for all work on both queues.
    pub fn flush(&self) -> anyhow::Result<()> {
        self.direct_queue.flush()?;
        self.copy_queue.flush()
    }
}
