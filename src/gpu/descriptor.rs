//! Descriptor heaps and bump allocation of descriptor indices.
//!
//! Every heap hands out indices from a cursor that only moves forward. An index
//! stays valid until the heap itself is torn down, so a stored index always
//! denotes the same resource. Running past the capacity is fatal: heaps are
//! sized up front for the largest working set the renderer expects.

use std::rc::Rc;

use anyhow::Context as _;

use crate::{
    error::RenderError,
    gpu::{Backend, ResourceId},
};

/// The four heap flavours the renderer keeps one instance of each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeapKind {
    RenderTarget,
    DepthTarget,
    ShaderResource,
    Sampler,
}

impl HeapKind {
    pub const ALL: [HeapKind; 4] = [
        HeapKind::RenderTarget,
        HeapKind::DepthTarget,
        HeapKind::ShaderResource,
        HeapKind::Sampler,
    ];

    /// Shader-visible heaps are indexed directly from shader code.
    pub fn is_shader_visible(self) -> bool {
        matches!(self, HeapKind::ShaderResource | HeapKind::Sampler)
    }

    pub fn label(self) -> &'static str {
        match self {
            HeapKind::RenderTarget => "Render Target View",
            HeapKind::DepthTarget => "Depth Stencil View",
            HeapKind::ShaderResource => "Shader Resource View",
            HeapKind::Sampler => "Sampler",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CpuDescriptorHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GpuDescriptorHandle(pub u64);

/// Where a heap lives as reported by the backend that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapLayout {
    pub cpu_start: u64,
    /// Only shader-visible heaps have a GPU address.
    pub gpu_start: Option<u64>,
    pub increment: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorHandle {
    pub kind: HeapKind,
    pub index: u32,
    pub cpu: CpuDescriptorHandle,
    pub gpu: Option<GpuDescriptorHandle>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTargetViewDesc {
    pub format: wgpu::TextureFormat,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthTargetViewDesc {
    pub format: wgpu::TextureFormat,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ShaderResourceViewDesc {
    StructuredBuffer {
        first_element: u64,
        num_elements: u32,
        stride: u32,
    },
    Texture2D {
        format: wgpu::TextureFormat,
        mip_levels: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnorderedAccessViewDesc {
    StructuredBuffer {
        first_element: u64,
        num_elements: u32,
        stride: u32,
    },
    Texture2D {
        format: wgpu::TextureFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantBufferViewDesc {
    pub size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerDesc {
    pub filter: wgpu::FilterMode,
    pub address_mode: wgpu::AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: wgpu::FilterMode::Linear,
            address_mode: wgpu::AddressMode::Repeat,
        }
    }
}

/// How a resource is interpreted through one descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewDesc {
    RenderTarget(RenderTargetViewDesc),
    DepthTarget(DepthTargetViewDesc),
    ShaderResource(ShaderResourceViewDesc),
    UnorderedAccess(UnorderedAccessViewDesc),
    ConstantBuffer(ConstantBufferViewDesc),
    Sampler(SamplerDesc),
}

impl ViewDesc {
    /// The heap a view of this kind has to be written into.
    pub fn heap_kind(&self) -> HeapKind {
        match self {
            ViewDesc::RenderTarget(_) => HeapKind::RenderTarget,
            ViewDesc::DepthTarget(_) => HeapKind::DepthTarget,
            ViewDesc::ShaderResource(_)
            | ViewDesc::UnorderedAccess(_)
            | ViewDesc::ConstantBuffer(_) => HeapKind::ShaderResource,
            ViewDesc::Sampler(_) => HeapKind::Sampler,
        }
    }
}

/// Bump allocator over a fixed-capacity range of descriptor slots.
///
/// There is no `free`: indices are reclaimed only when the whole heap goes away.
#[derive(Debug)]
pub struct DescriptorAllocator {
    kind: HeapKind,
    capacity: u32,
    cursor: u32,
    layout: HeapLayout,
}

impl DescriptorAllocator {
    pub fn new(kind: HeapKind, capacity: u32, layout: HeapLayout) -> Self {
        Self {
            kind,
            capacity,
            cursor: 0,
            layout,
        }
    }

    pub fn allocate(&mut self) -> Result<DescriptorHandle, RenderError> {
        if self.cursor >= self.capacity {
            return Err(RenderError::HeapExhausted {
                kind: self.kind,
                capacity: self.capacity,
            });
        }
        let index = self.cursor;
        self.cursor += 1;
        Ok(self.handle(index))
    }

    /// Handle for an index that was already handed out.
    pub fn handle_at(&self, index: u32) -> Option<DescriptorHandle> {
        (index < self.cursor).then(|| self.handle(index))
    }

    fn handle(&self, index: u32) -> DescriptorHandle {
        let offset = index as u64 * self.layout.increment as u64;
        DescriptorHandle {
            kind: self.kind,
            index,
            cpu: CpuDescriptorHandle(self.layout.cpu_start + offset),
            gpu: self
                .layout
                .gpu_start
                .map(|start| GpuDescriptorHandle(start + offset)),
        }
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn allocated(&self) -> u32 {
        self.cursor
    }

    pub fn remaining(&self) -> u32 {
        self.capacity - self.cursor
    }
}

/// A descriptor heap on the device plus its allocator.
///
/// `create` allocates the next slot and writes the view into it.
pub struct DescriptorHeap {
    backend: Rc<dyn Backend>,
    allocator: DescriptorAllocator,
}

impl DescriptorHeap {
    pub fn new(backend: Rc<dyn Backend>, kind: HeapKind, capacity: u32) -> anyhow::Result<Self> {
        let layout = backend
            .create_descriptor_heap(kind, capacity)
            .with_context(|| format!("creating the {} heap", kind.label()))?;
        log::debug!("{} heap created with {} slots", kind.label(), capacity);
        Ok(Self {
            backend,
            allocator: DescriptorAllocator::new(kind, capacity, layout),
        })
    }

    pub fn create(
        &mut self,
        view: &ViewDesc,
        resource: Option<ResourceId>,
    ) -> anyhow::Result<DescriptorHandle> {
        debug_assert_eq!(view.heap_kind(), self.allocator.kind());
        let handle = self.allocator.allocate()?;
        self.backend
            .write_descriptor(handle.kind, handle.index, view, resource)?;
        Ok(handle)
    }

    pub fn handle_at(&self, index: u32) -> Option<DescriptorHandle> {
        self.allocator.handle_at(index)
    }

    pub fn allocator(&self) -> &DescriptorAllocator {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> HeapLayout {
        HeapLayout {
            cpu_start: 0x1000,
            gpu_start: Some(0x8000),
            increment: 32,
        }
    }

    #[test]
    fn indices_are_handed_out_in_order() {
        let mut allocator = DescriptorAllocator::new(HeapKind::ShaderResource, 4, layout());
        let indices: Vec<u32> = (0..4).map(|_| allocator.allocate().unwrap().index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(allocator.remaining(), 0);
    }

    #[test]
    fn handles_are_offset_by_the_increment() {
        let mut allocator = DescriptorAllocator::new(HeapKind::ShaderResource, 4, layout());
        allocator.allocate().unwrap();
        let second = allocator.allocate().unwrap();
        assert_eq!(second.cpu, CpuDescriptorHandle(0x1000 + 32));
        assert_eq!(second.gpu, Some(GpuDescriptorHandle(0x8000 + 32)));
        assert_eq!(allocator.handle_at(1), Some(second));
        assert_eq!(allocator.handle_at(2), None);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut allocator = DescriptorAllocator::new(HeapKind::DepthTarget, 1, layout());
        allocator.allocate().unwrap();
        match allocator.allocate() {
            Err(RenderError::HeapExhausted { kind, capacity }) => {
                assert_eq!(kind, HeapKind::DepthTarget);
                assert_eq!(capacity, 1);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn views_map_to_their_heap() {
        let cbv = ViewDesc::ConstantBuffer(ConstantBufferViewDesc { size: 256 });
        let sampler = ViewDesc::Sampler(SamplerDesc::default());
        assert_eq!(cbv.heap_kind(), HeapKind::ShaderResource);
        assert_eq!(sampler.heap_kind(), HeapKind::Sampler);
    }
}
