//! The device seam.
//!
//! Everything that touches a GPU goes through [`Backend`]. A backend is shared
//! as `Rc<dyn Backend>`, which keeps every object that owns one on the thread
//! that created the device: descriptor allocation and command recording are not
//! thread-safe and nothing here locks.
//!
//! # Key types
//! - [`Backend`]: heap, resource and pipeline creation plus queue submission and fences
//! - [`ResourceId`] / [`PipelineId`]: opaque handles handed out by a backend
//! - [`BufferDesc`], [`TextureDesc`], [`PipelineStateDesc`]: creation parameters
//! - [`ShaderBlob`]: compiled stage output consumed by pipeline creation

pub mod command;
pub mod descriptor;
pub mod headless;
pub mod queue;
pub mod wgpu_backend;

use std::path::PathBuf;

use command::CommandList;
use descriptor::{HeapKind, HeapLayout, ViewDesc};

/// Maximum number of 32-bit inline constants a draw may push.
pub const MAX_INLINE_CONSTANTS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u32);

/// The two hardware queues the renderer submits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics work: frame rendering.
    Direct,
    /// Transfers: asset upload.
    Copy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Read from shaders through a structured-buffer descriptor.
    Storage,
    Index,
    Uniform,
}

#[derive(Clone, Debug)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureUsage {
    Sampled,
    RenderTarget,
    DepthTarget,
    Storage,
}

#[derive(Clone, Debug)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: TextureUsage,
}

/// Resource states a command list transitions between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Present,
    RenderTarget,
    CopyDest,
    ShaderResource,
    DepthWrite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Output of a shader compiler for one entry point.
#[derive(Clone, Debug)]
pub struct ShaderBlob {
    pub stage: ShaderStage,
    pub source_path: PathBuf,
    pub entry_point: String,
    pub bytecode: Vec<u8>,
    /// Reflected binding layout, when the compiler produces one.
    pub layout: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthState {
    pub format: wgpu::TextureFormat,
    pub write: bool,
    pub compare: wgpu::CompareFunction,
}

/// Everything needed to build a pipeline state object on the bindless layout.
#[derive(Clone, Debug)]
pub struct PipelineStateDesc<'a> {
    pub label: &'a str,
    pub vertex: &'a ShaderBlob,
    pub pixel: &'a ShaderBlob,
    pub color_format: wgpu::TextureFormat,
    pub blend: Option<wgpu::BlendState>,
    pub depth: Option<DepthState>,
    pub cull_mode: Option<wgpu::Face>,
}

/// A GPU device, its queues and their fences.
///
/// Fence values passed to [`execute`](Backend::execute) are chosen by the
/// caller and must increase per queue.
pub trait Backend {
    fn name(&self) -> &str;

    fn create_descriptor_heap(&self, kind: HeapKind, capacity: u32) -> anyhow::Result<HeapLayout>;

    /// Writes a view of `resource` into slot `index` of the heap of `kind`.
    /// Samplers pass `None`.
    fn write_descriptor(
        &self,
        kind: HeapKind,
        index: u32,
        view: &ViewDesc,
        resource: Option<ResourceId>,
    ) -> anyhow::Result<()>;

    fn create_buffer(&self, desc: &BufferDesc) -> anyhow::Result<ResourceId>;

    fn create_texture(&self, desc: &TextureDesc) -> anyhow::Result<ResourceId>;

    fn destroy_resource(&self, id: ResourceId);

    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> anyhow::Result<PipelineId>;

    /// Submits `list` and arranges for the queue's fence to reach `signal`
    /// once the work has finished.
    fn execute(&self, queue: QueueKind, list: &CommandList, signal: u64) -> anyhow::Result<()>;

    fn completed_value(&self, queue: QueueKind) -> u64;

    /// Blocks until the queue's fence has reached `value`. There is no timeout.
    fn wait_for_value(&self, queue: QueueKind, value: u64) -> anyhow::Result<()>;
}
