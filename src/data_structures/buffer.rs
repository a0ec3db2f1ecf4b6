//! GPU buffers and the descriptors that expose them.

use std::rc::Rc;

use bytemuck::Pod;

use crate::{
    context::Context,
    gpu::{
        Backend, BufferDesc, BufferUsage, ResourceId,
        command::CommandList,
        descriptor::{ConstantBufferViewDesc, ShaderResourceViewDesc, UnorderedAccessViewDesc},
    },
};

/// A device buffer plus the descriptor indices shaders reach it through.
///
/// The resource is destroyed when the buffer is dropped. Descriptor indices
/// are never reclaimed; they stay pointing at a dead resource until the heap
/// itself is torn down, so a buffer must outlive every draw that reads it.
pub struct Buffer {
    backend: Rc<dyn Backend>,
    resource: ResourceId,
    size: u64,
    stride: u32,
    pub srv: Option<u32>,
    pub uav: Option<u32>,
    pub cbv: Option<u32>,
}

impl Buffer {
    pub fn new(ctx: &Context, desc: &BufferDesc, stride: u32) -> anyhow::Result<Self> {
        let resource = ctx.backend().create_buffer(desc)?;
        Ok(Self {
            backend: ctx.backend().clone(),
            resource,
            size: desc.size,
            stride,
            srv: None,
            uav: None,
            cbv: None,
        })
    }

    /// Creates a structured buffer, records the upload of `data` on `list` and
    /// writes a shader-resource view of it.
    ///
    /// The descriptor is valid immediately, but the contents only once `list`
    /// has executed.
    pub fn structured<T: Pod>(
        ctx: &mut Context,
        list: &mut CommandList,
        label: &str,
        data: &[T],
    ) -> anyhow::Result<Self> {
        let stride = std::mem::size_of::<T>() as u32;
        let mut buffer = Self::new(
            ctx,
            &BufferDesc {
                label: label.to_string(),
                size: std::mem::size_of_val(data) as u64,
                usage: BufferUsage::Storage,
            },
            stride,
        )?;
        list.upload_buffer(buffer.resource, 0, bytemuck::cast_slice(data));
        buffer.srv = Some(ctx.create_srv(
            buffer.resource,
            ShaderResourceViewDesc::StructuredBuffer {
                first_element: 0,
                num_elements: data.len() as u32,
                stride,
            },
        )?);
        Ok(buffer)
    }

    pub fn index(
        ctx: &mut Context,
        list: &mut CommandList,
        label: &str,
        indices: &[u32],
    ) -> anyhow::Result<Self> {
        let buffer = Self::new(
            ctx,
            &BufferDesc {
                label: label.to_string(),
                size: std::mem::size_of_val(indices) as u64,
                usage: BufferUsage::Index,
            },
            4,
        )?;
        list.upload_buffer(buffer.resource, 0, bytemuck::cast_slice(indices));
        Ok(buffer)
    }

    pub fn create_uav(&mut self, ctx: &mut Context) -> anyhow::Result<u32> {
        let index = ctx.create_uav(
            self.resource,
            UnorderedAccessViewDesc::StructuredBuffer {
                first_element: 0,
                num_elements: self.element_count(),
                stride: self.stride,
            },
        )?;
        self.uav = Some(index);
        Ok(index)
    }

    pub fn create_cbv(&mut self, ctx: &mut Context) -> anyhow::Result<u32> {
        let index = ctx.create_cbv(self.resource, ConstantBufferViewDesc { size: self.size })?;
        self.cbv = Some(index);
        Ok(index)
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn element_count(&self) -> u32 {
        (self.size / self.stride.max(1) as u64) as u32
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.backend.destroy_resource(self.resource);
    }
}
