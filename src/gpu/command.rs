//! CPU-side command recording.
//!
//! A [`CommandList`] stores a typed command stream plus two arenas: one for
//! inline shader constants and one for upload payloads. Commands refer into
//! the arenas by range. [`reset`](CommandList::reset) empties everything but
//! keeps the allocations, so a list that comes back from the GPU is recorded
//! into again without reallocating.

use std::ops::Range;

use bytemuck::Pod;

use super::{MAX_INLINE_CONSTANTS, PipelineId, QueueKind, ResourceId, ResourceState};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Binds the shader-visible resource and sampler heaps.
    SetDescriptorHeaps,
    Transition {
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    ClearRenderTarget {
        rtv: u32,
        colour: wgpu::Color,
    },
    ClearDepth {
        dsv: u32,
        depth: f32,
    },
    SetRenderTargets {
        rtv: u32,
        dsv: Option<u32>,
    },
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetPipelineState(PipelineId),
    /// 32-bit words in the constants arena, written from word `offset`.
    SetInlineConstants {
        offset: u32,
        words: Range<usize>,
    },
    SetIndexBuffer {
        buffer: ResourceId,
        format: wgpu::IndexFormat,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    UploadBuffer {
        dst: ResourceId,
        offset: u64,
        data: Range<usize>,
    },
    /// Tightly packed RGBA8 rows.
    UploadTexture {
        dst: ResourceId,
        width: u32,
        height: u32,
        data: Range<usize>,
    },
}

#[derive(Debug)]
pub struct CommandList {
    queue: QueueKind,
    commands: Vec<Command>,
    constants: Vec<u32>,
    bytes: Vec<u8>,
}

impl CommandList {
    pub fn new(queue: QueueKind) -> Self {
        Self {
            queue,
            commands: Vec::new(),
            constants: Vec::new(),
            bytes: Vec::new(),
        }
    }

    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn constants(&self, words: Range<usize>) -> &[u32] {
        &self.constants[words]
    }

    pub fn bytes(&self, data: Range<usize>) -> &[u8] {
        &self.bytes[data]
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops all recorded work while keeping the storage.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.constants.clear();
        self.bytes.clear();
    }

    pub fn set_descriptor_heaps(&mut self) {
        self.commands.push(Command::SetDescriptorHeaps);
    }

    pub fn transition(&mut self, resource: ResourceId, before: ResourceState, after: ResourceState) {
        if before != after {
            self.commands.push(Command::Transition {
                resource,
                before,
                after,
            });
        }
    }

    pub fn clear_render_target(&mut self, rtv: u32, colour: wgpu::Color) {
        self.commands.push(Command::ClearRenderTarget { rtv, colour });
    }

    pub fn clear_depth(&mut self, dsv: u32, depth: f32) {
        self.commands.push(Command::ClearDepth { dsv, depth });
    }

    pub fn set_render_targets(&mut self, rtv: u32, dsv: Option<u32>) {
        self.commands.push(Command::SetRenderTargets { rtv, dsv });
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&mut self, rect: ScissorRect) {
        self.commands.push(Command::SetScissor(rect));
    }

    pub fn set_pipeline_state(&mut self, pipeline: PipelineId) {
        self.commands.push(Command::SetPipelineState(pipeline));
    }

    /// Pushes `value` as inline constants starting at word 0.
    ///
    /// # Panics
    /// When `value` is not a whole number of 32-bit words or exceeds
    /// [`MAX_INLINE_CONSTANTS`] words.
    pub fn set_inline_constants<T: Pod>(&mut self, value: &T) {
        let bytes = bytemuck::bytes_of(value);
        assert!(
            bytes.len() % 4 == 0,
            "inline constants must be whole 32-bit words"
        );
        let count = bytes.len() / 4;
        assert!(
            count <= MAX_INLINE_CONSTANTS,
            "{count} inline constants exceed the limit of {MAX_INLINE_CONSTANTS}"
        );
        let start = self.constants.len();
        self.constants.extend(
            bytes
                .chunks_exact(4)
                .map(|word| u32::from_ne_bytes([word[0], word[1], word[2], word[3]])),
        );
        self.commands.push(Command::SetInlineConstants {
            offset: 0,
            words: start..start + count,
        });
    }

    pub fn set_index_buffer(&mut self, buffer: ResourceId, format: wgpu::IndexFormat) {
        self.commands.push(Command::SetIndexBuffer { buffer, format });
    }

    pub fn draw_indexed(&mut self, index_count: u32) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count: 1,
        });
    }

    pub fn draw(&mut self, vertex_count: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count: 1,
        });
    }

    pub fn upload_buffer(&mut self, dst: ResourceId, offset: u64, data: &[u8]) {
        let range = self.push_bytes(data);
        self.commands.push(Command::UploadBuffer {
            dst,
            offset,
            data: range,
        });
    }

    pub fn upload_texture(&mut self, dst: ResourceId, width: u32, height: u32, rgba: &[u8]) {
        let range = self.push_bytes(rgba);
        self.commands.push(Command::UploadTexture {
            dst,
            width,
            height,
            data: range,
        });
    }

    fn push_bytes(&mut self, data: &[u8]) -> Range<usize> {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(data);
        start..self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Pair {
        a: u32,
        b: f32,
    }

    #[test]
    fn constants_are_stored_as_words() {
        let mut list = CommandList::new(QueueKind::Direct);
        list.set_inline_constants(&Pair { a: 7, b: 1.0 });
        let Command::SetInlineConstants { words, .. } = list.commands()[0].clone() else {
            panic!("expected inline constants");
        };
        assert_eq!(list.constants(words), &[7, 1.0f32.to_bits()]);
    }

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct TooBig {
        words: [u32; 64],
        extra: u32,
    }

    #[test]
    #[should_panic]
    fn oversized_constant_blocks_panic() {
        let mut list = CommandList::new(QueueKind::Direct);
        list.set_inline_constants(&TooBig {
            words: [0; 64],
            extra: 0,
        });
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut list = CommandList::new(QueueKind::Copy);
        list.upload_buffer(ResourceId(1), 0, &[1, 2, 3, 4]);
        let capacity = list.bytes.capacity();
        list.reset();
        assert!(list.is_empty());
        assert_eq!(list.bytes.capacity(), capacity);
    }

    #[test]
    fn identity_transitions_are_skipped() {
        let mut list = CommandList::new(QueueKind::Direct);
        list.transition(
            ResourceId(0),
            ResourceState::RenderTarget,
            ResourceState::RenderTarget,
        );
        assert!(list.is_empty());
    }
}
