//! Error types for fatal renderer conditions.
//!
//! Public operations return [`anyhow::Result`]. The conditions that abort
//! initialization or the frame loop are described by [`RenderError`] so callers
//! can `downcast_ref` and react to a specific failure. Recoverable asset
//! problems (missing files, missing attributes, missing textures) are logged and
//! defaulted instead and never surface as an error.

use thiserror::Error;

use crate::gpu::{QueueKind, descriptor::HeapKind};

#[derive(Error, Debug)]
pub enum RenderError {
    /// A descriptor heap ran past the capacity it was created with.
    #[error("{kind:?} descriptor heap exhausted (capacity {capacity})")]
    HeapExhausted { kind: HeapKind, capacity: u32 },

    /// Waiting on a fence value failed; the device is in an unknown state.
    #[error("waiting for fence value {value} on the {queue:?} queue failed: {reason}")]
    FenceWait {
        queue: QueueKind,
        value: u64,
        reason: String,
    },

    #[error("failed to compile {entry_point} in {path}: {reason}")]
    ShaderCompile {
        path: String,
        entry_point: String,
        reason: String,
    },

    #[error("no compatible GPU adapter: {0}")]
    AdapterUnavailable(String),

    #[error("failed to create GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("presentation surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// A recorded command referenced state the device does not have.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("unknown resource id {0}")]
    UnknownResource(u32),
}
