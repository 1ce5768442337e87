//! Compute backend error types.

use crate::{PipelineId, ResourceHandle};

/// Errors raised by a [`ComputeBackend`](crate::ComputeBackend).
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request the GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// A handle that was never issued, or was already released.
    #[error("unknown resource handle {0:?}")]
    UnknownHandle(ResourceHandle),

    /// A handle of the wrong kind was passed (a texture where a buffer was expected).
    #[error("resource {handle:?} is not a {expected}")]
    WrongResource {
        handle: ResourceHandle,
        expected: &'static str,
    },

    /// The parameter block does not belong to the requested pipeline.
    #[error("parameters do not match pipeline {0:?}")]
    ParamsMismatch(PipelineId),

    /// The pipeline was given the wrong number of input handles.
    #[error("pipeline {pipeline:?} expects {expected} inputs, got {got}")]
    InputCount {
        pipeline: PipelineId,
        expected: usize,
        got: usize,
    },

    /// An input buffer is smaller than the parameters imply.
    #[error("input buffer holds {got} bytes, expected at least {expected}")]
    InputTooSmall { expected: usize, got: usize },

    /// A placement grid larger than the output buffer may hold.
    #[error("placement grid of {grid_steps} steps per axis exceeds {max}")]
    GridTooLarge { grid_steps: u32, max: u32 },

    /// Mapping a read-back buffer failed.
    #[error("failed to map read-back buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    /// Waiting on the device failed.
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),

    /// Read-back produced bytes that do not decode as the pipeline's output.
    #[error("malformed pipeline output: {0}")]
    MalformedOutput(String),
}
