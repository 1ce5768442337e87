//! The backend abstraction and backend selection.

use std::sync::Arc;

use crate::cpu::CpuBackend;
use crate::error::ComputeError;
use crate::gpu::GpuBackend;
use crate::params::{DispatchParams, MAX_GRID_STEPS, PipelineId};

/// Opaque handle to a buffer or texture owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub u64);

/// Which implementation is behind a `dyn ComputeBackend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gpu,
    Cpu,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Gpu => "gpu",
            BackendKind::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compute device able to run the density and placement pipelines.
///
/// `dispatch` returns as soon as the work is queued; `read_back` is the
/// point where the caller waits for it. Implementations serialize access to
/// the underlying device internally, so one backend can be shared across
/// worker threads.
pub trait ComputeBackend: Send + Sync {
    /// Implementation kind.
    fn kind(&self) -> BackendKind;

    /// Whether dispatches can currently succeed.
    fn is_available(&self) -> bool;

    /// Human-readable device description.
    fn status(&self) -> String;

    /// Upload raw bytes as a storage buffer.
    fn upload_buffer(&self, bytes: &[u8]) -> Result<ResourceHandle, ComputeError>;

    /// Upload a single-channel 8-bit biome map, row-major.
    fn upload_biome_map(
        &self,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<ResourceHandle, ComputeError>;

    /// Queue one pipeline run and return the handle of its output buffer.
    fn dispatch(
        &self,
        pipeline: PipelineId,
        params: &DispatchParams,
        inputs: &[ResourceHandle],
    ) -> Result<ResourceHandle, ComputeError>;

    /// Wait for a buffer's contents and copy them to host memory.
    fn read_back(&self, handle: ResourceHandle) -> Result<Vec<u8>, ComputeError>;

    /// Free a resource. Unknown handles are ignored.
    fn release(&self, handle: ResourceHandle);

    /// Wall time of the most recent completed dispatch, in milliseconds.
    fn last_dispatch_time_ms(&self) -> f32;
}

/// Validate a dispatch against its pipeline before any work is queued.
pub(crate) fn check_dispatch(
    pipeline: PipelineId,
    params: &DispatchParams,
    inputs: &[ResourceHandle],
) -> Result<(), ComputeError> {
    if params.pipeline() != pipeline {
        return Err(ComputeError::ParamsMismatch(pipeline));
    }
    let expected = pipeline.input_count();
    if inputs.len() != expected {
        return Err(ComputeError::InputCount {
            pipeline,
            expected,
            got: inputs.len(),
        });
    }
    if let DispatchParams::Placement(p) = params
        && p.grid_steps > MAX_GRID_STEPS
    {
        return Err(ComputeError::GridTooLarge {
            grid_steps: p.grid_steps,
            max: MAX_GRID_STEPS,
        });
    }
    Ok(())
}

/// Pick a backend: a GPU device when `prefer_gpu` is set and an adapter is
/// found, otherwise the CPU implementation.
pub fn select_backend(prefer_gpu: bool) -> Arc<dyn ComputeBackend> {
    if prefer_gpu {
        match GpuBackend::new_blocking() {
            Ok(gpu) => {
                tracing::info!("Compute backend: {}", gpu.status());
                return Arc::new(gpu);
            }
            Err(e) => {
                tracing::warn!("GPU compute unavailable ({e}), falling back to CPU backend");
            }
        }
    }
    let cpu = CpuBackend::new();
    tracing::info!("Compute backend: {}", cpu.status());
    Arc::new(cpu)
}
