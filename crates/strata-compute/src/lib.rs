//! Compute backends for strata terrain generation.
//!
//! [`ComputeBackend`] hides whether the density and placement pipelines run on
//! a GPU (wgpu + WGSL, [`GpuBackend`]) or on the host ([`CpuBackend`]). Both
//! produce the same output layout: one `f32` per cell for density, a counted
//! array of [`RawPlacement`] records for placement. [`select_backend`] tries
//! the GPU first and falls back to the CPU with a single warning.

mod backend;
mod cpu;
mod error;
mod gpu;
pub mod kernels;
mod params;

pub use backend::{BackendKind, ComputeBackend, ResourceHandle, select_backend};
pub use cpu::CpuBackend;
pub use error::ComputeError;
pub use gpu::GpuBackend;
pub use params::{
    DensityParams, DispatchParams, MAX_GRID_STEPS, MAX_PLACEMENTS, PLACEMENT_HEADER_BYTES,
    PLACEMENT_RECORD_BYTES,
    PipelineId, PlacementParams, RawPlacement, decode_density, decode_placements,
};
