//! Pure Rust versions of the compute pipelines.
//!
//! These run inside [`CpuBackend`](crate::CpuBackend) and mirror the WGSL in
//! `src/shaders/` operation for operation, so either backend honours the same
//! output contract.

pub mod density;
pub mod noise;
pub mod placement;

pub use density::{density_field, surface_height};
pub use placement::{BiomeMapView, column_surface, placements};

/// Flat index of cell `(x, y, z)` in a cube of edge `size`.
#[inline]
pub fn cell_index(size: usize, x: usize, y: usize, z: usize) -> usize {
    x + size * (y + size * z)
}
