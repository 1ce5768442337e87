//! Terrain error types.

use std::path::PathBuf;

use strata_compute::ComputeError;

use crate::region::RegionKey;

/// Errors raised while generating, caching or editing regions.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    /// A backend dispatch or read-back failed.
    #[error("compute backend error: {0}")]
    Compute(#[from] ComputeError),

    /// The world map file could not be opened or decoded.
    #[error("failed to load world map {path}: {source}")]
    WorldMap {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// World map dimensions and pixel data disagree.
    #[error("invalid world map: {0}")]
    InvalidWorldMap(String),

    /// A placement request carried unusable parameters.
    #[error("invalid placement request: {0}")]
    InvalidRequest(String),

    /// The region is not in the cache.
    #[error("region {0} is not generated")]
    RegionNotReady(RegionKey),

    /// One attempt ran longer than the stage timeout.
    #[error("region {key} exceeded the {timeout_ms} ms stage timeout")]
    StageTimeout { key: RegionKey, timeout_ms: u64 },

    /// Every attempt failed; the last failure is kept for diagnostics.
    #[error("region {key} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        key: RegionKey,
        attempts: u32,
        last_error: String,
    },

    /// The request scheduler rejected or aborted the work.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Errors raised by the request scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Too many completion callbacks in one pass; the pass was aborted.
    #[error("generation pass aborted after {callbacks} callbacks (ceiling {ceiling})")]
    RunawayCallbacks { callbacks: u32, ceiling: u32 },

    /// The region's extent or neighbour origins overflow `i32`.
    #[error("region {key} is outside the addressable world at chunk size {chunk_size}")]
    UnaddressableRegion { key: RegionKey, chunk_size: u32 },

    /// A worker thread could not be started.
    #[error("failed to spawn generation worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
