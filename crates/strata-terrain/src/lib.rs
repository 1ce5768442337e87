//! Streamed SDF terrain and vegetation generation: biome classification,
//! region generation on a compute backend, caching, request scheduling,
//! sculpting and placement.

mod cache;
mod editor;
mod error;
mod events;
mod generator;
mod region;
mod scheduler;
mod telemetry;
mod vegetation;
mod world;

pub mod biome;

pub use biome::{BiomeEntry, BiomeId, BiomeSampler, HeightAndMaterialRules, MaterialId, WorldContext, WorldMap};
pub use cache::{CacheGuard, RegionCache};
pub use editor::{RegionEdit, apply_flatten, apply_smooth};
pub use error::{SchedulerError, TerrainError};
pub use events::RegionEvent;
pub use generator::{GeneratedRegion, RegionGenerator, SUBSURFACE_BAND, SURFACE_BAND};
pub use region::{EDIT_DIRTY, MESH_DIRTY, RegionBuffer, RegionKey};
pub use scheduler::{RegionBufferCache, RegionRequestScheduler, RequestOutcome, TickReport};
pub use telemetry::{DEFAULT_DISPATCH_ESTIMATE_MS, TelemetryCollector, TelemetrySnapshot};
pub use vegetation::{
    HeightRange, PlacementKey, PlacementRecord, PlacementRequest, PlacementTiming,
    VegetationPlacementGenerator, VegetationRules, VegetationType,
};
pub use world::TerrainWorld;
