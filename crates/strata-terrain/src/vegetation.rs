//! Vegetation placement: jittered-grid candidates on the placement pipeline,
//! cached per `(region origin, vegetation type)`.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use glam::{IVec3, Vec3};
use serde::Serialize;
use strata_compute::{
    ComputeBackend, DispatchParams, MAX_GRID_STEPS, MAX_PLACEMENTS, PipelineId, PlacementParams,
    RawPlacement, ResourceHandle, decode_placements,
};
use strata_config::VegetationConfig;

use crate::biome::BiomeId;
use crate::cache::RegionCache;
use crate::error::TerrainError;
use crate::region::{RegionBuffer, RegionKey};

/// One placed instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementRecord {
    pub position: Vec3,
    pub rotation_y: f32,
    pub scale: f32,
    pub vegetation_type: u32,
    /// Surface normal under the instance.
    pub normal: Vec3,
}

impl PlacementRecord {
    /// Surface slope in degrees, derived from the normal.
    pub fn slope_deg(&self) -> f32 {
        self.normal
            .normalize_or(Vec3::Y)
            .y
            .clamp(-1.0, 1.0)
            .acos()
            .to_degrees()
    }
}

impl From<RawPlacement> for PlacementRecord {
    fn from(raw: RawPlacement) -> Self {
        Self {
            position: Vec3::from_array(raw.position),
            rotation_y: raw.rotation_y,
            scale: raw.scale,
            vegetation_type: raw.vegetation_type,
            normal: Vec3::from_array(raw.normal),
        }
    }
}

/// Accepted world-height range for placements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightRange {
    pub min: f32,
    pub max: f32,
}

impl Default for HeightRange {
    fn default() -> Self {
        Self {
            min: -100.0,
            max: 500.0,
        }
    }
}

/// Inputs for one placement pass over a full-resolution region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementRequest {
    pub origin: IVec3,
    pub vegetation_type: u32,
    /// Fraction of candidates kept, in `[0, 1]`.
    pub density: f32,
    pub grid_spacing: f32,
    pub noise_frequency: f32,
    pub slope_max_deg: f32,
    pub height_range: HeightRange,
    pub world_seed: u64,
    /// Biome map uploaded to the same backend.
    pub biome_map: ResourceHandle,
}

impl PlacementRequest {
    /// A request with everyday defaults for the given type.
    pub fn new(origin: IVec3, vegetation_type: u32, world_seed: u64, biome_map: ResourceHandle) -> Self {
        Self {
            origin,
            vegetation_type,
            density: 0.5,
            grid_spacing: 2.0,
            noise_frequency: 0.1,
            slope_max_deg: 35.0,
            height_range: HeightRange::default(),
            world_seed,
            biome_map,
        }
    }

    /// The region this request reads.
    pub fn region_key(&self) -> RegionKey {
        RegionKey::new(self.origin, 0)
    }

    fn cache_key(&self) -> PlacementKey {
        PlacementKey {
            origin: self.origin,
            vegetation_type: self.vegetation_type,
        }
    }
}

/// Cache key of a placement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlacementKey {
    pub origin: IVec3,
    pub vegetation_type: u32,
}

/// Built-in vegetation types.
pub struct VegetationType;

impl VegetationType {
    pub const GRASS: u32 = 0;
    pub const TREE: u32 = 1;
    pub const BUSH: u32 = 2;
    pub const ROCK: u32 = 3;
    pub const CACTUS: u32 = 4;

    pub const ALL: [u32; 5] = [Self::GRASS, Self::TREE, Self::BUSH, Self::ROCK, Self::CACTUS];
}

const fn mask(ids: &[BiomeId]) -> u32 {
    let mut m = 0;
    let mut i = 0;
    while i < ids.len() {
        m |= 1 << ids[i].0;
        i += 1;
    }
    m
}

/// Which biomes permit which vegetation type.
///
/// Types without an entry are permitted everywhere.
#[derive(Debug, Clone)]
pub struct VegetationRules {
    masks: Vec<(u32, u32)>,
}

impl Default for VegetationRules {
    fn default() -> Self {
        use BiomeId as B;
        Self {
            masks: vec![
                (
                    VegetationType::GRASS,
                    mask(&[
                        B::PLAINS, B::FOREST, B::SWAMP, B::JUNGLE, B::SAVANNA, B::TAIGA, B::HILLS,
                        B::MEADOW,
                    ]),
                ),
                (
                    VegetationType::TREE,
                    mask(&[B::FOREST, B::SWAMP, B::JUNGLE, B::SAVANNA, B::TAIGA, B::HILLS]),
                ),
                (
                    VegetationType::BUSH,
                    mask(&[
                        B::PLAINS, B::FOREST, B::SAVANNA, B::HILLS, B::BADLANDS, B::MEADOW,
                        B::MUSHROOM,
                    ]),
                ),
                (
                    VegetationType::ROCK,
                    mask(&[
                        B::PLAINS, B::DESERT, B::TUNDRA, B::BEACH, B::MOUNTAINS, B::HILLS,
                        B::BADLANDS, B::VOLCANIC,
                    ]),
                ),
                (VegetationType::CACTUS, mask(&[B::DESERT, B::BADLANDS])),
            ],
        }
    }
}

impl VegetationRules {
    /// Rules with no entries: every type is permitted everywhere.
    pub fn permissive() -> Self {
        Self { masks: Vec::new() }
    }

    /// Replace or add the biome mask for a type.
    pub fn set_mask(&mut self, vegetation_type: u32, biome_mask: u32) {
        match self.masks.iter_mut().find(|(t, _)| *t == vegetation_type) {
            Some(entry) => entry.1 = biome_mask,
            None => self.masks.push((vegetation_type, biome_mask)),
        }
    }

    /// Bit `n` set = biome `n` permits the type.
    pub fn biome_mask(&self, vegetation_type: u32) -> u32 {
        self.masks
            .iter()
            .find(|(t, _)| *t == vegetation_type)
            .map_or(u32::MAX, |(_, m)| *m)
    }

    pub fn permits(&self, vegetation_type: u32, biome: BiomeId) -> bool {
        biome.0 < 32 && self.biome_mask(vegetation_type) & (1 << biome.0) != 0
    }
}

/// One cached placement set and the backend buffer it was read from.
#[derive(Debug, Clone)]
pub(crate) struct CachedPlacements {
    records: Arc<[PlacementRecord]>,
    buffer: ResourceHandle,
}

/// Per-type timing of placement passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlacementTiming {
    pub last_ms: f32,
    pub average_ms: f32,
    pub total_ms: f64,
    pub calls: u64,
}

impl PlacementTiming {
    fn record(&mut self, ms: f32) {
        self.last_ms = ms;
        self.total_ms += ms as f64;
        self.calls += 1;
        self.average_ms = (self.total_ms / self.calls as f64) as f32;
    }
}

/// Computes and caches vegetation placements.
pub struct VegetationPlacementGenerator {
    backend: Arc<dyn ComputeBackend>,
    rules: VegetationRules,
    config: VegetationConfig,
    world_size: f32,
    chunk_size: u32,
    /// Records and buffer handles share one entry so they evict together.
    cache: RegionCache<PlacementKey, CachedPlacements>,
    timing: DashMap<u32, PlacementTiming>,
}

impl VegetationPlacementGenerator {
    pub fn new(
        backend: Arc<dyn ComputeBackend>,
        rules: VegetationRules,
        config: VegetationConfig,
        world_size: f32,
        chunk_size: u32,
        max_cache_entries: usize,
    ) -> Self {
        Self {
            backend,
            rules,
            config,
            world_size,
            chunk_size,
            cache: RegionCache::new(max_cache_entries),
            timing: DashMap::new(),
        }
    }

    pub fn rules(&self) -> &VegetationRules {
        &self.rules
    }

    /// Placement parameters for a request.
    pub fn placement_params(&self, request: &PlacementRequest) -> PlacementParams {
        let extent = self.chunk_size as f32;
        let grid_steps = (extent / request.grid_spacing).ceil().max(1.0) as u32;
        let seed = request.world_seed;
        let origin = request.origin.as_vec3();
        PlacementParams {
            origin_x: origin.x,
            origin_y: origin.y,
            origin_z: origin.z,
            grid_spacing: request.grid_spacing,
            chunk_size: self.chunk_size,
            grid_steps,
            seed: (seed ^ (seed >> 32)) as u32,
            vegetation_type: request.vegetation_type,
            density: request.density.clamp(0.0, 1.0),
            noise_frequency: request.noise_frequency,
            slope_max_deg: request.slope_max_deg,
            height_min: request.height_range.min,
            height_max: request.height_range.max,
            scale_min: self.config.scale_min,
            scale_max: self.config.scale_max,
            allowed_biome_mask: self.rules.biome_mask(request.vegetation_type),
            world_size: self.world_size,
            step: 1.0,
            max_placements: MAX_PLACEMENTS,
            _pad: 0,
        }
    }

    /// Placements for `request` over `region`, cached per origin and type.
    pub fn generate(
        &self,
        request: &PlacementRequest,
        region: &RegionBuffer,
    ) -> Result<Arc<[PlacementRecord]>, TerrainError> {
        let key = request.cache_key();
        if let Some(entry) = self.cache.get(&key) {
            return Ok(entry.records);
        }
        if !(request.grid_spacing.is_finite() && request.grid_spacing > 0.0) {
            return Err(TerrainError::InvalidRequest(format!(
                "grid spacing must be positive, got {}",
                request.grid_spacing
            )));
        }
        let grid_steps = (self.chunk_size as f32 / request.grid_spacing).ceil();
        if grid_steps > MAX_GRID_STEPS as f32 {
            return Err(TerrainError::InvalidRequest(format!(
                "grid spacing {} needs {grid_steps} steps per axis, above {MAX_GRID_STEPS}",
                request.grid_spacing
            )));
        }
        if region.key != request.region_key() || region.size != self.chunk_size {
            return Err(TerrainError::InvalidRequest(format!(
                "region {} does not match request origin {}",
                region.key, request.origin
            )));
        }

        let started = Instant::now();
        let params = self.placement_params(request);
        let sdf = self.backend.upload_buffer(bytemuck::cast_slice(&region.sdf))?;
        let dispatched = self.backend.dispatch(
            PipelineId::Placement,
            &DispatchParams::Placement(params),
            &[sdf, request.biome_map],
        );
        self.backend.release(sdf);
        let output = dispatched?;
        let decoded = self
            .backend
            .read_back(output)
            .map_err(TerrainError::from)
            .and_then(|bytes| Ok(decode_placements(&bytes, params.max_placements)?));
        let records: Arc<[PlacementRecord]> = match decoded {
            Ok(raw) => raw.into_iter().map(PlacementRecord::from).collect(),
            Err(e) => {
                self.backend.release(output);
                return Err(e);
            }
        };

        let ms = started.elapsed().as_secs_f32() * 1000.0;
        self.timing
            .entry(request.vegetation_type)
            .or_default()
            .record(ms);
        tracing::debug!(
            "Placed {} instances of type {} in region {} ({ms:.2} ms)",
            records.len(),
            request.vegetation_type,
            request.origin
        );

        let entry = CachedPlacements {
            records: Arc::clone(&records),
            buffer: output,
        };
        for (_, dropped) in self.cache.put(key, entry) {
            if dropped.buffer != output {
                self.backend.release(dropped.buffer);
            }
        }
        Ok(records)
    }

    /// Whether placements for the pair are cached.
    pub fn is_ready(&self, origin: IVec3, vegetation_type: u32) -> bool {
        self.cache.contains(&PlacementKey {
            origin,
            vegetation_type,
        })
    }

    /// Cached placement count, or 0 when nothing is cached.
    pub fn placement_count(&self, origin: IVec3, vegetation_type: u32) -> usize {
        self.cache
            .peek(&PlacementKey {
                origin,
                vegetation_type,
            })
            .map_or(0, |e| e.records.len())
    }

    /// Cached placements without generating.
    pub fn cached(&self, origin: IVec3, vegetation_type: u32) -> Option<Arc<[PlacementRecord]>> {
        self.cache
            .get(&PlacementKey {
                origin,
                vegetation_type,
            })
            .map(|e| e.records)
    }

    /// Backend output buffer of a cached pair, for GPU-side instancing.
    pub fn buffer_handle(&self, origin: IVec3, vegetation_type: u32) -> Option<ResourceHandle> {
        self.cache
            .peek(&PlacementKey {
                origin,
                vegetation_type,
            })
            .map(|e| e.buffer)
    }

    /// Drop every placement set of a region, e.g. after an edit.
    pub fn invalidate_region(&self, origin: IVec3) -> usize {
        let removed = self.cache.remove_where(|k| k.origin == origin);
        for (_, entry) in &removed {
            self.backend.release(entry.buffer);
        }
        removed.len()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn set_max_entries(&self, max_entries: usize) {
        for (_, entry) in self.cache.set_max_entries(max_entries) {
            self.backend.release(entry.buffer);
        }
    }

    /// Timing per vegetation type, sorted by type.
    pub fn timing_stats(&self) -> Vec<(u32, PlacementTiming)> {
        let mut stats: Vec<_> = self.timing.iter().map(|e| (*e.key(), *e.value())).collect();
        stats.sort_by_key(|(t, _)| *t);
        stats
    }

    /// Total placement passes across all types.
    pub fn total_calls(&self) -> u64 {
        self.timing.iter().map(|e| e.value().calls).sum()
    }

    pub fn reset_timing_stats(&self) {
        self.timing.clear();
    }

    /// Drop all cached placements and release their buffers.
    pub fn clear(&self) {
        for (_, entry) in self.cache.clear() {
            self.backend.release(entry.buffer);
        }
    }

    pub(crate) fn placement_cache(&self) -> &RegionCache<PlacementKey, CachedPlacements> {
        &self.cache
    }

    /// Free the buffers of entries removed through [`Self::placement_cache`].
    pub(crate) fn release_entries(&self, entries: Vec<(PlacementKey, CachedPlacements)>) {
        for (_, entry) in entries {
            self.backend.release(entry.buffer);
        }
    }
}
