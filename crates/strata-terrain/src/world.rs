//! `TerrainWorld`: the entry point that owns every generation component.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, unbounded};
use glam::{IVec3, Vec3};
use strata_compute::{BackendKind, ComputeBackend, ResourceHandle, select_backend};
use strata_config::Config;

use crate::biome::{BiomeId, BiomeSampler, HeightAndMaterialRules, WorldContext, WorldMap};
use crate::editor::RegionEdit;
use crate::error::TerrainError;
use crate::events::RegionEvent;
use crate::generator::RegionGenerator;
use crate::region::{RegionBuffer, RegionKey};
use crate::scheduler::{RegionBufferCache, RegionRequestScheduler, RequestOutcome, TickReport};
use crate::telemetry::{TelemetryCollector, TelemetrySnapshot};
use crate::vegetation::{
    HeightRange, PlacementRecord, PlacementRequest, PlacementTiming, VegetationPlacementGenerator,
    VegetationRules,
};

/// Streamed terrain and vegetation for one world.
pub struct TerrainWorld {
    config: Config,
    context: Arc<WorldContext>,
    rules: Arc<HeightAndMaterialRules>,
    sampler: Arc<BiomeSampler>,
    backend: Arc<dyn ComputeBackend>,
    regions: Arc<RegionBufferCache>,
    vegetation: VegetationPlacementGenerator,
    telemetry: Arc<TelemetryCollector>,
    scheduler: Mutex<RegionRequestScheduler>,
    events: Receiver<RegionEvent>,
    biome_map: Mutex<ResourceHandle>,
}

impl TerrainWorld {
    /// Build a world on the backend chosen by `config.compute`.
    pub fn new(config: Config) -> Result<Self, TerrainError> {
        let backend = select_backend(config.compute.prefer_gpu);
        Self::with_backend(config, backend)
    }

    /// Build a world on an explicit backend.
    pub fn with_backend(config: Config, backend: Arc<dyn ComputeBackend>) -> Result<Self, TerrainError> {
        let terrain = &config.terrain;
        let context = Arc::new(WorldContext::new(
            terrain.world_size,
            terrain.world_seed,
            terrain.chunk_size,
            None,
        ));
        if let Some(path) = &terrain.world_map {
            context.load_world_map(path);
        }

        let rules = Arc::new(HeightAndMaterialRules::default());
        let sampler = Arc::new(BiomeSampler::new(
            Arc::clone(&context),
            config.cache.biome_cache_entries,
        ));
        let generator = Arc::new(RegionGenerator::new(
            terrain.clone(),
            Arc::clone(&sampler),
            Arc::clone(&rules),
            Arc::clone(&backend),
        ));
        let regions = Arc::new(RegionBufferCache::new(config.cache.max_cache_entries));
        let vegetation = VegetationPlacementGenerator::new(
            Arc::clone(&backend),
            VegetationRules::default(),
            config.vegetation.clone(),
            terrain.world_size,
            terrain.chunk_size,
            config.cache.max_cache_entries,
        );
        let telemetry = Arc::new(TelemetryCollector::new(
            backend.kind(),
            config.scheduler.frame_budget_ms,
        ));
        let (event_tx, events) = unbounded();
        let scheduler = RegionRequestScheduler::new(
            config.scheduler.clone(),
            generator,
            Arc::clone(&regions),
            Arc::clone(&telemetry),
            event_tx,
        )?;
        let biome_map = upload_world_map(backend.as_ref(), context.world_map().as_deref())?;

        tracing::info!(
            "Terrain world ready: seed={} chunk_size={} backend={}",
            terrain.world_seed,
            terrain.chunk_size,
            backend.kind()
        );

        Ok(Self {
            config,
            context,
            rules,
            sampler,
            backend,
            regions,
            vegetation,
            telemetry,
            scheduler: Mutex::new(scheduler),
            events,
            biome_map: Mutex::new(biome_map),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend_status(&self) -> String {
        self.backend.status()
    }

    pub fn rules(&self) -> &HeightAndMaterialRules {
        &self.rules
    }

    fn scheduler(&self) -> MutexGuard<'_, RegionRequestScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for a region. The answer arrives as a [`RegionEvent`].
    pub fn request_region(&self, origin: IVec3, detail_level: u8) -> Result<RequestOutcome, TerrainError> {
        Ok(self
            .scheduler()
            .request(RegionKey::new(origin, detail_level))?)
    }

    /// Advance generation by one frame.
    pub fn tick(&self) -> Result<TickReport, TerrainError> {
        Ok(self.scheduler().tick()?)
    }

    /// Order queued work by distance to `pos`.
    pub fn set_focus(&self, pos: Vec3) {
        self.scheduler().set_focus(pos);
    }

    /// Receiver for completion events.
    pub fn events(&self) -> Receiver<RegionEvent> {
        self.events.clone()
    }

    /// Every event received so far.
    pub fn drain_events(&self) -> Vec<RegionEvent> {
        self.events.try_iter().collect()
    }

    /// Name of the biome at a world position.
    pub fn biome_at(&self, world_pos: Vec3) -> &'static str {
        self.rules.name(self.sampler.biome_at(world_pos))
    }

    pub fn biome_id_at(&self, world_pos: Vec3) -> BiomeId {
        self.sampler.biome_at(world_pos)
    }

    pub fn biome_name(&self, id: BiomeId) -> &'static str {
        self.rules.name(id)
    }

    /// A cached region buffer.
    pub fn region(&self, key: RegionKey) -> Option<Arc<RegionBuffer>> {
        self.regions.get(&key)
    }

    pub fn is_region_ready(&self, key: RegionKey) -> bool {
        self.regions.contains(&key)
    }

    /// Apply a brush to a cached region. The cached buffer is replaced by an
    /// edited copy if anyone else still holds the old one.
    pub fn edit_region(&self, key: RegionKey, edit: RegionEdit) -> Result<usize, TerrainError> {
        let modified = self
            .regions
            .update(&key, |buffer| edit.apply(Arc::make_mut(buffer)))
            .ok_or(TerrainError::RegionNotReady(key))?;
        if modified > 0 && key.detail_level == 0 {
            self.vegetation.invalidate_region(key.origin);
        }
        tracing::debug!("Edited region {key}: {modified} cells");
        Ok(modified)
    }

    /// Handle of the uploaded biome map, for placement requests.
    pub fn biome_map_handle(&self) -> ResourceHandle {
        *self.biome_map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A placement request with this world's seed, biome map and default
    /// height range.
    pub fn placement_request(&self, origin: IVec3, vegetation_type: u32) -> PlacementRequest {
        PlacementRequest {
            height_range: HeightRange {
                min: self.config.vegetation.height_min,
                max: self.config.vegetation.height_max,
            },
            ..PlacementRequest::new(
                origin,
                vegetation_type,
                self.config.terrain.world_seed,
                self.biome_map_handle(),
            )
        }
    }

    /// Placements over a generated full-resolution region.
    pub fn generate_placements(&self, request: &PlacementRequest) -> Result<Arc<[PlacementRecord]>, TerrainError> {
        if let Some(records) = self.vegetation.cached(request.origin, request.vegetation_type) {
            return Ok(records);
        }
        let key = request.region_key();
        let region = self
            .regions
            .get(&key)
            .ok_or(TerrainError::RegionNotReady(key))?;
        self.vegetation.generate(request, &region)
    }

    pub fn is_placement_ready(&self, origin: IVec3, vegetation_type: u32) -> bool {
        self.vegetation.is_ready(origin, vegetation_type)
    }

    pub fn placement_count(&self, origin: IVec3, vegetation_type: u32) -> usize {
        self.vegetation.placement_count(origin, vegetation_type)
    }

    pub fn placement_buffer(&self, origin: IVec3, vegetation_type: u32) -> Option<ResourceHandle> {
        self.vegetation.buffer_handle(origin, vegetation_type)
    }

    /// Per-type placement timing.
    pub fn placement_stats(&self) -> Vec<(u32, PlacementTiming)> {
        self.vegetation.timing_stats()
    }

    pub fn reset_placement_stats(&self) {
        self.vegetation.reset_timing_stats();
    }

    /// Clear regions, biome classifications and placements together.
    pub fn clear_cache(&self) {
        let released = {
            // Fixed order: regions, biomes, placements.
            let mut regions = self.regions.lock();
            let mut biomes = self.sampler.cache().lock();
            let mut placements = self.vegetation.placement_cache().lock();
            regions.clear();
            biomes.clear();
            placements.clear()
        };
        self.vegetation.release_entries(released);
        tracing::debug!("Cleared terrain caches");
    }

    /// Resize the region and placement caches.
    pub fn set_max_cache_entries(&self, max_entries: usize) {
        self.regions.set_max_entries(max_entries);
        self.vegetation.set_max_entries(max_entries);
    }

    /// Swap the world map, drop all queued work and cached data, and upload
    /// the new map to the backend.
    pub fn reload_world(&self, map: Option<WorldMap>) -> Result<(), TerrainError> {
        let mut scheduler = self.scheduler();
        scheduler.reset();
        self.context.set_world_map(map);
        self.clear_cache();

        let handle = upload_world_map(self.backend.as_ref(), self.context.world_map().as_deref())?;
        let old = std::mem::replace(
            &mut *self.biome_map.lock().unwrap_or_else(PoisonError::into_inner),
            handle,
        );
        self.backend.release(old);
        tracing::info!("World reloaded");
        Ok(())
    }

    /// Reload from an image file. A missing or unreadable file falls back to
    /// the default biome everywhere.
    pub fn reload_world_from_path(&self, path: &Path) -> Result<(), TerrainError> {
        let map = match WorldMap::load(path) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!("{e}; using the default biome everywhere");
                None
            }
        };
        self.reload_world(map)
    }

    pub fn get_telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot(self.regions.len())
    }
}

impl Drop for TerrainWorld {
    fn drop(&mut self) {
        self.vegetation.clear();
        let handle = *self.biome_map.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.backend.release(handle);
    }
}

fn upload_world_map(
    backend: &dyn ComputeBackend,
    map: Option<&WorldMap>,
) -> Result<ResourceHandle, TerrainError> {
    let handle = match map {
        Some(map) => backend.upload_biome_map(map.width(), map.height(), map.pixels())?,
        // One plains pixel keeps the placement pipeline's inputs uniform.
        None => backend.upload_biome_map(1, 1, &[BiomeId::PLAINS.0])?,
    };
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_compute::CpuBackend;

    use crate::error::SchedulerError;
    use crate::region::MESH_DIRTY;
    use crate::vegetation::VegetationType;

    fn config() -> Config {
        let mut config = Config::default();
        config.terrain.chunk_size = 16;
        config.terrain.noise.amplitude = 0.0;
        config.scheduler.worker_threads = Some(0);
        config.compute.prefer_gpu = false;
        config
    }

    fn world_with(map: Option<WorldMap>) -> (Arc<CpuBackend>, TerrainWorld) {
        let backend = Arc::new(CpuBackend::new());
        let world = TerrainWorld::with_backend(config(), backend.clone()).unwrap();
        if map.is_some() {
            world.reload_world(map).unwrap();
        }
        (backend, world)
    }

    fn origin() -> IVec3 {
        IVec3::new(0, -8, 0)
    }

    fn generate(world: &TerrainWorld, origin: IVec3) {
        world.request_region(origin, 0).unwrap();
        world.tick().unwrap();
        assert!(world.is_region_ready(RegionKey::new(origin, 0)));
    }

    #[test]
    fn test_second_request_served_from_cache() {
        let (_, world) = world_with(None);
        world.request_region(IVec3::ZERO, 0).unwrap();
        world.tick().unwrap();
        let before = world.get_telemetry().total_generated;
        assert_eq!(before, 1);

        assert_eq!(
            world.request_region(IVec3::ZERO, 0).unwrap(),
            RequestOutcome::Cached
        );
        world.tick().unwrap();
        assert_eq!(world.get_telemetry().total_generated, before);

        let generated = world
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, RegionEvent::Generated { origin, biome_id, .. }
                if *origin == IVec3::ZERO && *biome_id == BiomeId::PLAINS))
            .count();
        assert_eq!(generated, 2);
    }

    #[test]
    fn test_coarse_region_is_cached_without_event() {
        let (_, world) = world_with(None);
        world.request_region(IVec3::ZERO, 1).unwrap();
        world.tick().unwrap();
        assert!(world.is_region_ready(RegionKey::new(IVec3::ZERO, 1)));
        assert_eq!(
            world.request_region(IVec3::ZERO, 1).unwrap(),
            RequestOutcome::Cached
        );
        assert!(world.drain_events().is_empty());
    }

    #[test]
    fn test_unaddressable_region_is_rejected() {
        let (_, world) = world_with(None);
        assert!(matches!(
            world.request_region(IVec3::ZERO, 30),
            Err(TerrainError::Scheduler(SchedulerError::UnaddressableRegion {
                chunk_size: 16,
                ..
            }))
        ));
        generate(&world, IVec3::ZERO);
    }

    #[test]
    fn test_clear_cache_resamples_biomes() {
        let (_, world) = world_with(Some(WorldMap::uniform(4, 4, BiomeId::DESERT.0).unwrap()));
        let p = Vec3::new(10.0, 0.0, 10.0);
        assert_eq!(world.biome_at(p), "desert");
        assert_eq!(world.biome_name(world.biome_id_at(p)), "desert");

        world
            .context
            .set_world_map(Some(WorldMap::uniform(4, 4, BiomeId::FOREST.0).unwrap()));
        assert_eq!(world.biome_at(p), "desert");

        world.clear_cache();
        assert_eq!(world.biome_at(p), "forest");
    }

    #[test]
    fn test_placements_require_generated_region() {
        let (_, world) = world_with(None);
        let mut request = world.placement_request(origin(), VegetationType::GRASS);
        request.density = 1.0;
        assert!(matches!(
            world.generate_placements(&request),
            Err(TerrainError::RegionNotReady(_))
        ));

        generate(&world, origin());
        let first = world.generate_placements(&request).unwrap();
        assert!(!first.is_empty());
        for r in first.iter() {
            assert!(r.position.y.abs() < 1e-4);
        }
        let second = world.generate_placements(&request).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(world.is_placement_ready(origin(), VegetationType::GRASS));
        assert_eq!(world.placement_count(origin(), VegetationType::GRASS), first.len());
        assert!(world.placement_buffer(origin(), VegetationType::GRASS).is_some());
        assert_eq!(world.placement_stats().len(), 1);
    }

    #[test]
    fn test_edit_copies_shared_buffer_and_invalidates_placements() {
        let (_, world) = world_with(None);
        generate(&world, origin());
        let key = RegionKey::new(origin(), 0);
        let mut request = world.placement_request(origin(), VegetationType::GRASS);
        request.density = 1.0;
        world.generate_placements(&request).unwrap();

        let before = world.region(key).unwrap();
        let modified = world
            .edit_region(
                key,
                RegionEdit::Flatten {
                    center: IVec3::splat(8),
                    radius: 4.0,
                    target_world_height: 3.0,
                    strength: 1.0,
                },
            )
            .unwrap();
        assert!(modified > 0);

        let after = world.region(key).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(!before.is_dirty(MESH_DIRTY));
        assert!(after.is_dirty(MESH_DIRTY));
        assert_ne!(before.sdf, after.sdf);
        assert!(!world.is_placement_ready(origin(), VegetationType::GRASS));
    }

    #[test]
    fn test_edit_missing_region_fails() {
        let (_, world) = world_with(None);
        let key = RegionKey::new(IVec3::new(160, 0, 0), 0);
        let edit = RegionEdit::Smooth {
            center: IVec3::ZERO,
            radius: 1.0,
            strength: 1.0,
        };
        assert!(matches!(
            world.edit_region(key, edit),
            Err(TerrainError::RegionNotReady(k)) if k == key
        ));
    }

    #[test]
    fn test_reload_world_drops_everything() {
        let (backend, world) = world_with(None);
        generate(&world, origin());
        world.request_region(IVec3::new(64, -8, 0), 0).unwrap();
        let old_handle = world.biome_map_handle();

        world
            .reload_world(Some(WorldMap::uniform(2, 2, BiomeId::TUNDRA.0).unwrap()))
            .unwrap();
        assert!(!world.is_region_ready(RegionKey::new(origin(), 0)));
        assert_eq!(world.scheduler().pending(), 0);
        assert_ne!(world.biome_map_handle(), old_handle);
        assert!(backend.read_back(old_handle).is_err());
        assert_eq!(world.biome_at(Vec3::ZERO), "tundra");
    }

    #[test]
    fn test_cache_capacity_is_enforced() {
        let (_, world) = world_with(None);
        world.set_max_cache_entries(2);
        for i in 0..4 {
            generate(&world, IVec3::new(i * 16, -8, 0));
        }
        assert_eq!(world.get_telemetry().cached_count, 2);
    }

    #[test]
    fn test_telemetry_snapshot_reports_backend_and_budget() {
        let (_, world) = world_with(None);
        world.request_region(IVec3::ZERO, 0).unwrap();
        world.request_region(IVec3::new(16, 0, 0), 0).unwrap();
        let snap = world.get_telemetry();
        assert_eq!(snap.queue_size, 2);
        assert_eq!(snap.backend, "cpu");
        assert_eq!(snap.frame_budget_ms, 8.0);

        world.tick().unwrap();
        let snap = world.get_telemetry();
        assert_eq!(snap.queue_size, 0);
        assert_eq!(snap.in_flight, 0);
        assert_eq!(snap.total_generated, 2);
        assert_eq!(snap.dispatched_this_frame, 2);
        assert_eq!(snap.cached_count, 2);
    }
}
