//! World-map biome classification with a per-region cache.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use glam::{IVec3, Vec3};

use super::{BiomeId, WorldMap};
use crate::cache::RegionCache;
use crate::region::RegionKey;

/// World-wide inputs shared by the sampler and the region generator.
pub struct WorldContext {
    /// Side of the square world covered by the map, in world units.
    pub world_size: f32,
    pub seed: u64,
    /// Region edge in cells.
    pub chunk_size: u32,
    /// Current map and a counter bumped on every replacement.
    map: RwLock<(u64, Option<Arc<WorldMap>>)>,
}

impl WorldContext {
    pub fn new(world_size: f32, seed: u64, chunk_size: u32, map: Option<WorldMap>) -> Self {
        Self {
            world_size,
            seed,
            chunk_size,
            map: RwLock::new((0, map.map(Arc::new))),
        }
    }

    /// Current world map, if any.
    pub fn world_map(&self) -> Option<Arc<WorldMap>> {
        self.map_snapshot().1
    }

    /// Current map together with its generation.
    pub fn map_snapshot(&self) -> (u64, Option<Arc<WorldMap>>) {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of map replacements so far.
    pub fn map_generation(&self) -> u64 {
        self.map.read().unwrap_or_else(PoisonError::into_inner).0
    }

    /// Replace the world map. `None` = default biome everywhere.
    pub fn set_world_map(&self, map: Option<WorldMap>) {
        let mut slot = self.map.write().unwrap_or_else(PoisonError::into_inner);
        slot.0 += 1;
        slot.1 = map.map(Arc::new);
    }

    /// Load a world map from disk. On failure the map is cleared, a warning
    /// is logged and `false` is returned.
    pub fn load_world_map(&self, path: &Path) -> bool {
        match WorldMap::load(path) {
            Ok(map) => {
                tracing::info!(
                    "Loaded world map {} ({}x{}, {:.1} units/pixel)",
                    path.display(),
                    map.width(),
                    map.height(),
                    self.world_size / map.width() as f32
                );
                self.set_world_map(Some(map));
                true
            }
            Err(e) => {
                tracing::warn!("{e}; using the default biome everywhere");
                self.set_world_map(None);
                false
            }
        }
    }

    /// World units covered by one map pixel, if a map is loaded.
    pub fn pixel_scale(&self) -> Option<f32> {
        self.world_map()
            .map(|m| self.world_size / m.width() as f32)
    }
}

/// Classifies world positions into biome ids.
///
/// Each region is sampled once, at its centre, and the id is cached.
pub struct BiomeSampler {
    context: Arc<WorldContext>,
    cache: RegionCache<RegionKey, BiomeId>,
}

impl BiomeSampler {
    pub fn new(context: Arc<WorldContext>, max_cache_entries: usize) -> Self {
        Self {
            context,
            cache: RegionCache::new(max_cache_entries),
        }
    }

    pub fn context(&self) -> &Arc<WorldContext> {
        &self.context
    }

    /// Biome directly under a world position, uncached.
    pub fn sample_position(&self, wx: f32, wz: f32) -> BiomeId {
        self.sample_map(self.context.world_map().as_deref(), wx, wz)
    }

    fn sample_map(&self, map: Option<&WorldMap>, wx: f32, wz: f32) -> BiomeId {
        match map {
            Some(map) => BiomeId(map.sample(wx, wz, self.context.world_size)),
            None => BiomeId::PLAINS,
        }
    }

    /// Biome of a region, sampled at its centre and cached.
    pub fn biome_for_region(&self, key: RegionKey) -> BiomeId {
        if let Some(id) = self.cache.get(&key) {
            return id;
        }
        let (generation, id) = self.sample_region(key);
        self.store(key, generation, id);
        id
    }

    /// Sample a region's centre, uncached, with the map generation used.
    pub fn sample_region(&self, key: RegionKey) -> (u64, BiomeId) {
        let (generation, map) = self.context.map_snapshot();
        let center = key.center(self.context.chunk_size);
        (generation, self.sample_map(map.as_deref(), center.x, center.z))
    }

    /// Cache a sample unless the map was replaced since it was taken.
    /// The generation is checked under the cache lock, so a reload that
    /// swaps the map and then clears the cache never keeps a stale id.
    pub fn store(&self, key: RegionKey, generation: u64, id: BiomeId) -> bool {
        let mut cache = self.cache.lock();
        if self.context.map_generation() != generation {
            return false;
        }
        cache.put(key, id);
        true
    }

    /// Biome at a world position, via the full-resolution region containing it.
    pub fn biome_at(&self, pos: Vec3) -> BiomeId {
        self.biome_for_region(self.region_containing(pos))
    }

    /// Full-resolution region whose footprint contains `pos`.
    pub fn region_containing(&self, pos: Vec3) -> RegionKey {
        let extent = self.context.chunk_size as f32;
        let origin = (pos / extent).floor() * extent;
        RegionKey::new(IVec3::new(origin.x as i32, 0, origin.z as i32), 0)
    }

    pub fn cache(&self) -> &RegionCache<RegionKey, BiomeId> {
        &self.cache
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
