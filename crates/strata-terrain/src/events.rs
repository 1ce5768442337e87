//! Events emitted by the request scheduler.

use glam::IVec3;

use crate::biome::BiomeId;
use crate::error::TerrainError;
use crate::region::RegionKey;

/// Completion notifications, delivered through a crossbeam channel.
#[derive(Debug)]
pub enum RegionEvent {
    /// A full-resolution region is in the cache, freshly generated or
    /// already present. Coarser levels are cached silently.
    Generated {
        origin: IVec3,
        detail_level: u8,
        biome_id: BiomeId,
    },
    /// Every attempt for the region failed.
    Failed { key: RegionKey, error: TerrainError },
    /// Too many callbacks in one pass; queued and in-flight work was dropped.
    PassAborted { callbacks: u32 },
}

impl RegionEvent {
    /// Key of the region this event is about, if any.
    pub fn key(&self) -> Option<RegionKey> {
        match self {
            RegionEvent::Generated {
                origin,
                detail_level,
                ..
            } => Some(RegionKey::new(*origin, *detail_level)),
            RegionEvent::Failed { key, .. } => Some(*key),
            RegionEvent::PassAborted { .. } => None,
        }
    }
}
