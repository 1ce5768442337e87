//! Streams a square of regions around the origin and places vegetation on
//! each finished region.

use std::collections::BTreeSet;

use glam::IVec3;
use serde::Serialize;
use strata_terrain::{RegionEvent, RegionKey, TelemetrySnapshot, TerrainError, TerrainWorld, VegetationType};

/// Placement totals for one vegetation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub vegetation_type: u32,
    pub placements: usize,
}

/// Result of a bake run, printed as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct BakeSummary {
    pub regions_requested: usize,
    pub regions_generated: usize,
    pub regions_failed: usize,
    pub passes_aborted: usize,
    pub frames: u32,
    pub placements: Vec<TypeCount>,
    pub telemetry: TelemetrySnapshot,
}

/// Region origins of the `(2r + 1)²` square centred on the origin, with the
/// sea level in the middle of each region.
pub fn region_square(radius: i32, chunk_size: u32, sea_level: f32) -> Vec<IVec3> {
    let chunk = chunk_size as i32;
    let y = sea_level.floor() as i32 - chunk / 2;
    let radius = radius.max(0);
    let mut origins = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
    for z in -radius..=radius {
        for x in -radius..=radius {
            origins.push(IVec3::new(x * chunk, y, z * chunk));
        }
    }
    origins
}

/// Tick the world until every region has finished or failed, or `max_frames`
/// have passed.
pub fn run(world: &TerrainWorld, radius: i32, max_frames: u32) -> Result<BakeSummary, TerrainError> {
    let terrain = &world.config().terrain;
    let origins = region_square(radius, terrain.chunk_size, terrain.sea_level);
    let mut outstanding: BTreeSet<RegionKey> =
        origins.iter().map(|o| RegionKey::new(*o, 0)).collect();

    for origin in &origins {
        world.request_region(*origin, 0)?;
    }

    let mut generated = 0;
    let mut failed = 0;
    let mut aborted = 0;
    let mut counts: Vec<TypeCount> = VegetationType::ALL
        .iter()
        .map(|&t| TypeCount {
            vegetation_type: t,
            placements: 0,
        })
        .collect();

    let mut frames = 0;
    while !outstanding.is_empty() && frames < max_frames {
        frames += 1;
        if let Err(e) = world.tick() {
            tracing::warn!("Frame {frames}: {e}");
        }
        for event in world.drain_events() {
            match event {
                RegionEvent::Generated {
                    origin,
                    detail_level,
                    ..
                } => {
                    if !outstanding.remove(&RegionKey::new(origin, detail_level)) {
                        continue;
                    }
                    generated += 1;
                    for count in &mut counts {
                        let request = world.placement_request(origin, count.vegetation_type);
                        count.placements += world.generate_placements(&request)?.len();
                    }
                }
                RegionEvent::Failed { key, error } => {
                    if outstanding.remove(&key) {
                        tracing::error!("Region {key} failed: {error}");
                        failed += 1;
                    }
                }
                RegionEvent::PassAborted { callbacks } => {
                    aborted += 1;
                    tracing::warn!("Pass aborted after {callbacks} callbacks; re-requesting");
                    for key in &outstanding {
                        world.request_region(key.origin, key.detail_level)?;
                    }
                }
            }
        }
    }

    if !outstanding.is_empty() {
        tracing::warn!(
            "{} regions still outstanding after {frames} frames",
            outstanding.len()
        );
    }

    Ok(BakeSummary {
        regions_requested: origins.len(),
        regions_generated: generated,
        regions_failed: failed,
        passes_aborted: aborted,
        frames,
        placements: counts,
        telemetry: world.get_telemetry(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_config::Config;

    fn world() -> TerrainWorld {
        let mut config = Config::default();
        config.terrain.chunk_size = 16;
        config.scheduler.worker_threads = Some(0);
        config.compute.prefer_gpu = false;
        TerrainWorld::new(config).unwrap()
    }

    #[test]
    fn test_region_square_is_centred() {
        let origins = region_square(1, 16, 0.0);
        assert_eq!(origins.len(), 9);
        assert!(origins.contains(&IVec3::new(-16, -8, -16)));
        assert!(origins.contains(&IVec3::new(16, -8, 16)));
        assert_eq!(region_square(-3, 16, 0.0), vec![IVec3::new(0, -8, 0)]);
    }

    #[test]
    fn test_run_generates_every_region() {
        let world = world();
        let summary = run(&world, 1, 100).unwrap();
        assert_eq!(summary.regions_requested, 9);
        assert_eq!(summary.regions_generated, 9);
        assert_eq!(summary.regions_failed, 0);
        assert_eq!(summary.telemetry.total_generated, 9);
        assert_eq!(summary.placements.len(), VegetationType::ALL.len());
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"regions_generated\":9"));
    }

    #[test]
    fn test_run_stops_at_frame_limit() {
        let world = world();
        let summary = run(&world, 2, 1).unwrap();
        assert_eq!(summary.frames, 1);
        assert!(summary.regions_generated < summary.regions_requested);
    }
}
