//! Vegetation candidates: jittered grid over the region footprint, filtered by
//! surface slope, height range, density noise and biome permission.

use std::f32::consts::TAU;

use super::cell_index;
use super::noise::{hash2, pcg, unit, value_noise};
use crate::{PlacementParams, RawPlacement};

const TYPE_SALT: u32 = 0x9E37_79B9;
const DENSITY_SALT: u32 = 0x5BD1_E995;
const ROTATION_SALT: u32 = 0xA511_E9B3;
const SCALE_SALT: u32 = 0x63D8_3595;

/// Borrowed single-channel biome map.
#[derive(Debug, Clone, Copy)]
pub struct BiomeMapView<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

impl BiomeMapView<'_> {
    /// Biome id under a world XZ position; 0 for an empty map.
    pub fn biome_at(&self, wx: f32, wz: f32, world_size: f32) -> u8 {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        let half = world_size * 0.5;
        let px = pixel(wx + half, world_size / self.width as f32, self.width);
        let pz = pixel(wz + half, world_size / self.height as f32, self.height);
        self.data
            .get(pz as usize * self.width as usize + px as usize)
            .copied()
            .unwrap_or(0)
    }
}

fn pixel(shifted: f32, pixel_scale: f32, extent: u32) -> u32 {
    let p = (shifted / pixel_scale).floor();
    p.clamp(0.0, (extent - 1) as f32) as u32
}

/// Height (in cells, fractional) of the highest solid-to-air crossing in a
/// column, or `None` if the column never crosses the surface.
pub fn column_surface(sdf: &[f32], size: usize, x: usize, z: usize) -> Option<f32> {
    for y in (0..size.saturating_sub(1)).rev() {
        let below = sdf[cell_index(size, x, y, z)];
        let above = sdf[cell_index(size, x, y + 1, z)];
        if below <= 0.0 && above > 0.0 {
            return Some(y as f32 + below / (below - above));
        }
    }
    None
}

/// Evaluate the placement pipeline. Records come out in grid-cell order, one
/// per passing cell; `max_placements` is applied when the output is decoded.
pub fn placements(p: &PlacementParams, sdf: &[f32], map: BiomeMapView<'_>) -> Vec<RawPlacement> {
    let mut out = Vec::new();
    for j in 0..p.grid_steps {
        for i in 0..p.grid_steps {
            if let Some(record) = evaluate_cell(p, sdf, &map, i, j) {
                out.push(record);
            }
        }
    }
    out
}

fn evaluate_cell(
    p: &PlacementParams,
    sdf: &[f32],
    map: &BiomeMapView<'_>,
    i: u32,
    j: u32,
) -> Option<RawPlacement> {
    let size = p.chunk_size as usize;
    let base_x = p.origin_x + i as f32 * p.grid_spacing;
    let base_z = p.origin_z + j as f32 * p.grid_spacing;

    // World-space lattice coordinates keep jitter seamless across regions.
    let gx = (base_x / p.grid_spacing).floor() as i32;
    let gz = (base_z / p.grid_spacing).floor() as i32;
    let seed = p.seed ^ p.vegetation_type.wrapping_mul(TYPE_SALT);
    let h = hash2(seed, gx, gz);

    let wx = base_x + unit(h) * p.grid_spacing;
    let wz = base_z + unit(pcg(h)) * p.grid_spacing;

    let lx = (wx - p.origin_x) / p.step;
    let lz = (wz - p.origin_z) / p.step;
    let last = (size - 1) as f32;
    if lx > last || lz > last {
        return None;
    }
    let ix = lx.round() as usize;
    let iz = lz.round() as usize;

    let local_h = column_surface(sdf, size, ix, iz)?;

    let dhdx = gradient(sdf, size, local_h, ix, |n| (n, iz));
    let dhdz = gradient(sdf, size, local_h, iz, |n| (ix, n));
    let normal = normalize([-dhdx, 1.0, -dhdz]);
    let slope_deg = normal[1].clamp(-1.0, 1.0).acos().to_degrees();
    if slope_deg > p.slope_max_deg {
        return None;
    }

    let wy = p.origin_y + local_h * p.step;
    if wy < p.height_min || wy > p.height_max {
        return None;
    }

    let n = value_noise(
        wx * p.noise_frequency,
        wz * p.noise_frequency,
        seed ^ DENSITY_SALT,
    );
    if n < 1.0 - p.density {
        return None;
    }

    let biome = map.biome_at(wx, wz, p.world_size) as u32;
    if biome >= 32 || p.allowed_biome_mask & (1 << biome) == 0 {
        return None;
    }

    let rotation_y = unit(pcg(h ^ ROTATION_SALT)) * TAU;
    let scale = p.scale_min + (p.scale_max - p.scale_min) * unit(pcg(h ^ SCALE_SALT));

    Some(RawPlacement {
        position: [wx, wy, wz],
        rotation_y,
        scale,
        vegetation_type: p.vegetation_type,
        cell: j * p.grid_steps + i,
        normal,
        _pad: [0; 2],
    })
}

/// Central difference of surface height along one axis, one-sided at the
/// region border. Neighbour columns without a surface reuse the centre height.
fn gradient(
    sdf: &[f32],
    size: usize,
    centre: f32,
    at: usize,
    column: impl Fn(usize) -> (usize, usize),
) -> f32 {
    let lo = at.saturating_sub(1);
    let hi = (at + 1).min(size - 1);
    if hi == lo {
        return 0.0;
    }
    let (lx, lz) = column(lo);
    let (hx, hz) = column(hi);
    let h_lo = column_surface(sdf, size, lx, lz).unwrap_or(centre);
    let h_hi = column_surface(sdf, size, hx, hz).unwrap_or(centre);
    (h_hi - h_lo) / (hi - lo) as f32
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    [v[0] / len, v[1] / len, v[2] / len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_PLACEMENTS;

    const SIZE: usize = 16;

    /// Surface at `y = base + slope * x` in local cells.
    fn ramp(base: f32, slope: f32) -> Vec<f32> {
        let mut sdf = vec![0.0; SIZE * SIZE * SIZE];
        for z in 0..SIZE {
            for y in 0..SIZE {
                for x in 0..SIZE {
                    sdf[cell_index(SIZE, x, y, z)] = y as f32 - (base + slope * x as f32);
                }
            }
        }
        sdf
    }

    fn params() -> PlacementParams {
        PlacementParams {
            origin_x: 0.0,
            origin_y: 0.0,
            origin_z: 0.0,
            grid_spacing: 2.0,
            chunk_size: SIZE as u32,
            grid_steps: 8,
            seed: 1234,
            vegetation_type: 1,
            density: 1.0,
            noise_frequency: 0.1,
            slope_max_deg: 45.0,
            height_min: -100.0,
            height_max: 500.0,
            scale_min: 0.8,
            scale_max: 1.2,
            allowed_biome_mask: u32::MAX,
            world_size: 1024.0,
            step: 1.0,
            max_placements: MAX_PLACEMENTS,
            _pad: 0,
        }
    }

    const EMPTY_MAP: BiomeMapView<'static> = BiomeMapView {
        width: 0,
        height: 0,
        data: &[],
    };

    #[test]
    fn test_column_surface_interpolates_crossing() {
        let sdf = ramp(6.25, 0.0);
        let h = column_surface(&sdf, SIZE, 3, 3).unwrap();
        assert!((h - 6.25).abs() < 1e-5);
    }

    #[test]
    fn test_fully_solid_column_has_no_surface() {
        let sdf = vec![-1.0; SIZE * SIZE * SIZE];
        assert!(column_surface(&sdf, SIZE, 0, 0).is_none());
    }

    #[test]
    fn test_flat_ground_full_density_places_most_cells() {
        let sdf = ramp(4.5, 0.0);
        let out = placements(&params(), &sdf, EMPTY_MAP);
        assert!(!out.is_empty());
        for r in &out {
            assert!((r.position[1] - 4.5).abs() < 1e-4);
            assert!((r.normal[1] - 1.0).abs() < 1e-6);
            assert!(r.position[0] >= 0.0 && r.position[0] <= (SIZE - 1) as f32);
            assert!(r.position[2] >= 0.0 && r.position[2] <= (SIZE - 1) as f32);
            assert!((0.0..TAU).contains(&r.rotation_y));
            assert!((0.8..=1.2).contains(&r.scale));
        }
        let cells: Vec<u32> = out.iter().map(|r| r.cell).collect();
        let mut sorted = cells.clone();
        sorted.sort_unstable();
        assert_eq!(cells, sorted);
    }

    #[test]
    fn test_zero_density_places_nothing() {
        let sdf = ramp(4.5, 0.0);
        let mut p = params();
        p.density = 0.0;
        assert!(placements(&p, &sdf, EMPTY_MAP).is_empty());
    }

    #[test]
    fn test_steep_slope_rejected() {
        // atan(0.5) ~ 26.6 degrees
        let sdf = ramp(2.0, 0.5);
        let mut p = params();
        p.slope_max_deg = 20.0;
        assert!(placements(&p, &sdf, EMPTY_MAP).is_empty());

        p.slope_max_deg = 30.0;
        let out = placements(&p, &sdf, EMPTY_MAP);
        assert!(!out.is_empty());
        for r in &out {
            let slope = r.normal[1].acos().to_degrees();
            assert!(slope <= p.slope_max_deg);
        }
    }

    #[test]
    fn test_height_range_filters() {
        let sdf = ramp(4.5, 0.0);
        let mut p = params();
        p.height_min = 10.0;
        assert!(placements(&p, &sdf, EMPTY_MAP).is_empty());
    }

    #[test]
    fn test_biome_mask_filters() {
        let sdf = ramp(4.5, 0.0);
        let data = [3u8; 4];
        let map = BiomeMapView {
            width: 2,
            height: 2,
            data: &data,
        };
        let mut p = params();
        p.allowed_biome_mask = 1 << 2;
        assert!(placements(&p, &sdf, map).is_empty());
        p.allowed_biome_mask = 1 << 3;
        assert!(!placements(&p, &sdf, map).is_empty());
    }

    #[test]
    fn test_kernel_emits_every_passing_cell() {
        let sdf = ramp(4.5, 0.0);
        let mut p = params();
        let all = placements(&p, &sdf, EMPTY_MAP);
        assert!(all.len() > 3);
        p.max_placements = 3;
        assert_eq!(placements(&p, &sdf, EMPTY_MAP), all);
    }

    #[test]
    fn test_biome_pixel_formula_clamps() {
        let data = [0u8, 1, 2, 3];
        let map = BiomeMapView {
            width: 2,
            height: 2,
            data: &data,
        };
        // world_size 100 → pixel_scale 50; (-50,-50) is pixel (0,0)
        assert_eq!(map.biome_at(-50.0, -50.0, 100.0), 0);
        assert_eq!(map.biome_at(10.0, -40.0, 100.0), 1);
        assert_eq!(map.biome_at(-10.0, 10.0, 100.0), 2);
        assert_eq!(map.biome_at(1e6, 1e6, 100.0), 3);
        assert_eq!(map.biome_at(-1e6, -1e6, 100.0), 0);
    }
}
