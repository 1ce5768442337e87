//! Base signed-distance field: `world_y - surface_height(x, z)`.

use super::cell_index;
use super::noise::{Octaves, fbm};
use crate::DensityParams;

/// Terrain surface height at a world column.
pub fn surface_height(p: &DensityParams, wx: f32, wz: f32) -> f32 {
    let octaves = Octaves {
        amplitude: p.amplitude,
        base_frequency: p.base_frequency,
        octaves: p.octaves,
        persistence: p.persistence,
        lacunarity: p.lacunarity,
    };
    p.sea_level + fbm(wx, wz, p.seed, octaves)
}

/// Evaluate the density pipeline. Negative values are solid.
pub fn density_field(p: &DensityParams) -> Vec<f32> {
    let size = p.chunk_size as usize;

    let mut heights = vec![0.0f32; size * size];
    for z in 0..size {
        for x in 0..size {
            let wx = p.origin_x + x as f32 * p.step;
            let wz = p.origin_z + z as f32 * p.step;
            heights[x + size * z] = surface_height(p, wx, wz);
        }
    }

    let mut sdf = vec![0.0f32; size * size * size];
    for z in 0..size {
        for y in 0..size {
            let wy = p.origin_y + y as f32 * p.step;
            for x in 0..size {
                sdf[cell_index(size, x, y, z)] = wy - heights[x + size * z];
            }
        }
    }
    sdf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(amplitude: f32) -> DensityParams {
        DensityParams {
            origin_x: 0.0,
            origin_y: -8.0,
            origin_z: 0.0,
            step: 1.0,
            chunk_size: 8,
            seed: 11,
            sea_level: 0.0,
            amplitude,
            base_frequency: 0.05,
            octaves: 3,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }

    #[test]
    fn test_flat_field_is_height_above_sea_level() {
        let sdf = density_field(&params(0.0));
        assert_eq!(sdf.len(), 512);
        for z in 0..8 {
            for y in 0..8 {
                for x in 0..8 {
                    let expected = -8.0 + y as f32;
                    assert_eq!(sdf[cell_index(8, x, y, z)], expected);
                }
            }
        }
    }

    #[test]
    fn test_field_is_deterministic() {
        let a = density_field(&params(6.0));
        let b = density_field(&params(6.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_sdf_decreases_with_depth() {
        let sdf = density_field(&params(6.0));
        for y in 1..8 {
            assert!(sdf[cell_index(8, 3, y, 5)] > sdf[cell_index(8, 3, y - 1, 5)]);
        }
    }

    #[test]
    fn test_adjacent_regions_share_border_heights() {
        let a = params(6.0);
        let mut b = a;
        b.origin_x = 7.0;
        let ha = surface_height(&a, a.origin_x + 7.0, 2.0);
        let hb = surface_height(&b, b.origin_x, 2.0);
        assert_eq!(ha, hb);
    }
}
