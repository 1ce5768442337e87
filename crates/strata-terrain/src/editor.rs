//! Sculpting brushes applied to a region buffer in place.
//!
//! Brushes only rewrite SDF values; materials are left alone. Cells are
//! addressed in local cell coordinates and the brush radius is in cells.

use glam::IVec3;

use crate::region::{EDIT_DIRTY, MESH_DIRTY, RegionBuffer};

/// A brush stroke, as passed to `TerrainWorld::edit_region`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionEdit {
    Smooth {
        center: IVec3,
        radius: f32,
        strength: f32,
    },
    Flatten {
        center: IVec3,
        radius: f32,
        target_world_height: f32,
        strength: f32,
    },
}

impl RegionEdit {
    /// Apply the stroke and return the number of modified cells.
    pub fn apply(&self, region: &mut RegionBuffer) -> usize {
        match *self {
            RegionEdit::Smooth {
                center,
                radius,
                strength,
            } => apply_smooth(region, center, radius, strength),
            RegionEdit::Flatten {
                center,
                radius,
                target_world_height,
                strength,
            } => apply_flatten(region, center, radius, target_world_height, strength),
        }
    }
}

/// Blend every cell within `radius` toward the mean of its in-region
/// neighbours. Means are taken from the pre-edit values.
pub fn apply_smooth(region: &mut RegionBuffer, center: IVec3, radius: f32, strength: f32) -> usize {
    let strength = strength.clamp(0.0, 1.0);
    let snapshot = region.sdf.clone();
    let size = region.size as i32;

    let mut modified = 0;
    for_each_in_brush(region.size, center, radius, |x, y, z| {
        let mut sum = 0.0;
        let mut count = 0;
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let (nx, ny, nz) = (x + dx, y + dy, z + dz);
                    if nx < 0 || ny < 0 || nz < 0 || nx >= size || ny >= size || nz >= size {
                        continue;
                    }
                    sum += snapshot[flat(size, nx, ny, nz)];
                    count += 1;
                }
            }
        }
        if count == 0 {
            return;
        }
        let i = flat(size, x, y, z);
        let current = snapshot[i];
        let next = lerp(current, sum / count as f32, strength);
        if next != current {
            region.sdf[i] = next;
            modified += 1;
        }
    });
    finish(region, modified)
}

/// Pull every cell within `radius` toward the field of a flat surface at
/// `target_world_height`.
pub fn apply_flatten(
    region: &mut RegionBuffer,
    center: IVec3,
    radius: f32,
    target_world_height: f32,
    strength: f32,
) -> usize {
    let strength = strength.clamp(0.0, 1.0);
    let size = region.size as i32;

    let mut modified = 0;
    for_each_in_brush(region.size, center, radius, |x, y, z| {
        let i = flat(size, x, y, z);
        // Negative is solid, so cells below the target end up negative.
        let target = region.world_y(y as usize) - target_world_height;
        let current = region.sdf[i];
        let next = lerp(current, target, strength);
        if next != current {
            region.sdf[i] = next;
            modified += 1;
        }
    });
    finish(region, modified)
}

fn finish(region: &mut RegionBuffer, modified: usize) -> usize {
    region.mark_dirty(MESH_DIRTY);
    if modified > 0 {
        region.mark_dirty(EDIT_DIRTY);
    }
    modified
}

fn for_each_in_brush(size: u32, center: IVec3, radius: f32, mut f: impl FnMut(i32, i32, i32)) {
    if !(radius >= 0.0) {
        return;
    }
    let size = size as i32;
    let reach = radius.ceil() as i32;
    let r2 = radius * radius;
    let lo = (center - IVec3::splat(reach)).max(IVec3::ZERO);
    let hi = (center + IVec3::splat(reach)).min(IVec3::splat(size - 1));
    for z in lo.z..=hi.z {
        for y in lo.y..=hi.y {
            for x in lo.x..=hi.x {
                let d = (IVec3::new(x, y, z) - center).as_vec3();
                if d.length_squared() <= r2 {
                    f(x, y, z);
                }
            }
        }
    }
}

#[inline]
fn flat(size: i32, x: i32, y: i32, z: i32) -> usize {
    (x + size * (y + size * z)) as usize
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionKey;

    const SIZE: u32 = 8;

    fn region_with(f: impl Fn(usize, usize, usize) -> f32) -> RegionBuffer {
        let s = SIZE as usize;
        let mut sdf = vec![0.0; s * s * s];
        for z in 0..s {
            for y in 0..s {
                for x in 0..s {
                    sdf[x + s * (y + s * z)] = f(x, y, z);
                }
            }
        }
        let materials = (0..s * s * s).map(|i| (i % 7) as u8).collect();
        RegionBuffer::new(RegionKey::new(IVec3::new(0, -4, 0), 0), SIZE, sdf, materials)
    }

    #[test]
    fn test_smooth_levels_a_spike() {
        let mut region = region_with(|x, y, z| if (x, y, z) == (4, 4, 4) { 10.0 } else { 0.0 });
        let modified = apply_smooth(&mut region, IVec3::splat(4), 0.0, 1.0);
        assert_eq!(modified, 1);
        assert_eq!(region.sdf_at(4, 4, 4), 0.0);
        assert!(region.is_dirty(MESH_DIRTY));
    }

    #[test]
    fn test_smooth_reads_pre_edit_snapshot() {
        let mut region = region_with(|x, _, _| x as f32);
        apply_smooth(&mut region, IVec3::new(3, 3, 3), 1.0, 1.0);
        // A linear field is its own neighbourhood mean away from the border.
        for (x, y, z) in [(3, 3, 3), (2, 3, 3), (4, 3, 3), (3, 2, 3)] {
            assert!((region.sdf_at(x, y, z) - x as f32).abs() < 1e-5);
        }
    }

    #[test]
    fn test_smooth_skips_out_of_region_neighbours() {
        let mut region = region_with(|x, _, _| if x == 0 { 0.0 } else { 4.0 });
        let modified = apply_smooth(&mut region, IVec3::ZERO, 0.0, 1.0);
        assert_eq!(modified, 1);
        // 7 in-region neighbours: 3 at x=0 (value 0), 4 at x=1 (value 4).
        assert!((region.sdf_at(0, 0, 0) - 16.0 / 7.0).abs() < 1e-5);
    }

    #[test]
    fn test_flatten_moves_surface_to_target() {
        // Surface at world y = 2 (region origin y = -4).
        let mut region = region_with(|_, y, _| (y as f32 - 4.0) - 2.0);
        let modified = apply_flatten(&mut region, IVec3::splat(4), 20.0, 0.0, 1.0);
        assert_eq!(modified, (SIZE * SIZE * SIZE) as usize);
        for y in 0..SIZE as usize {
            let wy = y as f32 - 4.0;
            assert_eq!(region.sdf_at(1, y, 1), wy);
        }
        // Zero crossing sits on world y = 0.
        assert!(region.sdf_at(2, 3, 2) < 0.0);
        assert_eq!(region.sdf_at(2, 4, 2), 0.0);
    }

    #[test]
    fn test_flatten_partial_strength() {
        let mut region = region_with(|_, _, _| 10.0);
        apply_flatten(&mut region, IVec3::new(2, 4, 2), 0.0, 0.0, 0.5);
        // world_y of row 4 is 0, target field is 0.
        assert_eq!(region.sdf_at(2, 4, 2), 5.0);
        assert_eq!(region.sdf_at(3, 4, 2), 10.0);
    }

    #[test]
    fn test_brushes_leave_materials_alone() {
        let mut region = region_with(|x, y, z| (x * y + z) as f32);
        let before = region.materials.clone();
        RegionEdit::Smooth {
            center: IVec3::splat(3),
            radius: 3.0,
            strength: 0.7,
        }
        .apply(&mut region);
        RegionEdit::Flatten {
            center: IVec3::splat(3),
            radius: 3.0,
            target_world_height: 1.0,
            strength: 0.7,
        }
        .apply(&mut region);
        assert_eq!(region.materials, before);
        assert!(region.is_dirty(EDIT_DIRTY));
    }

    #[test]
    fn test_brush_outside_region_modifies_nothing() {
        let mut region = region_with(|x, _, _| x as f32);
        let modified = apply_smooth(&mut region, IVec3::splat(100), 2.0, 1.0);
        assert_eq!(modified, 0);
        assert!(!region.is_dirty(EDIT_DIRTY));
    }
}
