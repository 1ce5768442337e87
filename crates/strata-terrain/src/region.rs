//! Region identity and the per-region SDF + material buffer.

use std::cmp::Ordering;
use std::fmt;

use glam::{IVec3, Vec3};

/// The region's mesh no longer matches its SDF.
pub const MESH_DIRTY: u8 = 0b0000_0001;
/// The region differs from what the generator would produce.
pub const EDIT_DIRTY: u8 = 0b0000_0010;

/// Identifies one region: its world-space origin and level of detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionKey {
    /// World-space origin (minimum corner).
    pub origin: IVec3,
    /// 0 = full resolution; each level doubles the cell size.
    pub detail_level: u8,
}

impl RegionKey {
    pub fn new(origin: IVec3, detail_level: u8) -> Self {
        Self {
            origin,
            detail_level,
        }
    }

    /// World units per cell.
    pub fn step(&self) -> f32 {
        2f32.powi(self.detail_level as i32)
    }

    /// Side length in world units as an integer, if it fits in `i32`.
    pub fn checked_extent(&self, chunk_size: u32) -> Option<i32> {
        let extent = (chunk_size as i64).checked_shl(self.detail_level as u32)?;
        if extent >> self.detail_level != chunk_size as i64 {
            return None;
        }
        i32::try_from(extent).ok()
    }

    /// Whether the region and its eight horizontal neighbours all have
    /// origins representable as `i32`.
    pub fn is_addressable(&self, chunk_size: u32) -> bool {
        let Some(extent) = self.checked_extent(chunk_size) else {
            return false;
        };
        let extent = extent as i64;
        let fits = |v: i64| i32::try_from(v).is_ok();
        fits(self.origin.x as i64 - extent)
            && fits(self.origin.x as i64 + 2 * extent)
            && fits(self.origin.z as i64 - extent)
            && fits(self.origin.z as i64 + 2 * extent)
            && fits(self.origin.y as i64 + extent)
    }

    /// Side length of the region in world units.
    pub fn extent(&self, chunk_size: u32) -> f32 {
        chunk_size as f32 * self.step()
    }

    /// World-space centre of the region.
    pub fn center(&self, chunk_size: u32) -> Vec3 {
        self.origin.as_vec3() + Vec3::splat(self.extent(chunk_size) * 0.5)
    }

    /// The region one extent away along `(dx, dz)` at the same detail level.
    /// Coordinates saturate at the `i32` range.
    pub fn neighbour(&self, chunk_size: u32, dx: i32, dz: i32) -> Self {
        let extent = self.checked_extent(chunk_size).map_or(i64::from(i32::MAX), i64::from);
        let shift = |o: i32, d: i32| {
            (o as i64 + d as i64 * extent).clamp(i32::MIN as i64, i32::MAX as i64) as i32
        };
        Self {
            origin: IVec3::new(
                shift(self.origin.x, dx),
                self.origin.y,
                shift(self.origin.z, dz),
            ),
            detail_level: self.detail_level,
        }
    }
}

// glam vectors are not `Ord`; order by origin components, then detail level.
impl Ord for RegionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.origin
            .to_array()
            .cmp(&other.origin.to_array())
            .then_with(|| self.detail_level.cmp(&other.detail_level))
    }
}

impl PartialOrd for RegionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})@{}",
            self.origin.x, self.origin.y, self.origin.z, self.detail_level
        )
    }
}

/// Signed-distance and material data for one region.
///
/// Negative SDF values are solid. Cells are stored x-fastest:
/// `x + size * (y + size * z)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionBuffer {
    pub key: RegionKey,
    pub size: u32,
    pub sdf: Vec<f32>,
    pub materials: Vec<u8>,
    dirty: u8,
}

impl RegionBuffer {
    /// Wrap freshly generated data. Both buffers must hold `size³` cells.
    pub fn new(key: RegionKey, size: u32, sdf: Vec<f32>, materials: Vec<u8>) -> Self {
        debug_assert_eq!(sdf.len(), (size as usize).pow(3));
        debug_assert_eq!(materials.len(), sdf.len());
        Self {
            key,
            size,
            sdf,
            materials,
            dirty: 0,
        }
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let s = self.size as usize;
        x + s * (y + s * z)
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32, z: i32) -> bool {
        let s = self.size as i32;
        (0..s).contains(&x) && (0..s).contains(&y) && (0..s).contains(&z)
    }

    pub fn sdf_at(&self, x: usize, y: usize, z: usize) -> f32 {
        self.sdf[self.index(x, y, z)]
    }

    pub fn material_at(&self, x: usize, y: usize, z: usize) -> u8 {
        self.materials[self.index(x, y, z)]
    }

    /// World-space position of a cell.
    pub fn world_position(&self, x: usize, y: usize, z: usize) -> Vec3 {
        self.key.origin.as_vec3() + Vec3::new(x as f32, y as f32, z as f32) * self.key.step()
    }

    /// World-space height of a cell row.
    pub fn world_y(&self, y: usize) -> f32 {
        self.key.origin.y as f32 + y as f32 * self.key.step()
    }

    pub fn is_dirty(&self, flag: u8) -> bool {
        self.dirty & flag != 0
    }

    pub fn mark_dirty(&mut self, flag: u8) {
        self.dirty |= flag;
    }

    pub fn clear_dirty(&mut self, flag: u8) {
        self.dirty &= !flag;
    }

    /// Count of solid (negative) cells.
    pub fn solid_count(&self) -> usize {
        self.sdf.iter().filter(|v| **v < 0.0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_and_extent_scale_with_detail() {
        let k0 = RegionKey::new(IVec3::ZERO, 0);
        let k2 = RegionKey::new(IVec3::ZERO, 2);
        assert_eq!(k0.step(), 1.0);
        assert_eq!(k2.step(), 4.0);
        assert_eq!(k0.extent(32), 32.0);
        assert_eq!(k2.extent(32), 128.0);
        assert_eq!(k2.center(32), Vec3::splat(64.0));
    }

    #[test]
    fn test_neighbour_offsets_by_extent() {
        let k = RegionKey::new(IVec3::new(32, 0, -32), 1);
        let n = k.neighbour(32, -1, 1);
        assert_eq!(n.origin, IVec3::new(-32, 0, 32));
        assert_eq!(n.detail_level, 1);
    }

    #[test]
    fn test_keys_order_by_origin_then_detail() {
        use std::collections::BTreeSet;
        let set: BTreeSet<RegionKey> = [
            RegionKey::new(IVec3::new(0, 0, 32), 0),
            RegionKey::new(IVec3::new(-32, 0, 0), 1),
            RegionKey::new(IVec3::new(-32, 0, 0), 0),
            RegionKey::new(IVec3::new(0, 0, 32), 0),
        ]
        .into_iter()
        .collect();
        let keys: Vec<_> = set.into_iter().collect();
        assert_eq!(
            keys,
            vec![
                RegionKey::new(IVec3::new(-32, 0, 0), 0),
                RegionKey::new(IVec3::new(-32, 0, 0), 1),
                RegionKey::new(IVec3::new(0, 0, 32), 0),
            ]
        );
    }

    #[test]
    fn test_huge_detail_levels_do_not_overflow() {
        let k = RegionKey::new(IVec3::ZERO, 24);
        assert_eq!(k.checked_extent(128), None);
        assert!(!k.is_addressable(128));
        assert_eq!(k.neighbour(128, 1, -1).origin, IVec3::new(i32::MAX, 0, -i32::MAX));
        assert!(RegionKey::new(IVec3::ZERO, 255).step().is_infinite());
        assert!(!RegionKey::new(IVec3::ZERO, 255).is_addressable(32));

        let ok = RegionKey::new(IVec3::ZERO, 16);
        assert_eq!(ok.checked_extent(32), Some(32 << 16));
        assert!(ok.is_addressable(32));
        assert!(!RegionKey::new(IVec3::new(i32::MAX - 16, 0, 0), 0).is_addressable(32));
    }

    #[test]
    fn test_index_layout_is_x_fastest() {
        let buf = RegionBuffer::new(RegionKey::new(IVec3::ZERO, 0), 4, vec![0.0; 64], vec![0; 64]);
        assert_eq!(buf.index(1, 0, 0), 1);
        assert_eq!(buf.index(0, 1, 0), 4);
        assert_eq!(buf.index(0, 0, 1), 16);
        assert!(buf.in_bounds(3, 3, 3));
        assert!(!buf.in_bounds(4, 0, 0));
        assert!(!buf.in_bounds(-1, 0, 0));
    }

    #[test]
    fn test_dirty_flags() {
        let mut buf =
            RegionBuffer::new(RegionKey::new(IVec3::ZERO, 0), 2, vec![0.0; 8], vec![0; 8]);
        assert!(!buf.is_dirty(MESH_DIRTY));
        buf.mark_dirty(MESH_DIRTY | EDIT_DIRTY);
        assert!(buf.is_dirty(MESH_DIRTY));
        buf.clear_dirty(MESH_DIRTY);
        assert!(!buf.is_dirty(MESH_DIRTY));
        assert!(buf.is_dirty(EDIT_DIRTY));
    }

    #[test]
    fn test_world_position_uses_step() {
        let buf = RegionBuffer::new(
            RegionKey::new(IVec3::new(10, -20, 30), 1),
            2,
            vec![0.0; 8],
            vec![0; 8],
        );
        assert_eq!(buf.world_position(1, 1, 1), Vec3::new(12.0, -18.0, 32.0));
        assert_eq!(buf.world_y(1), -18.0);
    }
}
