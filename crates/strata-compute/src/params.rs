//! Pipeline identifiers, parameter blocks and output layouts.
//!
//! Parameter structs are uploaded verbatim as WGSL uniforms, so every field is
//! a 4-byte scalar and each struct is padded to a multiple of 16 bytes.

use bytemuck::{Pod, Zeroable};

use crate::error::ComputeError;

/// Maximum placements kept from a single placement pass.
pub const MAX_PLACEMENTS: u32 = 4096;

/// Largest grid a placement dispatch accepts per axis.
pub const MAX_GRID_STEPS: u32 = 1024;

/// Bytes before the first record in a placement output buffer.
pub const PLACEMENT_HEADER_BYTES: usize = 16;

/// Size of one [`RawPlacement`] in bytes.
pub const PLACEMENT_RECORD_BYTES: usize = std::mem::size_of::<RawPlacement>();

/// Compute pipelines a backend provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineId {
    /// Base signed-distance field for one region.
    Density,
    /// Vegetation candidates over one region's surface.
    Placement,
}

impl PipelineId {
    /// Number of input handles the pipeline binds.
    pub fn input_count(self) -> usize {
        match self {
            PipelineId::Density => 0,
            // sdf buffer, biome map
            PipelineId::Placement => 2,
        }
    }
}

/// Density pipeline parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DensityParams {
    pub origin_x: f32,
    pub origin_y: f32,
    pub origin_z: f32,
    /// World units per cell (`2^detail_level`).
    pub step: f32,
    pub chunk_size: u32,
    pub seed: u32,
    pub sea_level: f32,
    pub amplitude: f32,
    pub base_frequency: f32,
    pub octaves: u32,
    pub persistence: f32,
    pub lacunarity: f32,
}

impl DensityParams {
    /// Cells in the region volume.
    pub fn cell_count(&self) -> usize {
        let s = self.chunk_size as usize;
        s * s * s
    }

    /// Bytes of the density output buffer.
    pub fn output_bytes(&self) -> usize {
        self.cell_count() * std::mem::size_of::<f32>()
    }
}

/// Placement pipeline parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PlacementParams {
    pub origin_x: f32,
    pub origin_y: f32,
    pub origin_z: f32,
    pub grid_spacing: f32,
    pub chunk_size: u32,
    /// Grid cells per axis, `ceil(region_extent / grid_spacing)`.
    pub grid_steps: u32,
    pub seed: u32,
    pub vegetation_type: u32,
    pub density: f32,
    pub noise_frequency: f32,
    pub slope_max_deg: f32,
    pub height_min: f32,
    pub height_max: f32,
    pub scale_min: f32,
    pub scale_max: f32,
    /// Bit `n` set = biome id `n` permits this vegetation type.
    pub allowed_biome_mask: u32,
    pub world_size: f32,
    /// World units per cell of the sdf input.
    pub step: f32,
    /// Records kept after sorting by cell; the output holds every candidate.
    pub max_placements: u32,
    pub _pad: u32,
}

impl PlacementParams {
    /// Record slots in the output buffer: one per grid cell.
    pub fn capacity(&self) -> usize {
        let n = self.grid_steps as usize;
        n * n
    }

    /// Bytes of the placement output buffer.
    pub fn output_bytes(&self) -> usize {
        PLACEMENT_HEADER_BYTES + self.capacity() * PLACEMENT_RECORD_BYTES
    }

    /// Bytes the sdf input must hold.
    pub fn sdf_bytes(&self) -> usize {
        let s = self.chunk_size as usize;
        s * s * s * std::mem::size_of::<f32>()
    }
}

/// Parameter block for one dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchParams {
    Density(DensityParams),
    Placement(PlacementParams),
}

impl DispatchParams {
    /// Pipeline this block belongs to.
    pub fn pipeline(&self) -> PipelineId {
        match self {
            DispatchParams::Density(_) => PipelineId::Density,
            DispatchParams::Placement(_) => PipelineId::Placement,
        }
    }

    /// Raw uniform bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DispatchParams::Density(p) => bytemuck::bytes_of(p),
            DispatchParams::Placement(p) => bytemuck::bytes_of(p),
        }
    }
}

/// One placement as laid out in the output buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RawPlacement {
    pub position: [f32; 3],
    pub rotation_y: f32,
    pub scale: f32,
    pub vegetation_type: u32,
    /// Grid cell index (`j * grid_steps + i`), used as the sort key.
    pub cell: u32,
    pub normal: [f32; 3],
    pub _pad: [u32; 2],
}

/// Decode a placement output buffer, sorted by grid cell and truncated to the
/// `limit` lowest cells.
///
/// Records land in the buffer in completion order, so the cap is applied only
/// after sorting. A header count above the record capacity is clamped.
pub fn decode_placements(bytes: &[u8], limit: u32) -> Result<Vec<RawPlacement>, ComputeError> {
    if bytes.len() < PLACEMENT_HEADER_BYTES {
        return Err(ComputeError::MalformedOutput(format!(
            "{} bytes is shorter than the placement header",
            bytes.len()
        )));
    }
    let count = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let capacity = (bytes.len() - PLACEMENT_HEADER_BYTES) / PLACEMENT_RECORD_BYTES;
    let count = count.min(capacity);

    let end = PLACEMENT_HEADER_BYTES + count * PLACEMENT_RECORD_BYTES;
    let mut records: Vec<RawPlacement> =
        bytemuck::pod_collect_to_vec(&bytes[PLACEMENT_HEADER_BYTES..end]);
    records.sort_by_key(|r| r.cell);
    records.truncate(limit as usize);
    Ok(records)
}

/// Decode a density output buffer into one `f32` per cell.
pub fn decode_density(bytes: &[u8]) -> Result<Vec<f32>, ComputeError> {
    if bytes.len() % std::mem::size_of::<f32>() != 0 {
        return Err(ComputeError::MalformedOutput(format!(
            "{} bytes is not a whole number of f32 cells",
            bytes.len()
        )));
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

/// Encode placements in the output buffer layout (header + records).
pub(crate) fn encode_placements(records: &[RawPlacement], capacity: usize) -> Vec<u8> {
    let mut out = vec![0u8; PLACEMENT_HEADER_BYTES + capacity * PLACEMENT_RECORD_BYTES];
    out[0..4].copy_from_slice(&(records.len() as u32).to_le_bytes());
    let body: &[u8] = bytemuck::cast_slice(records);
    out[PLACEMENT_HEADER_BYTES..PLACEMENT_HEADER_BYTES + body.len()].copy_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cell: u32) -> RawPlacement {
        RawPlacement {
            position: [cell as f32, 1.0, 2.0],
            rotation_y: 0.5,
            scale: 1.0,
            vegetation_type: 3,
            cell,
            normal: [0.0, 1.0, 0.0],
            _pad: [0; 2],
        }
    }

    #[test]
    fn test_uniform_layouts_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<DensityParams>(), 48);
        assert_eq!(std::mem::size_of::<PlacementParams>(), 80);
        assert_eq!(PLACEMENT_RECORD_BYTES, 48);
    }

    #[test]
    fn test_decode_sorts_by_cell() {
        let bytes = encode_placements(&[record(9), record(2), record(5)], 8);
        let decoded = decode_placements(&bytes, MAX_PLACEMENTS).unwrap();
        let cells: Vec<u32> = decoded.iter().map(|r| r.cell).collect();
        assert_eq!(cells, vec![2, 5, 9]);
    }

    #[test]
    fn test_decode_limit_keeps_lowest_cells() {
        // Completion order from a parallel dispatch is arbitrary.
        let shuffled: Vec<RawPlacement> = [40, 3, 17, 0, 25, 8, 31, 12].map(record).to_vec();
        let bytes = encode_placements(&shuffled, 16);
        let kept: Vec<u32> = decode_placements(&bytes, 3)
            .unwrap()
            .iter()
            .map(|r| r.cell)
            .collect();
        assert_eq!(kept, vec![0, 3, 8]);
    }

    #[test]
    fn test_output_holds_every_grid_cell() {
        let mut p = PlacementParams::zeroed();
        p.grid_steps = 70;
        p.max_placements = 16;
        assert_eq!(p.capacity(), 4900);
        assert_eq!(p.output_bytes(), PLACEMENT_HEADER_BYTES + 4900 * PLACEMENT_RECORD_BYTES);
    }

    #[test]
    fn test_decode_clamps_overflowing_count() {
        let mut bytes = encode_placements(&[record(0), record(1)], 2);
        bytes[0..4].copy_from_slice(&100u32.to_le_bytes());
        assert_eq!(decode_placements(&bytes, MAX_PLACEMENTS).unwrap().len(), 2);
    }

    #[test]
    fn test_decode_rejects_truncated_header() {
        assert!(matches!(
            decode_placements(&[0u8; 4], MAX_PLACEMENTS),
            Err(ComputeError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_params_select_pipeline() {
        let d = DispatchParams::Density(DensityParams::zeroed());
        let p = DispatchParams::Placement(PlacementParams::zeroed());
        assert_eq!(d.pipeline(), PipelineId::Density);
        assert_eq!(p.pipeline(), PipelineId::Placement);
        assert_eq!(d.as_bytes().len(), 48);
        assert_eq!(p.as_bytes().len(), 80);
    }
}
