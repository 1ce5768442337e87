//! Region generation: base SDF from the density pipeline, biome height
//! modulation blended across region borders, then layered materials and ore.

use std::sync::Arc;
use std::time::Instant;

use noise::{NoiseFn, Simplex};
use strata_compute::{ComputeBackend, DensityParams, DispatchParams, PipelineId, decode_density};
use strata_config::TerrainConfig;

use crate::biome::{BiomeId, BiomeSampler, HeightAndMaterialRules, MaterialId};
use crate::error::TerrainError;
use crate::region::{RegionBuffer, RegionKey};

/// Thickness of the surface material layer, in world units below the surface.
pub const SURFACE_BAND: f32 = 1.5;
/// Thickness of the subsurface layer beneath the surface band.
pub const SUBSURFACE_BAND: f32 = 3.0;

const ORE_SALT: u32 = 0x0E0E_5EED;

/// Output of one generation attempt.
#[derive(Debug)]
pub struct GeneratedRegion {
    pub buffer: RegionBuffer,
    pub biome_id: BiomeId,
    /// Time this call spent dispatching and reading back the density field.
    pub gpu_time_ms: f32,
}

/// Produces [`RegionBuffer`]s through a [`ComputeBackend`].
pub struct RegionGenerator {
    config: TerrainConfig,
    sampler: Arc<BiomeSampler>,
    rules: Arc<HeightAndMaterialRules>,
    backend: Arc<dyn ComputeBackend>,
}

impl RegionGenerator {
    pub fn new(
        config: TerrainConfig,
        sampler: Arc<BiomeSampler>,
        rules: Arc<HeightAndMaterialRules>,
        backend: Arc<dyn ComputeBackend>,
    ) -> Self {
        Self {
            config,
            sampler,
            rules,
            backend,
        }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    pub fn sampler(&self) -> &Arc<BiomeSampler> {
        &self.sampler
    }

    pub fn backend(&self) -> &Arc<dyn ComputeBackend> {
        &self.backend
    }

    /// Density parameters for a region. Attempt `n` uses `world_seed + n`.
    pub fn density_params(&self, key: RegionKey, attempt: u32) -> DensityParams {
        let noise = &self.config.noise;
        let origin = key.origin.as_vec3();
        DensityParams {
            origin_x: origin.x,
            origin_y: origin.y,
            origin_z: origin.z,
            step: key.step(),
            chunk_size: self.config.chunk_size,
            seed: fold_seed(self.config.world_seed.wrapping_add(attempt as u64)),
            sea_level: self.config.sea_level,
            amplitude: noise.amplitude,
            base_frequency: noise.base_frequency,
            octaves: noise.octaves,
            persistence: noise.persistence,
            lacunarity: noise.lacunarity,
        }
    }

    /// Run the density pipeline and read the raw SDF back, with the time
    /// this call waited on the backend.
    ///
    /// Timed locally: the backend's last dispatch time may belong to another
    /// worker sharing it.
    pub fn base_density(&self, key: RegionKey, attempt: u32) -> Result<(Vec<f32>, f32), TerrainError> {
        let params = DispatchParams::Density(self.density_params(key, attempt));
        let started = Instant::now();
        let handle = self.backend.dispatch(PipelineId::Density, &params, &[])?;
        let bytes = self.backend.read_back(handle);
        let elapsed_ms = started.elapsed().as_secs_f32() * 1000.0;
        self.backend.release(handle);
        let sdf = decode_density(&bytes?)?;
        Ok((sdf, elapsed_ms))
    }

    /// Generate one region.
    pub fn generate(&self, key: RegionKey, attempt: u32) -> Result<GeneratedRegion, TerrainError> {
        let size = self.config.chunk_size as usize;
        let (mut sdf, gpu_time_ms) = self.base_density(key, attempt)?;
        let biome_id = self.sampler.biome_for_region(key);

        let strength = self.config.height_modulation_strength;
        if strength > 0.0 {
            let offsets = self.column_offsets(key);
            for z in 0..size {
                for x in 0..size {
                    let shift = offsets[x + size * z] * strength;
                    for y in 0..size {
                        sdf[x + size * (y + size * z)] -= shift;
                    }
                }
            }
        }

        let materials = self.assign_materials(key, &sdf, biome_id, attempt);
        tracing::debug!(
            "Generated region {key} biome={} attempt={attempt} in {gpu_time_ms:.2} ms",
            self.rules.name(biome_id)
        );

        Ok(GeneratedRegion {
            buffer: RegionBuffer::new(key, self.config.chunk_size, sdf, materials),
            biome_id,
            gpu_time_ms,
        })
    }

    /// Per-column height offset, blended towards neighbouring regions near
    /// the borders. Weights are 0.5/0.5 exactly on a shared border, so
    /// adjacent regions agree there.
    pub fn column_offsets(&self, key: RegionKey) -> Vec<f32> {
        let size = self.config.chunk_size as usize;
        let chunk = self.config.chunk_size;
        let blend = self.config.blend_dist;

        let mut neighbour = [[0.0f32; 3]; 3];
        for (dz, row) in neighbour.iter_mut().enumerate() {
            for (dx, offset) in row.iter_mut().enumerate() {
                let k = key.neighbour(chunk, dx as i32 - 1, dz as i32 - 1);
                let biome = if dx == 1 && dz == 1 {
                    self.sampler.biome_for_region(key)
                } else if blend > 0.0 {
                    self.sampler.biome_for_region(k)
                } else {
                    continue;
                };
                *offset = self.rules.height_offset(biome);
            }
        }

        let mut offsets = vec![0.0f32; size * size];
        for z in 0..size {
            let wz = border_weights(z as f32 / size as f32, blend);
            for x in 0..size {
                let wx = border_weights(x as f32 / size as f32, blend);
                let mut total = 0.0;
                for (j, wj) in wz.iter().enumerate() {
                    for (i, wi) in wx.iter().enumerate() {
                        total += wi * wj * neighbour[j][i];
                    }
                }
                offsets[x + size * z] = total;
            }
        }
        offsets
    }

    fn assign_materials(&self, key: RegionKey, sdf: &[f32], biome: BiomeId, attempt: u32) -> Vec<u8> {
        let size = self.config.chunk_size as usize;
        let surface = self.rules.surface_material(biome);
        let subsurface = self.rules.subsurface_material(biome);
        let threshold = self
            .rules
            .adjusted_threshold(self.config.ore_threshold, biome);
        let ore_seed = fold_seed(self.config.world_seed.wrapping_add(attempt as u64)) ^ ORE_SALT;
        let veins = Simplex::new(ore_seed);
        let scale = self.config.ore_vein_scale as f64;
        let origin = key.origin.as_vec3();
        let step = key.step();

        let mut materials = vec![MaterialId::AIR; sdf.len()];
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let i = x + size * (y + size * z);
                    let value = sdf[i];
                    if value > 0.0 {
                        continue;
                    }
                    let depth = -value;
                    materials[i] = if depth < SURFACE_BAND {
                        surface
                    } else if depth < SURFACE_BAND + SUBSURFACE_BAND {
                        subsurface
                    } else if depth >= self.config.min_ore_depth {
                        let wx = (origin.x + x as f32 * step) as f64;
                        let wy = (origin.y + y as f32 * step) as f64;
                        let wz = (origin.z + z as f32 * step) as f64;
                        let n = veins.get([wx * scale, wy * scale, wz * scale]);
                        if ((n + 1.0) * 0.5) as f32 > threshold {
                            self.config.ore_material_id
                        } else {
                            MaterialId::STONE
                        }
                    } else {
                        MaterialId::STONE
                    };
                }
            }
        }
        materials
    }
}

/// Weights of the previous, own and next region for a column at fraction
/// `t ∈ [0, 1)` across the region.
fn border_weights(t: f32, blend: f32) -> [f32; 3] {
    if blend <= 0.0 {
        return [0.0, 1.0, 0.0];
    }
    let prev = 0.5 * (1.0 - smoothstep(0.0, blend, t));
    let next = 0.5 * smoothstep(1.0 - blend, 1.0, t);
    [prev, 1.0 - prev - next, next]
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn fold_seed(seed: u64) -> u32 {
    (seed ^ (seed >> 32)) as u32
}
