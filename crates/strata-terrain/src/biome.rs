//! Biome system: world-map classification and the biome rule table.
//!
//! Biomes come from a single-channel world-map image (pixel value = biome
//! id) sampled once per region, and drive height offsets, surface materials
//! and ore richness through [`HeightAndMaterialRules`].

mod map;
mod rules;
mod sampler;

pub use map::WorldMap;
pub use rules::{BiomeEntry, BiomeId, HeightAndMaterialRules, MaterialId};
pub use sampler::{BiomeSampler, WorldContext};
