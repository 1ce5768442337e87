//! Static biome table: height offset, ore richness and layer materials.

/// Material ids written into region material buffers.
pub struct MaterialId;

impl MaterialId {
    pub const AIR: u8 = 0;
    pub const STONE: u8 = 1;
    pub const DIRT: u8 = 2;
    pub const GRASS: u8 = 3;
    pub const SAND: u8 = 4;
    pub const SNOW: u8 = 5;
    pub const ICE: u8 = 6;
    pub const GRAVEL: u8 = 7;
    pub const MUD: u8 = 8;
    pub const CLAY: u8 = 9;
    pub const BASALT: u8 = 10;
}

/// Biome identifier as stored in the world map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct BiomeId(pub u8);

impl BiomeId {
    pub const PLAINS: BiomeId = BiomeId(0);
    pub const FOREST: BiomeId = BiomeId(1);
    pub const DESERT: BiomeId = BiomeId(2);
    pub const TUNDRA: BiomeId = BiomeId(3);
    pub const GLACIER: BiomeId = BiomeId(4);
    pub const BEACH: BiomeId = BiomeId(5);
    pub const OCEAN: BiomeId = BiomeId(6);
    pub const SWAMP: BiomeId = BiomeId(7);
    pub const JUNGLE: BiomeId = BiomeId(8);
    pub const SAVANNA: BiomeId = BiomeId(9);
    pub const TAIGA: BiomeId = BiomeId(10);
    pub const MOUNTAINS: BiomeId = BiomeId(11);
    pub const HILLS: BiomeId = BiomeId(12);
    pub const BADLANDS: BiomeId = BiomeId(13);
    pub const VOLCANIC: BiomeId = BiomeId(14);
    pub const MUSHROOM: BiomeId = BiomeId(15);
    pub const MEADOW: BiomeId = BiomeId(16);
}

/// Properties of one biome.
#[derive(Clone, Debug, PartialEq)]
pub struct BiomeEntry {
    pub id: BiomeId,
    pub name: &'static str,
    /// Surface raise in world units, within `[-3, 3]`.
    pub height_offset: f32,
    /// Ore threshold multiplier, within `[0.5, 2.0]`.
    pub ore_richness: f32,
    pub surface_material: u8,
    pub subsurface_material: u8,
}

const fn entry(
    id: BiomeId,
    name: &'static str,
    height_offset: f32,
    ore_richness: f32,
    surface_material: u8,
    subsurface_material: u8,
) -> BiomeEntry {
    BiomeEntry {
        id,
        name,
        height_offset,
        ore_richness,
        surface_material,
        subsurface_material,
    }
}

use MaterialId as M;

const DEFAULT_TABLE: [BiomeEntry; 17] = [
    entry(BiomeId::PLAINS, "plains", 0.0, 1.0, M::DIRT, M::DIRT),
    entry(BiomeId::FOREST, "forest", 0.5, 1.0, M::DIRT, M::DIRT),
    entry(BiomeId::DESERT, "desert", -0.5, 0.8, M::SAND, M::SAND),
    entry(BiomeId::TUNDRA, "tundra", 0.5, 1.2, M::SNOW, M::DIRT),
    entry(BiomeId::GLACIER, "glacier", 1.5, 0.6, M::ICE, M::ICE),
    entry(BiomeId::BEACH, "beach", -1.0, 0.5, M::SAND, M::SAND),
    entry(BiomeId::OCEAN, "ocean", -3.0, 0.7, M::SAND, M::GRAVEL),
    entry(BiomeId::SWAMP, "swamp", -1.5, 0.9, M::MUD, M::CLAY),
    entry(BiomeId::JUNGLE, "jungle", 0.5, 1.3, M::GRASS, M::DIRT),
    entry(BiomeId::SAVANNA, "savanna", 0.0, 1.1, M::DIRT, M::DIRT),
    entry(BiomeId::TAIGA, "taiga", 1.0, 1.2, M::DIRT, M::DIRT),
    entry(BiomeId::MOUNTAINS, "mountains", 3.0, 1.8, M::GRAVEL, M::STONE),
    entry(BiomeId::HILLS, "hills", 2.0, 1.4, M::GRASS, M::DIRT),
    entry(BiomeId::BADLANDS, "badlands", 1.0, 1.6, M::CLAY, M::CLAY),
    entry(BiomeId::VOLCANIC, "volcanic", 2.5, 2.0, M::BASALT, M::BASALT),
    entry(BiomeId::MUSHROOM, "mushroom", -0.5, 1.5, M::MUD, M::DIRT),
    entry(BiomeId::MEADOW, "meadow", 0.0, 1.0, M::GRASS, M::DIRT),
];

/// Clamp bounds for the richness-adjusted ore threshold.
pub const MIN_ORE_THRESHOLD: f32 = 0.3;
pub const MAX_ORE_THRESHOLD: f32 = 0.9;

/// Pure lookup table from biome id to generation rules.
///
/// Unknown ids resolve to the plains entry.
#[derive(Clone, Debug)]
pub struct HeightAndMaterialRules {
    entries: Vec<BiomeEntry>,
}

impl Default for HeightAndMaterialRules {
    fn default() -> Self {
        Self {
            entries: DEFAULT_TABLE.to_vec(),
        }
    }
}

impl HeightAndMaterialRules {
    /// Build from a custom table. Entry `0` is the fallback; ids need not be dense.
    pub fn from_entries(mut entries: Vec<BiomeEntry>) -> Self {
        entries.sort_by_key(|e| e.id);
        entries.dedup_by_key(|e| e.id);
        for e in &mut entries {
            e.height_offset = e.height_offset.clamp(-3.0, 3.0);
            e.ore_richness = e.ore_richness.clamp(0.5, 2.0);
        }
        if entries.is_empty() {
            return Self::default();
        }
        Self { entries }
    }

    pub fn entry(&self, id: BiomeId) -> &BiomeEntry {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .map(|i| &self.entries[i])
            .unwrap_or(&self.entries[0])
    }

    pub fn name(&self, id: BiomeId) -> &'static str {
        self.entry(id).name
    }

    pub fn id_by_name(&self, name: &str) -> Option<BiomeId> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.id)
    }

    /// Unscaled height offset in world units.
    pub fn height_offset(&self, id: BiomeId) -> f32 {
        self.entry(id).height_offset
    }

    pub fn ore_richness(&self, id: BiomeId) -> f32 {
        self.entry(id).ore_richness
    }

    /// `clamp(base - (richness - 1) * 0.1, 0.3, 0.9)`.
    pub fn adjusted_threshold(&self, base_threshold: f32, id: BiomeId) -> f32 {
        adjusted_threshold(base_threshold, self.ore_richness(id))
    }

    pub fn surface_material(&self, id: BiomeId) -> u8 {
        self.entry(id).surface_material
    }

    pub fn subsurface_material(&self, id: BiomeId) -> u8 {
        self.entry(id).subsurface_material
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ore acceptance threshold shifted by biome richness.
pub fn adjusted_threshold(base_threshold: f32, richness: f32) -> f32 {
    let t = base_threshold - (richness - 1.0) * 0.1;
    if t.is_nan() {
        return MAX_ORE_THRESHOLD;
    }
    t.clamp(MIN_ORE_THRESHOLD, MAX_ORE_THRESHOLD)
}
