//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest region edge (in cells) the generator accepts.
pub const MAX_CHUNK_SIZE: u32 = 128;

/// Top-level generator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World shape, biome modulation and ore settings.
    pub terrain: TerrainConfig,
    /// Cache capacities.
    pub cache: CacheConfig,
    /// Request scheduling and frame budget.
    pub scheduler: SchedulerConfig,
    /// Vegetation placement defaults.
    pub vegetation: VegetationConfig,
    /// Compute device selection.
    pub compute: ComputeConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// World generation settings shared by every region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// World seed for deterministic generation.
    pub world_seed: u64,
    /// Region edge length in cells.
    pub chunk_size: u32,
    /// Side length of the square world covered by the world map, in world units.
    pub world_size: f32,
    /// Height of the sea surface in world units.
    pub sea_level: f32,
    /// Fraction of a region's extent over which biome height offsets are
    /// blended into the neighbouring regions' offsets.
    pub blend_dist: f32,
    /// Global multiplier for biome height offsets, in `[0, 1]`.
    pub height_modulation_strength: f32,
    /// Base ore acceptance threshold before biome richness is applied.
    pub ore_threshold: f32,
    /// Material id written for ore cells.
    pub ore_material_id: u8,
    /// Minimum depth below the local surface where ore may appear.
    pub min_ore_depth: f32,
    /// Spatial frequency of the ore vein noise field.
    pub ore_vein_scale: f32,
    /// Path to the single-channel biome map image. `None` = default biome everywhere.
    pub world_map: Option<PathBuf>,
    /// Base relief noise.
    pub noise: TerrainNoiseConfig,
}

/// Fractal noise parameters for the base relief.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainNoiseConfig {
    /// Amplitude of the first octave in world units.
    pub amplitude: f32,
    /// Frequency of the first octave (cycles per world unit).
    pub base_frequency: f32,
    /// Number of octaves.
    pub octaves: u32,
    /// Amplitude multiplier between octaves.
    pub persistence: f32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f32,
}

/// Cache capacities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached region buffers and maximum cached placement sets.
    pub max_cache_entries: usize,
    /// Maximum cached per-region biome classifications.
    pub biome_cache_entries: usize,
}

/// Request scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum regions dispatched per frame tick.
    pub max_dispatch_per_frame: u32,
    /// Estimated GPU milliseconds allowed per frame before dispatch stops.
    pub frame_budget_ms: f32,
    /// Worker threads. `None` picks from the CPU count, `Some(0)` generates
    /// inline inside `tick()`.
    pub worker_threads: Option<usize>,
    /// A request running longer than this is abandoned and retried.
    pub stage_timeout_ms: u64,
    /// Attempts per region before the failure is surfaced.
    pub max_attempts: u32,
    /// Completion callbacks allowed in one generation pass.
    pub callback_ceiling: u32,
}

/// Vegetation placement defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VegetationConfig {
    /// Smallest random instance scale.
    pub scale_min: f32,
    /// Largest random instance scale.
    pub scale_max: f32,
    /// Default lower bound of the accepted world height range.
    pub height_min: f32,
    /// Default upper bound of the accepted world height range.
    pub height_max: f32,
}

/// Compute device configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComputeConfig {
    /// Try a GPU adapter first. When `false` the CPU backend is used directly.
    pub prefer_gpu: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            world_seed: 0,
            chunk_size: 32,
            world_size: 16_000.0,
            sea_level: 0.0,
            blend_dist: 0.2,
            height_modulation_strength: 1.0,
            ore_threshold: 0.75,
            ore_material_id: 20,
            min_ore_depth: 6.0,
            ore_vein_scale: 0.08,
            world_map: None,
            noise: TerrainNoiseConfig::default(),
        }
    }
}

impl Default for TerrainNoiseConfig {
    fn default() -> Self {
        Self {
            amplitude: 24.0,
            base_frequency: 0.004,
            octaves: 5,
            persistence: 0.5,
            lacunarity: 2.0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: 500,
            biome_cache_entries: 4096,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_dispatch_per_frame: 4,
            frame_budget_ms: 8.0,
            worker_threads: None,
            stage_timeout_ms: 5_000,
            max_attempts: 3,
            callback_ceiling: 100,
        }
    }
}

impl Default for VegetationConfig {
    fn default() -> Self {
        Self {
            scale_min: 0.8,
            scale_max: 1.2,
            height_min: -100.0,
            height_max: 500.0,
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self { prefer_gpu: true }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values the generator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.terrain;
        if t.chunk_size == 0 || t.chunk_size % 4 != 0 || t.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::Invalid {
                field: "terrain.chunk_size",
                reason: format!(
                    "{} must be a non-zero multiple of 4 no larger than {MAX_CHUNK_SIZE}",
                    t.chunk_size
                ),
            });
        }
        if !(t.world_size > 0.0) {
            return Err(ConfigError::Invalid {
                field: "terrain.world_size",
                reason: format!("{} must be positive", t.world_size),
            });
        }
        if !(0.0..=1.0).contains(&t.height_modulation_strength) {
            return Err(ConfigError::Invalid {
                field: "terrain.height_modulation_strength",
                reason: format!("{} is outside [0, 1]", t.height_modulation_strength),
            });
        }
        if !(0.0..=0.5).contains(&t.blend_dist) {
            return Err(ConfigError::Invalid {
                field: "terrain.blend_dist",
                reason: format!("{} is outside [0, 0.5]", t.blend_dist),
            });
        }
        if self.cache.max_cache_entries == 0 || self.cache.biome_cache_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.max_cache_entries",
                reason: "cache capacities must be at least 1".to_string(),
            });
        }
        let v = &self.vegetation;
        if v.scale_min > v.scale_max || v.scale_min <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "vegetation.scale_min",
                reason: format!("scale range [{}, {}] is empty", v.scale_min, v.scale_max),
            });
        }
        if self.scheduler.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.max_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("chunk_size: 32"));
        assert!(ron_str.contains("callback_ceiling: 100"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(terrain: (world_seed: 7), cache: ())";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.terrain.world_seed, 7);
        assert_eq!(config.terrain.chunk_size, 32);
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.terrain.world_seed = 1234;
        config.terrain.world_map = Some(PathBuf::from("maps/world.png"));
        config.scheduler.worker_threads = Some(0);

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.terrain.sea_level = 12.0;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().terrain.sea_level, 12.0);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_chunk_size_must_be_multiple_of_four() {
        let mut config = Config::default();
        config.terrain.chunk_size = 30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "terrain.chunk_size",
                ..
            })
        ));

        config.terrain.chunk_size = 0;
        assert!(config.validate().is_err());

        config.terrain.chunk_size = MAX_CHUNK_SIZE + 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strength_out_of_range_rejected() {
        let mut config = Config::default();
        config.terrain.height_modulation_strength = 1.5;
        assert!(config.validate().is_err());
        config.terrain.height_modulation_strength = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_file_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(terrain: (chunk_size: 7))",
        )
        .unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
