//! Command-line argument parsing for the strata tools.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// strata command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "strata-bake", about = "Streamed terrain and vegetation generator")]
pub struct CliArgs {
    /// World seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Path to the biome world map image.
    #[arg(long)]
    pub world_map: Option<PathBuf>,

    /// Region edge length in cells.
    #[arg(long)]
    pub chunk_size: Option<u32>,

    /// Skip GPU adapter discovery and generate on the CPU.
    #[arg(long)]
    pub cpu_only: bool,

    /// Worker threads (0 = generate inline on the calling thread).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Radius, in regions, of the square streamed around the origin.
    #[arg(long, default_value_t = 2)]
    pub radius: i32,

    /// Frames to tick before giving up on outstanding regions.
    #[arg(long, default_value_t = 600)]
    pub frames: u32,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(seed) = args.seed {
            self.terrain.world_seed = seed;
        }
        if let Some(ref path) = args.world_map {
            self.terrain.world_map = Some(path.clone());
        }
        if let Some(size) = args.chunk_size {
            self.terrain.chunk_size = size;
        }
        if args.cpu_only {
            self.compute.prefer_gpu = false;
        }
        if let Some(workers) = args.workers {
            self.scheduler.worker_threads = Some(workers);
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            seed: Some(99),
            cpu_only: true,
            workers: Some(0),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.terrain.world_seed, 99);
        assert!(!config.compute.prefer_gpu);
        assert_eq!(config.scheduler.worker_threads, Some(0));
        // Non-overridden fields retain defaults
        assert_eq!(config.terrain.chunk_size, 32);
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "strata-bake",
            "--seed",
            "5",
            "--cpu-only",
            "--radius",
            "1",
            "--world-map",
            "map.png",
        ]);
        assert_eq!(args.seed, Some(5));
        assert!(args.cpu_only);
        assert_eq!(args.radius, 1);
        assert_eq!(args.frames, 600);
        assert_eq!(args.world_map, Some(PathBuf::from("map.png")));
    }
}
