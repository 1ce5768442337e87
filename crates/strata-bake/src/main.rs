//! `strata-bake`: generate a square of terrain regions with vegetation and
//! print the resulting telemetry as JSON.
//!
//! Run with: `cargo run -p strata-bake -- --radius 3 --cpu-only`

mod bake;
mod platform;

use clap::Parser;
use strata_config::{CliArgs, Config};
use strata_terrain::TerrainWorld;
use tracing::info;

fn main() {
    let args = CliArgs::parse();

    let dirs = match platform::BakeDirs::resolve() {
        Ok(dirs) => dirs.with_config_override(args.config.as_deref()),
        Err(e) => {
            eprintln!("Failed to resolve platform directories: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to create platform directories: {e}");
        std::process::exit(1);
    }

    let mut config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(2);
    }

    strata_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    info!("Config: {}", dirs.config_dir.display());
    info!(
        "Baking radius {} (seed {}, chunk size {})",
        args.radius, config.terrain.world_seed, config.terrain.chunk_size
    );

    let world = match TerrainWorld::new(config) {
        Ok(world) => world,
        Err(e) => {
            tracing::error!("Failed to build terrain world: {e}");
            std::process::exit(1);
        }
    };
    info!("Backend: {}", world.backend_status());

    let summary = match bake::run(&world, args.radius, args.frames) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Bake failed: {e}");
            std::process::exit(1);
        }
    };

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("Failed to encode summary: {e}");
            std::process::exit(1);
        }
    }
}
