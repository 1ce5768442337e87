//! Configuration for the strata terrain generator.
//!
//! Settings persist to disk as RON files, are validated on load, and can be
//! overridden from the command line via clap.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CacheConfig, ComputeConfig, Config, DebugConfig, MAX_CHUNK_SIZE, SchedulerConfig,
    TerrainConfig, TerrainNoiseConfig, VegetationConfig,
};
pub use error::ConfigError;
