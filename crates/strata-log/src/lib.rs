//! Structured logging for the strata generator.
//!
//! Console output with uptime timestamps and module paths, plus an optional
//! JSON log file for post-mortem analysis of long bakes. The level comes from
//! `RUST_LOG` when set, otherwise from the config's `debug.log_level`.

use std::path::Path;

use strata_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the JSON log file written inside the log directory.
pub const LOG_FILE_NAME: &str = "strata.log";

/// Directives applied when nothing else is configured.
///
/// GPU stacks are noisy at `info`, so they are held at `warn`.
pub const DEFAULT_DIRECTIVES: &str = "info,wgpu=warn,naga=warn";

/// Build the filter directive string for a config.
///
/// A bare level such as `"debug"` keeps the GPU crates quiet; anything with
/// a target (`"info,strata_terrain=trace"`) is passed through untouched.
pub fn filter_directives(config: Option<&Config>) -> String {
    let level = config
        .map(|c| c.debug.log_level.trim())
        .filter(|l| !l.is_empty());

    match level {
        None => DEFAULT_DIRECTIVES.to_string(),
        Some(l) if l.contains('=') || l.contains(',') => l.to_string(),
        Some(l) => format!("{l},wgpu=warn,naga=warn"),
    }
}

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file
/// * `file_logging` - write [`LOG_FILE_NAME`] into `log_dir` as well as the console
/// * `config` - source of the log level when `RUST_LOG` is unset
pub fn init_logging(log_dir: Option<&Path>, file_logging: bool, config: Option<&Config>) {
    let directives = filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true) // workers are named strata-gen-N
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if file_logging
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}
