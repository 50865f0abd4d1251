//! Tracing subscriber setup

use crate::error::{PulseError, Result};
use orchestrator::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Build the level filter: `RUST_LOG` wins, then the configured level,
/// raised to `debug` by `--verbose`.
pub fn env_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if verbose { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// machine readable.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = env_filter(config, verbose);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match config.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    };
    installed.map_err(|e| PulseError::Logging(e.to_string()))
}
