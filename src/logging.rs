//! Tracing subscriber setup for the binary

use crate::config::LoggingConfig;
use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Logs go to stderr so stdout stays usable
/// for JSON output. `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let default_level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .with_target(false);

    // already installed is fine
    let _ = if config.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
