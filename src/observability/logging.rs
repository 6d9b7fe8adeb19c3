//! # Logging
//!
//! Tracing subscriber setup. `RUST_LOG` takes precedence over the configured
//! log level.

use crate::config::ReconcilerConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(config: &ReconcilerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.with_target(true).try_init()
    };

    result.map_err(|e| anyhow!("Failed to initialize tracing subscriber: {}", e))
}
