//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence; otherwise the configured level applies to this crate and
//! `warn` to everything else.

use anyhow::{anyhow, Result};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

fn filter_for(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive: Directive = format!("scan_daq={level}").parse()?;
    Ok(EnvFilter::new("warn").add_directive(directive))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails on an invalid level or if a subscriber is already installed.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let filter = filter_for(level)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

/// Install the subscriber at the level named in `config`.
///
/// # Errors
///
/// See [`init`].
pub fn init_from_config(config: &AppConfig, format: LogFormat) -> Result<()> {
    init(&config.application.log_level, format)
}
