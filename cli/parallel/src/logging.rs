//! Logging initialization.
//!
//! Logs go to stderr so they never mix with job output on stdout.

use std::io;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "PARALLEL_LOG";

/// Filter used when nothing else is configured.
const DEFAULT_FILTER: &str = "warn";

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Build the filter: explicit directives, then `PARALLEL_LOG`, then `warn`.
fn build_filter(explicit: Option<&str>) -> Result<EnvFilter> {
    if let Some(directives) = explicit {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log filter `{}`", directives));
    }

    Ok(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
}

/// Install the global subscriber.
pub fn init(explicit: Option<&str>, format: LogFormat) -> Result<()> {
    let filter = build_filter(explicit)?;
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()?,
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}
