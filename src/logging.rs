//! Structured logging init. Stdout only — no file rotation, this runs as a plain
//! foreground service managed by whatever launched it.

use anyhow::{Result, bail};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogFormat;

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => bail!("invalid log level '{level}'"),
    }
}

/// Installs the global tracing subscriber. Call once, at the top of `main`.
pub fn init(format: LogFormat, level: &str) -> Result<()> {
    let default_level = parse_level(level)?;
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true);
            tracing_subscriber::registry().with(env_filter).with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer().pretty().with_target(true);
            tracing_subscriber::registry().with(env_filter).with(layer).init();
        }
    }

    tracing::info!(level, format = %format, "logging initialized");
    Ok(())
}
