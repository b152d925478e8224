//! Tracing subscriber setup shared by the binaries.

use std::str::FromStr;

use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the process logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

fn parse_level(log_level: &str) -> (tracing::Level, bool) {
    match log_level.to_lowercase().as_str() {
        "trace" => (tracing::Level::TRACE, true),
        "debug" => (tracing::Level::DEBUG, true),
        "info" => (tracing::Level::INFO, true),
        "warn" => (tracing::Level::WARN, true),
        "error" => (tracing::Level::ERROR, true),
        _ => (tracing::Level::INFO, false),
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `log_level` when set.
pub fn init_logger(log_level: &str, format: LogFormat) {
    let (level, recognized) = parse_level(log_level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
    };

    if installed.is_err() {
        warn!("Global subscriber already installed, keeping it");
    }
    if !recognized {
        warn!("Invalid log level '{}', defaulting to 'info'", log_level);
    }
}
