//! Tracing subscriber setup for the binary
//!
//! Logs go to stderr so stdout stays reserved for the report.

use crate::error::{VerifyError, VerifyResult};
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither a level nor `RUST_LOG` is given
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

fn build_filter(level: Option<&str>) -> VerifyResult<EnvFilter> {
    match level {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| VerifyError::Logging(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns `VerifyError::Logging` for an invalid filter directive or when a
/// subscriber is already installed.
pub fn init_tracing(level: Option<&str>, format: LogFormat) -> VerifyResult<()> {
    let filter = build_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| VerifyError::Logging(e.to_string()))
}
