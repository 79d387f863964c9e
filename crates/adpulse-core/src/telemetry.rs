//! Tracing subscriber setup.
//!
//! `RUST_LOG` always wins over the configured level so operators can raise
//! verbosity of a single target without touching config files.

#[cfg(feature = "telemetry")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::AdpulseResult;
use serde::{Deserialize, Serialize};

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, multi-line output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Builds the default filter directive from a base level.
#[must_use]
pub fn default_directive(log_level: &str) -> String {
    format!("{log_level},adpulse=debug,tower_http=debug,sqlx=warn")
}

/// Initializes the global tracing subscriber.
#[cfg(feature = "telemetry")]
pub fn init_tracing(log_level: &str, format: LogFormat) -> AdpulseResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| crate::AdpulseError::Internal(format!("Failed to initialize tracing: {}", e)))?;

    tracing::info!(log_level = %log_level, format = ?format, "Tracing initialized");
    Ok(())
}

/// No-op when the telemetry feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_log_level: &str, _format: LogFormat) -> AdpulseResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_deserialize() {
        let json: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(json, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn test_default_directive() {
        let directive = default_directive("warn");
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("adpulse=debug"));
    }
}
