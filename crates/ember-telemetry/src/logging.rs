//! # Logging Setup
//!
//! One-shot tracing subscriber installation for binaries: env-filter
//! directives (overridable via `RUST_LOG`) and optional JSON output for
//! log shipping.

use crate::TelemetryError;
use rand::Rng;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default filter directives when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Install the global tracing subscriber.
pub fn init(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Probabilistic log sampling: true with probability `rate`.
///
/// `rate >= 1.0` always samples, `rate <= 0.0` never does.
#[must_use]
pub fn should_sample(rate: f64) -> bool {
    if rate >= 1.0 {
        return true;
    }
    if rate <= 0.0 {
        return false;
    }
    rand::thread_rng().gen::<f64>() < rate
}
