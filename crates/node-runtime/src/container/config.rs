//! # Node Configuration
//!
//! Unified configuration for the event-delivery core. Plain structs with
//! defaults; a small set of `EMBER_*` environment variables override the
//! values that differ per deployment.

use resilience::{CircuitBreakerConfig, DlqConfig, RetryPolicy};
use shared_bus::BusConfig;
use shared_fsm::ReconnectPolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value}")]
    InvalidEnv {
        /// The variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Broker connection settings.
    pub broker: BrokerSettings,
    /// Retry policy for bridge deliveries.
    pub retry: RetryPolicy,
    /// Circuit breaker thresholds.
    pub circuit: CircuitBreakerConfig,
    /// Dead letter queue settings.
    pub dlq: DlqConfig,
    /// Local event bus settings.
    pub bus: BusConfig,
    /// Admin API settings.
    pub api: ApiSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            retry: RetryPolicy::default(),
            circuit: CircuitBreakerConfig::default(),
            dlq: DlqConfig::new("./data/dlq"),
            bus: BusConfig::default(),
            api: ApiSettings::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults plus `EMBER_*` environment overrides.
    ///
    /// - `EMBER_BROKER_URL` — broker address
    /// - `EMBER_DLQ_DIR` — dead letter directory
    /// - `EMBER_DLQ_RETENTION_DAYS` — retention window
    /// - `EMBER_API_ADDR` — admin API bind address
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("EMBER_BROKER_URL") {
            config.broker.url = url;
        }
        if let Ok(dir) = std::env::var("EMBER_DLQ_DIR") {
            config.dlq.dir = PathBuf::from(dir);
        }
        if let Ok(days) = std::env::var("EMBER_DLQ_RETENTION_DAYS") {
            let parsed: u64 = days.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "EMBER_DLQ_RETENTION_DAYS",
                value: days.clone(),
            })?;
            config.dlq.retention = Duration::from_secs(parsed * 24 * 60 * 60);
        }
        if let Ok(addr) = std::env::var("EMBER_API_ADDR") {
            config.api.bind_addr = addr.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "EMBER_API_ADDR",
                value: addr.clone(),
            })?;
        }

        Ok(config)
    }
}

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Broker URL handed to the transport adapter.
    pub url: String,
    /// Reconnect budget and backoff shape.
    pub reconnect: ReconnectPolicy,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Admin API settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Bind address for the admin HTTP server.
    pub bind_addr: SocketAddr,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 7780).into(),
        }
    }
}
