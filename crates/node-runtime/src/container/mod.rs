//! # Core Container
//!
//! The single composition root: the bus, messaging client, circuit
//! breaker, dead letter queue, metrics collector, and bridge are built
//! here in dependency order and passed into each other explicitly. No
//! component reaches for globals.

pub mod config;

pub use config::{ApiSettings, BrokerSettings, ConfigError, NodeConfig};

use crate::bridge::EventBridge;
use ember_telemetry::MetricsCollector;
use messaging::{BrokerTransport, ClientConfig, MessagingClient};
use resilience::{CircuitBreaker, DeadLetterQueue, DlqError};
use shared_bus::EventBus;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from container construction.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The dead letter store could not be opened.
    #[error("dead letter queue init failed: {0}")]
    Dlq(#[from] DlqError),
}

/// All core components, fully wired.
pub struct CoreContainer {
    /// Local event bus.
    pub bus: Arc<EventBus>,
    /// Broker client.
    pub client: Arc<MessagingClient>,
    /// Per-channel circuit breaker.
    pub breaker: Arc<CircuitBreaker>,
    /// Dead letter queue.
    pub dlq: Arc<DeadLetterQueue>,
    /// Metrics collector.
    pub metrics: Arc<MetricsCollector>,
    /// Distributed event bridge.
    pub bridge: Arc<EventBridge>,
}

impl CoreContainer {
    /// Build the core from configuration and an injected broker
    /// transport (NATS in production, the in-memory broker in tests).
    pub async fn build(
        config: NodeConfig,
        transport: Arc<dyn BrokerTransport>,
    ) -> Result<Self, ContainerError> {
        let metrics = Arc::new(MetricsCollector::new());
        let bus = Arc::new(EventBus::with_config(config.bus));

        let breaker = Arc::new(CircuitBreaker::new(config.circuit));
        {
            let metrics = metrics.clone();
            breaker.on_transition(Arc::new(move |channel, from, to| {
                metrics.record_circuit_transition(channel, from.as_str(), to.as_str());
            }));
        }

        let dlq = Arc::new(DeadLetterQueue::open(config.dlq).await?);

        let client = Arc::new(MessagingClient::new(
            transport,
            ClientConfig {
                url: config.broker.url,
                reconnect: config.broker.reconnect,
            },
        ));
        client.on_state_change(|from, to| {
            info!(from = %from, to = %to, "broker connection state changed");
        });

        let bridge = Arc::new(EventBridge::new(
            bus.clone(),
            client.clone(),
            breaker.clone(),
            dlq.clone(),
            metrics.clone(),
            config.retry,
        ));

        Ok(Self {
            bus,
            client,
            breaker,
            dlq,
            metrics,
            bridge,
        })
    }
}
