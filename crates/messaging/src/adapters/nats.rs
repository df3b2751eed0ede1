//! # NATS Adapter
//!
//! Production broker transport. The broker provides per-subject FIFO
//! ordering and wildcard subscriptions; this adapter only translates
//! between the port types and the client library.

use crate::error::MessagingError;
use crate::ports::{BrokerMessage, BrokerSession, BrokerTransport, MessageStream};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;

/// Transport backed by a NATS server.
#[derive(Debug, Default)]
pub struct NatsTransport;

impl NatsTransport {
    /// Create the transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrokerTransport for NatsTransport {
    async fn connect(&self, url: &str) -> Result<Arc<dyn BrokerSession>, MessagingError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| MessagingError::Connect(e.to_string()))?;
        info!(url, "connected to broker");
        Ok(Arc::new(NatsSession { client }))
    }
}

struct NatsSession {
    client: async_nats::Client,
}

#[async_trait]
impl BrokerSession for NatsSession {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| MessagingError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, pattern: &str) -> Result<MessageStream, MessagingError> {
        let subscriber = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| MessagingError::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        Ok(subscriber
            .map(|msg| BrokerMessage {
                subject: msg.subject.to_string(),
                payload: msg.payload.to_vec(),
            })
            .boxed())
    }

    async fn flush(&self) -> Result<(), MessagingError> {
        self.client
            .flush()
            .await
            .map_err(|e| MessagingError::Publish {
                subject: "<flush>".to_string(),
                reason: e.to_string(),
            })
    }
}
