//! # Broker Transport Port
//!
//! The outbound port the messaging client drives. Adapters implement it
//! per technology; everything above this boundary is broker-agnostic.

use crate::error::MessagingError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// A message received from the broker.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    /// The subject the message was published under.
    pub subject: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

/// Stream of messages for one subscription.
pub type MessageStream = BoxStream<'static, BrokerMessage>;

/// Factory for broker sessions.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Dial the broker and perform the handshake.
    async fn connect(&self, url: &str) -> Result<Arc<dyn BrokerSession>, MessagingError>;
}

/// One live broker connection.
///
/// The session handle is owned exclusively by the messaging client; no
/// other component holds or mutates it.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Publish a message under a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), MessagingError>;

    /// Subscribe to a wildcard-capable subject pattern.
    async fn subscribe(&self, pattern: &str) -> Result<MessageStream, MessagingError>;

    /// Flush pending outbound messages.
    async fn flush(&self) -> Result<(), MessagingError>;
}
