//! # Messaging Errors

use thiserror::Error;

/// Errors from broker operations.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Dialing the broker failed.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// No live broker session (disconnected, reconnecting, or failed).
    #[error("not connected to broker")]
    NotConnected,

    /// A connect was requested while one is already in flight or the
    /// connection is already established.
    #[error("connection attempt already in progress")]
    AlreadyConnecting,

    /// Publishing a message failed.
    #[error("publish to {subject} failed: {reason}")]
    Publish {
        /// Target subject.
        subject: String,
        /// Underlying failure.
        reason: String,
    },

    /// Establishing a subscription failed.
    #[error("subscribe to {pattern} failed: {reason}")]
    Subscribe {
        /// Subject pattern.
        pattern: String,
        /// Underlying failure.
        reason: String,
    },
}
