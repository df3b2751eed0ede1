//! # Ember Telemetry
//!
//! Observability for the event-delivery core: tracing/logging setup and
//! the thread-safe per-channel metrics collector behind the admin API.
//!
//! Metrics are plain counters copied out as immutable snapshots; every
//! mutating method is safe to call concurrently from any dispatch path.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod logging;
pub mod metrics;

pub use logging::{init as init_logging, should_sample, LogConfig};
pub use metrics::{ChannelSnapshot, MetricsCollector, MetricsSnapshot, ProcessingTimer};

use thiserror::Error;

/// Errors from telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Logging subscriber installation failed.
    #[error("logging init failed: {0}")]
    LoggingInit(String),
}
