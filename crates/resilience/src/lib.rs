//! # Resilience - Fault-Tolerance Triad
//!
//! The three layers protecting outbound message delivery:
//!
//! 1. **Retry** — transient failures retried with exponential backoff.
//! 2. **Circuit breaker** — sustained failures trip a per-channel gate
//!    that fast-fails without I/O until the dependency looks healthy.
//! 3. **Dead letter queue** — messages that exhaust retries or hit an
//!    open circuit are durably persisted, never silently dropped.
//!
//! Each layer converts "did it work" into success, a contained failure
//! handed to the next layer, or — at the DLQ boundary — a terminal,
//! audited failure. The retry handler never writes to the DLQ itself;
//! escalation is the caller's job.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod circuit_breaker;
pub mod dlq;
pub mod retry;

// Re-export main types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitError, CircuitState, CircuitStats,
};
pub use dlq::{DeadLetterEntry, DeadLetterQueue, DlqConfig, DlqError, DlqFilter, FailureReason};
pub use retry::{retry_with_backoff, retry_with_backoff_if, RetryError, RetryPolicy};
