//! # Shared Bus - Local Event Bus
//!
//! Single-process async pub/sub for domain events. Game logic publishes
//! typed events; subscribers register async callbacks per event kind (or a
//! wildcard); the distributed bridge taps locally-originated events and
//! injects remotely-sourced ones.
//!
//! ## Dispatch model
//!
//! ```text
//! publish() ──┐
//!             ├──→ [unbounded queue] ──→ [dispatch loop] ──→ callbacks
//! inject() ───┘                               (one task)      (sequential
//!                                                              per event)
//! ```
//!
//! - `publish` enqueues and returns immediately; publishers never wait for
//!   subscriber completion.
//! - A failing or panicking callback is logged and isolated: remaining
//!   subscribers still receive the event and the loop keeps running.
//! - `inject` delivers a remotely-sourced envelope with identical dispatch
//!   semantics but never reaches the local tap, so the bridge cannot
//!   re-publish it to the broker (no republish loop).
//! - The queue is unbounded with an alerting watermark: publishers are
//!   never blocked and nothing is dropped; sustained depth above the
//!   threshold logs a warning.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod subscriber;

// Re-export main types
pub use bus::{BusConfig, BusError, EventBus, EventOrigin};
pub use subscriber::{BoxError, SubscriberCallback, SubscriberHandle};

/// Queue depth above which the dispatch backlog is logged as a warning.
pub const DEFAULT_ALERT_THRESHOLD: usize = 10_000;

/// Capacity of the local-events tap consumed by the distributed bridge.
pub const TAP_CAPACITY: usize = 1024;
