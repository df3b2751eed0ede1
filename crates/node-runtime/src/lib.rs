//! # Emberfall Node Runtime
//!
//! The server-side composition of the event-delivery core:
//!
//! - `container/` — configuration and the single composition root that
//!   wires the bus, broker client, circuit breaker, DLQ, metrics, and
//!   bridge together with explicit dependency injection
//! - `bridge` — mirrors local domain events onto the broker and injects
//!   remote ones back into the local bus
//! - `api/` — the operator-facing HTTP surface (metrics snapshot, dead
//!   letter inspection and replay)
//!
//! ## Event flow
//!
//! ```text
//! game logic ──publish──→ [Local Bus] ──tap──→ [Bridge] ──→ [Broker]
//!                              ↑                                │
//!                              └────inject── [Bridge] ←─────────┘
//!                                            (all instances,
//!                                             echoes skipped)
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod api;
pub mod bridge;
pub mod container;

pub use bridge::EventBridge;
pub use container::{ConfigError, ContainerError, CoreContainer, NodeConfig};
