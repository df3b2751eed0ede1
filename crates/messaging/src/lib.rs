//! # Messaging - Broker Client
//!
//! Wraps the subject-based message broker behind a transport port so the
//! rest of the core never touches a broker handle directly. The client
//! owns the single broker session and drives its lifecycle through the
//! shared connection state machine: one attempt in flight, exponential
//! backoff, terminal failure after the attempt budget.
//!
//! ## Subject families
//!
//! - `events.domain.<kind>` — mirrored domain events (wildcard
//!   `events.domain.>` consumed by every instance)
//! - `chat.say.<room_id>`, `combat.<room_id>` — real-time game messages
//!   sharing the same client
//!
//! ## Adapters
//!
//! - [`adapters::NatsTransport`] — the production broker
//! - [`adapters::MemoryBroker`] — in-process broker with per-subject FIFO
//!   and wildcard matching, used by the test suites

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod client;
pub mod error;
pub mod ports;
pub mod subjects;

// Re-export main types
pub use client::{ClientConfig, MessagingClient};
pub use error::MessagingError;
pub use ports::{BrokerMessage, BrokerSession, BrokerTransport, MessageStream};
