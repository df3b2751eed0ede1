//! # Client Transport
//!
//! The game-client side of the real-time connection: a reconnecting
//! WebSocket client whose lifecycle is governed by the same connection
//! state machine design as the server's broker client. The machine makes
//! every dial/backoff/give-up decision; this crate only executes them.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;

pub use client::{TransportClient, TransportConfig, TransportError, TransportEvent};
