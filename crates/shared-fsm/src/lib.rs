//! # Shared FSM - Connection Lifecycle State Machine
//!
//! A pure decision function governing one logical network connection. The
//! machine never performs I/O: drivers (the broker client, the game-client
//! transport) feed it inputs and execute the actions it returns.
//!
//! ## Why a state machine
//!
//! The machine itself is the mutual-exclusion mechanism for connection
//! attempts: only the [`Action::Dial`] output grants permission to dial,
//! and it is produced exactly once per `Connecting` entry. A driver that
//! holds the machine behind a mutex therefore cannot end up with two live
//! sockets from concurrent reconnect attempts.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected ──connect──→ Connecting ──handshake ok──→ Connected
//!      ↑                     ↑      │                        │
//!      │ reset               │      │ attempt failed         │ connection lost
//!      │                     │      ↓                        ↓
//!    Failed ←─attempts────  Degraded ←──backoff──────  Reconnecting
//!            exhausted       (wait)      elapsed
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod machine;

pub use machine::{
    Action, ConnectionInput, ConnectionMachine, ConnectionState, ReconnectPolicy, TransitionError,
};
