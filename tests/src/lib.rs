//! # Emberfall Test Suite
//!
//! Cross-crate scenario tests for the event-delivery core, run against
//! the in-memory broker adapter:
//!
//! ```text
//! tests/src/integration/
//! ├── delivery.rs      # healthy-broker fan-out, echo suppression
//! ├── failure.rs       # outages: retry, circuit breaker, DLQ, recovery
//! └── connection.rs    # connection lifecycle, mutual exclusion
//! ```
//!
//! ## Running
//!
//! ```bash
//! cargo test -p ember-tests
//! cargo test -p ember-tests integration::failure::
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
