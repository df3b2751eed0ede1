//! # Circuit Breaker
//!
//! Per-channel gate preventing a failing broker from being hammered by
//! retries across many concurrent publishers.
//!
//! ## States
//!
//! - **Closed**: normal operation, failures are counted
//! - **Open**: operations short-circuit immediately, no I/O attempted
//! - **Half-Open**: exactly one probe allowed through to test recovery
//!
//! Circuit state sits on the hot path of every publish; all checks hold
//! the lock only long enough to read or bump counters.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing.
    pub success_threshold: u32,
    /// Duration the circuit stays open before allowing a probe.
    pub open_timeout: Duration,
    /// Enable/disable the breaker (disabled passes everything through).
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast.
    Open,
    /// Testing recovery.
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase name for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fast-fail error raised instead of attempting an operation, or the
/// wrapped operation error.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// The circuit is open (or a half-open probe is already in flight);
    /// the operation was not attempted.
    #[error("circuit open for channel {channel}")]
    Open {
        /// The gated channel.
        channel: String,
    },

    /// The operation ran and failed; the failure was recorded.
    #[error("{0}")]
    Operation(E),
}

/// Circuit state for a single channel.
struct ChannelCircuit {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    probe_in_flight: bool,
    opened_at: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    total_rejections: u64,
}

impl ChannelCircuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            probe_in_flight: false,
            opened_at: None,
            total_failures: 0,
            total_successes: 0,
            total_rejections: 0,
        }
    }
}

/// Observer invoked on every transition with `(channel, from, to)`.
pub type CircuitObserver = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Circuit breaker managing one circuit per logical channel.
///
/// Circuits are created lazily on first use and live for the process
/// lifetime; counters are zeroed only by [`CircuitBreaker::reset`].
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: RwLock<HashMap<String, ChannelCircuit>>,
    observer: RwLock<Option<CircuitObserver>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
            observer: RwLock::new(None),
        }
    }

    /// Register a transition observer (metrics/logging).
    pub fn on_transition(&self, observer: CircuitObserver) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = Some(observer);
        }
    }

    /// Run `operation` through the circuit, or fast-fail without I/O.
    pub async fn call<T, E, F, Fut>(&self, channel: &str, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow(channel) {
            return Err(CircuitError::Open {
                channel: channel.to_string(),
            });
        }
        match operation().await {
            Ok(value) => {
                self.record_success(channel);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(channel);
                Err(CircuitError::Operation(err))
            }
        }
    }

    /// Check whether a call on the channel should be allowed right now.
    ///
    /// In half-open, only a single probe is allowed through at a time.
    pub fn should_allow(&self, channel: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let transition;
        let allowed;
        {
            let mut circuits = match self.circuits.write() {
                Ok(c) => c,
                Err(_) => return false,
            };
            let circuit = circuits
                .entry(channel.to_string())
                .or_insert_with(ChannelCircuit::new);

            match circuit.state {
                CircuitState::Closed => {
                    allowed = true;
                    transition = None;
                }
                CircuitState::HalfOpen => {
                    if circuit.probe_in_flight {
                        circuit.total_rejections += 1;
                        allowed = false;
                    } else {
                        circuit.probe_in_flight = true;
                        allowed = true;
                    }
                    transition = None;
                }
                CircuitState::Open => {
                    let expired = circuit
                        .opened_at
                        .is_some_and(|at| at.elapsed() >= self.config.open_timeout);
                    if expired {
                        circuit.state = CircuitState::HalfOpen;
                        circuit.success_count = 0;
                        circuit.probe_in_flight = true;
                        allowed = true;
                        transition = Some((CircuitState::Open, CircuitState::HalfOpen));
                    } else {
                        circuit.total_rejections += 1;
                        allowed = false;
                        transition = None;
                    }
                }
            }
        }

        if let Some((from, to)) = transition {
            info!(channel, "circuit transitioning to half-open");
            self.notify(channel, from, to);
        }
        allowed
    }

    /// Record a successful operation.
    pub fn record_success(&self, channel: &str) {
        if !self.config.enabled {
            return;
        }

        let mut transition = None;
        {
            let Ok(mut circuits) = self.circuits.write() else {
                return;
            };
            let circuit = circuits
                .entry(channel.to_string())
                .or_insert_with(ChannelCircuit::new);

            circuit.total_successes += 1;
            circuit.probe_in_flight = false;

            match circuit.state {
                CircuitState::Closed => {
                    // A success breaks any failure streak.
                    circuit.failure_count = 0;
                }
                CircuitState::HalfOpen => {
                    circuit.success_count += 1;
                    if circuit.success_count >= self.config.success_threshold {
                        circuit.state = CircuitState::Closed;
                        circuit.failure_count = 0;
                        circuit.success_count = 0;
                        circuit.opened_at = None;
                        transition = Some((CircuitState::HalfOpen, CircuitState::Closed));
                    }
                }
                CircuitState::Open => {
                    // Unreachable in practice: open rejects calls.
                }
            }
        }

        if let Some((from, to)) = transition {
            info!(channel, "circuit recovered, transitioning to closed");
            self.notify(channel, from, to);
        }
    }

    /// Record a failed operation.
    pub fn record_failure(&self, channel: &str) {
        if !self.config.enabled {
            return;
        }

        let mut transition = None;
        {
            let Ok(mut circuits) = self.circuits.write() else {
                return;
            };
            let circuit = circuits
                .entry(channel.to_string())
                .or_insert_with(ChannelCircuit::new);

            circuit.total_failures += 1;
            circuit.failure_count += 1;
            circuit.probe_in_flight = false;

            match circuit.state {
                CircuitState::Closed => {
                    if circuit.failure_count >= self.config.failure_threshold {
                        circuit.state = CircuitState::Open;
                        circuit.opened_at = Some(Instant::now());
                        transition = Some((CircuitState::Closed, CircuitState::Open));
                    }
                }
                CircuitState::HalfOpen => {
                    // Any probe failure returns to open for a fresh timeout.
                    circuit.state = CircuitState::Open;
                    circuit.success_count = 0;
                    circuit.opened_at = Some(Instant::now());
                    transition = Some((CircuitState::HalfOpen, CircuitState::Open));
                }
                CircuitState::Open => {}
            }
        }

        if let Some((from, to)) = transition {
            warn!(channel, from = %from, "circuit opened");
            self.notify(channel, from, to);
        }
    }

    /// Get the current state of a channel's circuit.
    #[must_use]
    pub fn state(&self, channel: &str) -> CircuitState {
        self.circuits
            .read()
            .ok()
            .and_then(|c| c.get(channel).map(|circuit| circuit.state))
            .unwrap_or(CircuitState::Closed)
    }

    /// Get statistics for all circuits.
    #[must_use]
    pub fn stats(&self) -> Vec<CircuitStats> {
        let Ok(circuits) = self.circuits.read() else {
            return Vec::new();
        };
        circuits
            .iter()
            .map(|(channel, circuit)| CircuitStats {
                channel: channel.clone(),
                state: circuit.state,
                failure_count: circuit.failure_count,
                success_count: circuit.success_count,
                total_failures: circuit.total_failures,
                total_successes: circuit.total_successes,
                total_rejections: circuit.total_rejections,
            })
            .collect()
    }

    /// Reset a channel's circuit to closed with zeroed counters
    /// (administrative action).
    pub fn reset(&self, channel: &str) {
        let mut transition = None;
        {
            let Ok(mut circuits) = self.circuits.write() else {
                return;
            };
            if let Some(circuit) = circuits.get_mut(channel) {
                if circuit.state != CircuitState::Closed {
                    transition = Some((circuit.state, CircuitState::Closed));
                }
                circuit.state = CircuitState::Closed;
                circuit.failure_count = 0;
                circuit.success_count = 0;
                circuit.probe_in_flight = false;
                circuit.opened_at = None;
            }
        }

        if let Some((from, to)) = transition {
            info!(channel, "circuit manually reset");
            self.notify(channel, from, to);
        }
    }

    fn notify(&self, channel: &str, from: CircuitState, to: CircuitState) {
        let observer = self.observer.read().ok().and_then(|o| o.clone());
        if let Some(observer) = observer {
            observer(channel, from, to);
        }
    }
}

/// Statistics for a circuit.
#[derive(Debug, Clone)]
pub struct CircuitStats {
    /// Channel name.
    pub channel: String,
    /// Current state.
    pub state: CircuitState,
    /// Recent consecutive failure count.
    pub failure_count: u32,
    /// Recent success count (in half-open).
    pub success_count: u32,
    /// Total failures since start.
    pub total_failures: u64,
    /// Total successes since start.
    pub total_successes: u64,
    /// Calls rejected without I/O.
    pub total_rejections: u64,
}
