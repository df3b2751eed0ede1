//! # Connection State Machine
//!
//! States, inputs, actions, and the transition function. Drivers own an
//! instance behind a mutex and are responsible for executing actions
//! (dialing, sleeping the backoff, giving up).

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Lifecycle states of one logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none requested. Initial state.
    Disconnected,
    /// A single dial attempt is in flight.
    Connecting,
    /// The connection is established and healthy.
    Connected,
    /// The connection was just lost; waiting to re-dial.
    Reconnecting,
    /// A reconnect attempt failed; waiting out the backoff delay.
    Degraded,
    /// Reconnect attempts exhausted. Terminal until an explicit reset.
    Failed,
}

impl ConnectionState {
    /// Stable lowercase name for logs and metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs a driver can feed the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInput {
    /// The application asked for a connection.
    ConnectRequested,
    /// The in-flight dial completed its handshake.
    HandshakeSucceeded,
    /// An established connection dropped.
    ConnectionLost,
    /// The in-flight dial failed.
    AttemptFailed,
    /// The backoff delay the machine ordered has elapsed.
    BackoffElapsed,
    /// Operator/application reset out of any state.
    Reset,
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Permission to start exactly one dial attempt.
    Dial,
    /// Sleep this long, then feed [`ConnectionInput::BackoffElapsed`].
    Wait(Duration),
    /// Attempts exhausted; stop driving this connection.
    GiveUp,
    /// Nothing to do.
    None,
}

/// Reconnection policy: attempt budget and backoff shape.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Consecutive failed attempts before the machine gives up.
    pub max_attempts: u32,
    /// First backoff delay; doubles each failure.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Exponential backoff after `failures` consecutive failed attempts:
    /// `min(base * 2^failures, max)`.
    #[must_use]
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exp = failures.min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// An input that has no edge from the current state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no transition for {input:?} in state {state}")]
pub struct TransitionError {
    /// The state the machine was in.
    pub state: ConnectionState,
    /// The rejected input.
    pub input: ConnectionInput,
}

/// Observer invoked on every state change with `(from, to)`.
pub type TransitionObserver = Box<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

/// The connection lifecycle machine. Pure: never performs I/O.
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
    observer: Option<TransitionObserver>,
}

impl ConnectionMachine {
    /// Create a machine in `Disconnected` with the given policy.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            policy,
            observer: None,
        }
    }

    /// Register a state-change observer (logging/metrics).
    pub fn on_transition(&mut self, observer: TransitionObserver) {
        self.observer = Some(observer);
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts in the current reconnect cycle.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Feed an input through the transition function.
    ///
    /// Invalid inputs leave the state unchanged and return an error; the
    /// edge set is closed. Callers driving the machine concurrently must
    /// serialize calls (hold it behind a mutex).
    pub fn handle(&mut self, input: ConnectionInput) -> Result<Action, TransitionError> {
        use ConnectionInput as I;
        use ConnectionState as S;

        let (next, action) = match (self.state, input) {
            (S::Disconnected, I::ConnectRequested) => (S::Connecting, Action::Dial),

            (S::Connecting, I::HandshakeSucceeded) => {
                self.attempts = 0;
                (S::Connected, Action::None)
            }
            (S::Connecting, I::AttemptFailed) => {
                self.attempts += 1;
                if self.attempts >= self.policy.max_attempts {
                    (S::Failed, Action::GiveUp)
                } else {
                    let delay = self.policy.backoff_delay(self.attempts);
                    (S::Degraded, Action::Wait(delay))
                }
            }

            (S::Connected, I::ConnectionLost) => {
                let delay = self.policy.backoff_delay(self.attempts);
                (S::Reconnecting, Action::Wait(delay))
            }

            (S::Reconnecting | S::Degraded, I::BackoffElapsed) => (S::Connecting, Action::Dial),

            (_, I::Reset) => {
                self.attempts = 0;
                (S::Disconnected, Action::None)
            }

            (state, input) => return Err(TransitionError { state, input }),
        };

        self.transition_to(next);
        Ok(action)
    }

    fn transition_to(&mut self, next: ConnectionState) {
        if next == self.state {
            return;
        }
        let from = self.state;
        self.state = next;
        debug!(from = %from, to = %next, attempts = self.attempts, "connection state changed");
        if let Some(observer) = &self.observer {
            observer(from, next);
        }
    }
}
