//! # Messaging Client
//!
//! Owns the single broker session and the connection state machine that
//! governs it. All dialing goes through the machine: a dial happens only
//! when a transition grants [`Action::Dial`], so concurrent connect or
//! failure reports can never produce two live sessions.

use crate::error::MessagingError;
use crate::ports::{BrokerSession, BrokerTransport, MessageStream};
use shared_fsm::{Action, ConnectionInput, ConnectionMachine, ConnectionState, ReconnectPolicy};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker URL handed to the transport adapter.
    pub url: String,
    /// Reconnect budget and backoff shape.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// The broker client.
///
/// Cheap to share via `Arc`; `publish`/`subscribe` are safe from any task.
pub struct MessagingClient {
    transport: Arc<dyn BrokerTransport>,
    config: ClientConfig,
    machine: Arc<Mutex<ConnectionMachine>>,
    session: Arc<RwLock<Option<Arc<dyn BrokerSession>>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl MessagingClient {
    /// Create a client over the given transport. No I/O happens until
    /// [`MessagingClient::connect`].
    #[must_use]
    pub fn new(transport: Arc<dyn BrokerTransport>, config: ClientConfig) -> Self {
        let machine = ConnectionMachine::new(config.reconnect);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            transport,
            config,
            machine: Arc::new(Mutex::new(machine)),
            session: Arc::new(RwLock::new(None)),
            shutdown_tx,
        }
    }

    /// Register an observer for connection state changes.
    pub fn on_state_change(
        &self,
        observer: impl Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    ) {
        if let Ok(mut machine) = self.machine.lock() {
            machine.on_transition(Box::new(observer));
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.machine
            .lock()
            .map(|m| m.state())
            .unwrap_or(ConnectionState::Failed)
    }

    /// Establish the broker connection.
    ///
    /// Permitted only when the state machine allows it: a second call
    /// while connecting or connected returns
    /// [`MessagingError::AlreadyConnecting`] without dialing (exactly one
    /// attempt in flight). If the first dial fails, the reconnect cycle
    /// continues in the background and the first error is returned.
    pub async fn connect(&self) -> Result<(), MessagingError> {
        {
            let mut machine = self.machine.lock().map_err(|_| {
                MessagingError::Connect("connection machine poisoned".to_string())
            })?;
            match machine.handle(ConnectionInput::ConnectRequested) {
                Ok(Action::Dial) => {}
                _ => return Err(MessagingError::AlreadyConnecting),
            }
        }

        match self.dial().await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "initial broker dial failed");
                self.after_failed_attempt();
                Err(err)
            }
        }
    }

    async fn dial(&self) -> Result<(), MessagingError> {
        let session = self.transport.connect(&self.config.url).await?;
        if let Ok(mut machine) = self.machine.lock() {
            let _ = machine.handle(ConnectionInput::HandshakeSucceeded);
        }
        if let Ok(mut slot) = self.session.write() {
            *slot = Some(session);
        }
        Ok(())
    }

    /// Feed `AttemptFailed` and act on the machine's verdict.
    fn after_failed_attempt(&self) {
        let action = self
            .machine
            .lock()
            .ok()
            .and_then(|mut m| m.handle(ConnectionInput::AttemptFailed).ok());
        match action {
            Some(Action::Wait(delay)) => self.spawn_reconnect(delay),
            Some(Action::GiveUp) => {
                error!(
                    url = %self.config.url,
                    "broker reconnect attempts exhausted; connection failed"
                );
            }
            _ => {}
        }
    }

    /// Report a broker failure observed outside the dial path (publish or
    /// subscription error). Moves `Connected → Reconnecting` and starts
    /// the backoff cycle; duplicate reports while already reconnecting
    /// are rejected by the machine and ignored here.
    pub fn report_failure(&self) {
        let action = self
            .machine
            .lock()
            .ok()
            .and_then(|mut m| m.handle(ConnectionInput::ConnectionLost).ok());
        if let Some(Action::Wait(delay)) = action {
            if let Ok(mut slot) = self.session.write() {
                slot.take();
            }
            warn!(delay_ms = delay.as_millis() as u64, "broker connection lost; reconnecting");
            self.spawn_reconnect(delay);
        }
    }

    fn spawn_reconnect(&self, initial_delay: Duration) {
        let transport = self.transport.clone();
        let url = self.config.url.clone();
        let machine = self.machine.clone();
        let session = self.session.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut delay = initial_delay;
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    () = tokio::time::sleep(delay) => {}
                }

                let dial_granted = machine
                    .lock()
                    .ok()
                    .and_then(|mut m| m.handle(ConnectionInput::BackoffElapsed).ok());
                if dial_granted != Some(Action::Dial) {
                    return;
                }

                match transport.connect(&url).await {
                    Ok(new_session) => {
                        if let Ok(mut m) = machine.lock() {
                            let _ = m.handle(ConnectionInput::HandshakeSucceeded);
                        }
                        if let Ok(mut slot) = session.write() {
                            *slot = Some(new_session);
                        }
                        info!(url = %url, "broker reconnected");
                        return;
                    }
                    Err(err) => {
                        warn!(error = %err, "broker reconnect attempt failed");
                        let action = machine
                            .lock()
                            .ok()
                            .and_then(|mut m| m.handle(ConnectionInput::AttemptFailed).ok());
                        match action {
                            Some(Action::Wait(next)) => delay = next,
                            Some(Action::GiveUp) => {
                                error!(
                                    url = %url,
                                    "broker reconnect attempts exhausted; connection failed"
                                );
                                return;
                            }
                            _ => return,
                        }
                    }
                }
            }
        });
    }

    /// Publish a message. A failure is reported to the state machine as a
    /// connection-loss signal before the error is returned.
    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        let session = self.live_session()?;
        match session.publish(subject, payload).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.report_failure();
                Err(err)
            }
        }
    }

    /// Subscribe to a subject pattern on the live session.
    pub async fn subscribe(&self, pattern: &str) -> Result<MessageStream, MessagingError> {
        let session = self.live_session()?;
        match session.subscribe(pattern).await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                self.report_failure();
                Err(err)
            }
        }
    }

    fn live_session(&self) -> Result<Arc<dyn BrokerSession>, MessagingError> {
        self.session
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(MessagingError::NotConnected)
    }

    /// Reset a `Failed` connection back to `Disconnected` so `connect`
    /// may be called again (operator action).
    pub fn reset(&self) {
        if let Ok(mut machine) = self.machine.lock() {
            let _ = machine.handle(ConnectionInput::Reset);
        }
        if let Ok(mut slot) = self.session.write() {
            slot.take();
        }
    }

    /// Cancel any pending reconnect cycle.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
