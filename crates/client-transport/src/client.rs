//! # Reconnecting WebSocket Client
//!
//! One connection loop owns the state machine and a single socket at a
//! time. Lifecycle changes and received messages are reported to the
//! consumer over an event channel; backoff sleeps are cancellable via
//! the shutdown channel.

use futures::{SinkExt, StreamExt};
use shared_fsm::{Action, ConnectionInput, ConnectionMachine, ReconnectPolicy};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Errors from the transport client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The client was already started.
    #[error("transport already started")]
    AlreadyStarted,
}

/// Events reported to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established.
    Connected,
    /// Connection lost; the reconnect cycle is running.
    Disconnected,
    /// A text frame arrived from the server.
    Message(String),
    /// Reconnect attempts exhausted; the client stopped.
    GaveUp,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL of the game server.
    pub url: String,
    /// Reconnect budget and backoff shape.
    pub reconnect: ReconnectPolicy,
}

/// Reconnecting WebSocket client for the game server connection.
pub struct TransportClient {
    config: TransportConfig,
    event_tx: mpsc::Sender<TransportEvent>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl TransportClient {
    /// Create a client reporting events on `event_tx`.
    #[must_use]
    pub fn new(config: TransportConfig, event_tx: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            config,
            event_tx,
            shutdown_tx: None,
        }
    }

    /// Start the connection loop.
    pub fn start(&mut self) -> Result<(), TransportError> {
        if self.shutdown_tx.is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(connection_loop(config, event_tx, shutdown_rx));
        Ok(())
    }

    /// Stop the connection loop (cancels any pending backoff).
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

/// Connection loop: executes the machine's decisions until shutdown or
/// give-up. Exactly one socket exists at any instant.
async fn connection_loop(
    config: TransportConfig,
    event_tx: mpsc::Sender<TransportEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut machine = ConnectionMachine::new(config.reconnect);
    let Ok(mut action) = machine.handle(ConnectionInput::ConnectRequested) else {
        return;
    };

    loop {
        match action {
            Action::Dial => match connect_async(config.url.as_str()).await {
                Ok((socket, _)) => {
                    let _ = machine.handle(ConnectionInput::HandshakeSucceeded);
                    let _ = event_tx.send(TransportEvent::Connected).await;

                    let shut_down = run_session(socket, &event_tx, &mut shutdown_rx).await;
                    if shut_down {
                        return;
                    }

                    let _ = event_tx.send(TransportEvent::Disconnected).await;
                    match machine.handle(ConnectionInput::ConnectionLost) {
                        Ok(next) => action = next,
                        Err(_) => return,
                    }
                }
                Err(err) => {
                    warn!(url = %config.url, error = %err, "transport dial failed");
                    match machine.handle(ConnectionInput::AttemptFailed) {
                        Ok(next) => action = next,
                        Err(_) => return,
                    }
                }
            },
            Action::Wait(delay) => {
                tokio::select! {
                    _ = shutdown_rx.recv() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                match machine.handle(ConnectionInput::BackoffElapsed) {
                    Ok(next) => action = next,
                    Err(_) => return,
                }
            }
            Action::GiveUp => {
                warn!(url = %config.url, "transport reconnect attempts exhausted");
                let _ = event_tx.send(TransportEvent::GaveUp).await;
                return;
            }
            Action::None => return,
        }
    }
}

/// Pump one live socket until it closes or shutdown is requested.
/// Returns true when the loop should exit because of shutdown.
async fn run_session(
    socket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    event_tx: &mpsc::Sender<TransportEvent>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> bool {
    let (mut write, mut read) = socket.split();

    loop {
        let message = tokio::select! {
            _ = shutdown_rx.recv() => return true,
            message = read.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                let _ = event_tx.send(TransportEvent::Message(text.to_string())).await;
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!("transport socket closed");
                return false;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(error = %err, "transport socket error");
                return false;
            }
        }
    }
}
