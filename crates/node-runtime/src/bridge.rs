//! # Distributed Event Bridge
//!
//! Mirrors locally-published domain events onto the broker and injects
//! remotely-received ones into the local bus, composing the messaging
//! client with the retry/circuit-breaker/DLQ triad and the metrics
//! collector.
//!
//! ## Delivery path
//!
//! ```text
//! bus tap ──→ detached task ──→ retry { breaker { publish } }
//!                                    │ exhausted / circuit open
//!                                    ↓
//!                               dead letter queue
//! ```
//!
//! Each local event is shipped by its own detached task: the in-process
//! dispatch path never waits on the network leg, and every failure is
//! accounted for by the triad rather than silently swallowed.
//!
//! ## Echo handling
//!
//! Every instance, including the publisher, subscribes to the full
//! domain wildcard. Local subscribers already receive local events from
//! local dispatch, so the bridge remembers the ids it mirrored and skips
//! re-injecting its own echoes; everything else is injected.

use ember_telemetry::MetricsCollector;
use futures::StreamExt;
use messaging::{subjects, MessagingClient};
use resilience::{
    retry_with_backoff_if, CircuitBreaker, CircuitError, DeadLetterQueue, DlqError, FailureReason,
    RetryError, RetryPolicy,
};
use shared_bus::EventBus;
use shared_types::EventEnvelope;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// How many of this instance's published event ids are remembered for
/// echo suppression.
const RECENT_ID_CAPACITY: usize = 8_192;

/// Delay before re-establishing a lost wildcard subscription.
const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(500);

/// Bounded id memory: insertion-ordered eviction.
struct RecentIds {
    order: VecDeque<Uuid>,
    set: HashSet<Uuid>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    fn insert(&mut self, id: Uuid) {
        if !self.set.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
    }

    fn remove(&mut self, id: &Uuid) -> bool {
        if self.set.remove(id) {
            self.order.retain(|known| known != id);
            true
        } else {
            false
        }
    }
}

/// The bridge between the local bus and the broker.
pub struct EventBridge {
    bus: Arc<EventBus>,
    client: Arc<MessagingClient>,
    breaker: Arc<CircuitBreaker>,
    dlq: Arc<DeadLetterQueue>,
    metrics: Arc<MetricsCollector>,
    retry: RetryPolicy,
    recent: Mutex<RecentIds>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBridge {
    /// Wire the bridge. Nothing runs until [`EventBridge::start`].
    #[must_use]
    pub fn new(
        bus: Arc<EventBus>,
        client: Arc<MessagingClient>,
        breaker: Arc<CircuitBreaker>,
        dlq: Arc<DeadLetterQueue>,
        metrics: Arc<MetricsCollector>,
        retry: RetryPolicy,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            bus,
            client,
            breaker,
            dlq,
            metrics,
            retry,
            recent: Mutex::new(RecentIds::new(RECENT_ID_CAPACITY)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the outbound mirror and the inbound wildcard subscription.
    ///
    /// The inbound loop keeps re-establishing its subscription as the
    /// connection comes and goes; a broker outage never fails `start`.
    pub fn start(self: &Arc<Self>) {
        let outbound = tokio::spawn(self.clone().outbound_loop());
        let inbound = tokio::spawn(self.clone().inbound_loop());
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(outbound);
            tasks.push(inbound);
        }
        info!("event bridge started");
    }

    /// Stop both loops, waiting up to `timeout` each before aborting.
    pub async fn stop(&self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("bridge task did not stop in time; aborting");
            }
        }
    }

    /// Replay one dead-lettered entry through the live delivery path,
    /// removing it on success.
    pub async fn replay(&self, id: Uuid) -> Result<(), DlqError> {
        let client = self.client.clone();
        let breaker = self.breaker.clone();
        let metrics = self.metrics.clone();

        self.dlq
            .replay(id, |entry| async move {
                let payload = serde_json::to_vec(&entry.payload)
                    .map_err(|e| format!("payload re-encode failed: {e}"))?;
                breaker
                    .call(&entry.channel, || client.publish(&entry.subject, payload))
                    .await
                    .map_err(|e| e.to_string())?;
                metrics.record_sent(&entry.channel);
                Ok::<(), String>(())
            })
            .await
    }

    /// Outbound: tap locally-published events and ship each one on its
    /// own detached task.
    async fn outbound_loop(self: Arc<Self>) {
        let mut tap = self.bus.local_events();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let envelope = tokio::select! {
                _ = shutdown_rx.changed() => return,
                received = tap.recv() => match received {
                    Ok(envelope) => envelope,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        // These events were published locally but will not be
                        // mirrored; cross-instance at-least-once is degraded.
                        error!(missed, "bridge tap lagged; local events were not mirrored");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                },
            };

            if let Ok(mut recent) = self.recent.lock() {
                recent.insert(envelope.id);
            }

            // Fire and forget: local dispatch latency stays independent of
            // network health. The task's failures terminate in the triad.
            let bridge = self.clone();
            tokio::spawn(async move {
                bridge.deliver(envelope).await;
            });
        }
    }

    /// One delivery through the full triad.
    async fn deliver(&self, envelope: EventEnvelope) {
        let subject = subjects::domain_event(envelope.kind());
        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                error!(id = %envelope.id, error = %err, "event envelope failed to encode");
                return;
            }
        };

        let _timer = self.metrics.timer(subject.clone());

        let client = self.client.clone();
        let breaker = self.breaker.clone();
        let result = retry_with_backoff_if(
            &self.retry,
            |_attempt| {
                let client = client.clone();
                let breaker = breaker.clone();
                let subject = subject.clone();
                let payload = payload.clone();
                async move {
                    breaker
                        .call(&subject, || client.publish(&subject, payload))
                        .await
                }
            },
            // Retrying into an open circuit is pointless; abort and
            // escalate straight to the DLQ.
            |err| !matches!(err, CircuitError::Open { .. }),
        )
        .await;

        match result {
            Ok(()) => {
                self.metrics.record_sent(&subject);
                trace!(id = %envelope.id, subject, "event mirrored to broker");
            }
            Err(retry_err) => self.escalate(&envelope, &subject, retry_err).await,
        }
    }

    /// Exhausted delivery: record and dead-letter. Never silently drops.
    async fn escalate(
        &self,
        envelope: &EventEnvelope,
        subject: &str,
        retry_err: RetryError<CircuitError<messaging::MessagingError>>,
    ) {
        let attempts = retry_err.attempts();
        let reason = match &retry_err {
            RetryError::Aborted {
                last_error: CircuitError::Open { .. },
                ..
            } => FailureReason::CircuitOpen,
            _ => FailureReason::RetriesExhausted,
        };

        warn!(
            id = %envelope.id,
            subject,
            attempts,
            reason = %reason,
            error = %retry_err,
            "event delivery exhausted; dead-lettering"
        );
        self.metrics.record_failed(subject, reason.as_str());

        let payload = match serde_json::to_value(envelope) {
            Ok(payload) => payload,
            Err(err) => {
                error!(id = %envelope.id, error = %err, "CRITICAL: undeliverable event could not be serialized for the DLQ");
                return;
            }
        };

        match self
            .dlq
            .enqueue(subject, subject, reason, attempts, payload)
            .await
        {
            Ok(entry_id) => {
                self.metrics.record_dead_lettered(subject);
                debug!(id = %envelope.id, %entry_id, "event dead-lettered");
            }
            Err(err) => {
                // The DLQ already screams about this; repeat with the event
                // id so the loss is traceable.
                error!(id = %envelope.id, error = %err, "CRITICAL: dead-lettering failed; event lost");
            }
        }
    }

    /// Inbound: consume the domain wildcard and inject remote events.
    async fn inbound_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let mut stream = match self.client.subscribe(subjects::DOMAIN_EVENT_WILDCARD).await {
                Ok(stream) => {
                    debug!(pattern = subjects::DOMAIN_EVENT_WILDCARD, "bridge subscribed");
                    stream
                }
                Err(err) => {
                    trace!(error = %err, "bridge subscription unavailable; retrying");
                    tokio::select! {
                        _ = shutdown_rx.changed() => return,
                        () = tokio::time::sleep(RESUBSCRIBE_DELAY) => continue,
                    }
                }
            };

            loop {
                let message = tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    message = stream.next() => message,
                };
                match message {
                    Some(message) => self.handle_inbound(&message.subject, &message.payload),
                    None => {
                        warn!("bridge subscription ended; re-establishing");
                        break;
                    }
                }
            }
        }
    }

    fn handle_inbound(&self, subject: &str, payload: &[u8]) {
        let envelope = match EventEnvelope::from_json(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Unknown kinds and malformed payloads are logged and
                // dropped, never a crash.
                warn!(subject, error = %err, "dropping undecodable remote event");
                return;
            }
        };

        let own_echo = self
            .recent
            .lock()
            .map(|mut recent| recent.remove(&envelope.id))
            .unwrap_or(false);
        if own_echo {
            trace!(id = %envelope.id, "skipping own echo");
            return;
        }

        if let Err(err) = self.bus.inject(envelope) {
            warn!(error = %err, "failed to inject remote event into local bus");
        }
    }
}
