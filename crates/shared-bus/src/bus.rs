//! # Event Bus
//!
//! The bus owns the subscription table and a single dispatch-loop task
//! that drains the internal queue. Publishers and the bridge only ever
//! enqueue; callback execution happens on the loop.

use crate::subscriber::{SubscriberCallback, SubscriberEntry, SubscriberHandle, SubscriberTable};
use crate::{DEFAULT_ALERT_THRESHOLD, TAP_CAPACITY};
use futures::FutureExt;
use shared_types::{EventEnvelope, EventFilter, GameEvent};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// The dispatch loop has shut down; the event was not enqueued.
    #[error("event bus is shut down")]
    Closed,
}

/// Where an event entered this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Published by game logic in this process.
    Local,
    /// Received from the broker and injected by the bridge.
    Remote,
}

/// Bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Queue depth above which a backlog warning is logged.
    pub alert_threshold: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

struct QueuedEvent {
    envelope: EventEnvelope,
    origin: EventOrigin,
}

/// The local event bus.
///
/// Construct inside a tokio runtime; the dispatch loop is spawned
/// immediately and runs until [`EventBus::shutdown`].
pub struct EventBus {
    queue_tx: mpsc::UnboundedSender<QueuedEvent>,
    subscribers: SubscriberTable,
    local_tap: broadcast::Sender<EventEnvelope>,
    depth: Arc<AtomicUsize>,
    alert_threshold: usize,
    events_published: AtomicU64,
    events_injected: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus and spawn its dispatch loop.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (local_tap, _) = broadcast::channel(TAP_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let subscribers: SubscriberTable = Arc::new(RwLock::new(HashMap::new()));
        let depth = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(dispatch_loop(
            queue_rx,
            shutdown_rx,
            subscribers.clone(),
            depth.clone(),
        ));

        Self {
            queue_tx,
            subscribers,
            local_tap,
            depth,
            alert_threshold: config.alert_threshold,
            events_published: AtomicU64::new(0),
            events_injected: AtomicU64::new(0),
            shutdown_tx,
            dispatch_task: Mutex::new(Some(task)),
        }
    }

    /// Publish a locally-originated event.
    ///
    /// Enqueues for dispatch and returns immediately with the stamped
    /// envelope; never waits for subscribers. The envelope is also offered
    /// to the local tap so the bridge can mirror it to the broker.
    pub fn publish(&self, event: GameEvent) -> Result<EventEnvelope, BusError> {
        let envelope = EventEnvelope::new(event);
        self.events_published.fetch_add(1, Ordering::Relaxed);

        // Tap first: the bridge must see the id before any broker echo
        // can possibly return.
        let _ = self.local_tap.send(envelope.clone());

        self.enqueue(envelope.clone(), EventOrigin::Local)?;
        Ok(envelope)
    }

    /// Deliver a remotely-sourced envelope to local subscribers.
    ///
    /// Identical dispatch semantics to [`EventBus::publish`], but the
    /// envelope never reaches the local tap, so it is never mirrored back
    /// to the broker.
    pub fn inject(&self, envelope: EventEnvelope) -> Result<(), BusError> {
        self.events_injected.fetch_add(1, Ordering::Relaxed);
        self.enqueue(envelope, EventOrigin::Remote)
    }

    fn enqueue(&self, envelope: EventEnvelope, origin: EventOrigin) -> Result<(), BusError> {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth == self.alert_threshold {
            warn!(
                depth,
                threshold = self.alert_threshold,
                "event bus dispatch backlog reached alert threshold"
            );
        }
        self.queue_tx
            .send(QueuedEvent { envelope, origin })
            .map_err(|_| {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                BusError::Closed
            })
    }

    /// Register an async callback for events matching `filter`.
    ///
    /// The handle unsubscribes on drop.
    #[must_use]
    pub fn subscribe(
        &self,
        label: impl Into<String>,
        filter: EventFilter,
        callback: SubscriberCallback,
    ) -> SubscriberHandle {
        let id = Uuid::new_v4();
        let label = label.into();

        if let Ok(mut table) = self.subscribers.write() {
            table.insert(
                id,
                SubscriberEntry {
                    label: label.clone(),
                    filter,
                    callback,
                },
            );
        }
        debug!(subscriber = %label, "subscription created");

        SubscriberHandle::new(id, label, &self.subscribers)
    }

    /// Tap of locally-originated envelopes, consumed by the bridge.
    ///
    /// Injected (remote) events never appear here.
    #[must_use]
    pub fn local_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.local_tap.subscribe()
    }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|t| t.len()).unwrap_or(0)
    }

    /// Current dispatch queue depth.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Total events published locally.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Total events injected by the bridge.
    #[must_use]
    pub fn events_injected(&self) -> u64 {
        self.events_injected.load(Ordering::Relaxed)
    }

    /// Stop the dispatch loop, waiting up to `timeout` for it to finish
    /// the event in flight; the task is aborted past the deadline.
    pub async fn shutdown(&self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let task = self.dispatch_task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("event bus dispatch loop did not stop in time; aborting");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch_loop(
    mut queue_rx: mpsc::UnboundedReceiver<QueuedEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    subscribers: SubscriberTable,
    depth: Arc<AtomicUsize>,
) {
    loop {
        let queued = tokio::select! {
            _ = shutdown_rx.changed() => break,
            queued = queue_rx.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };

        depth.fetch_sub(1, Ordering::Relaxed);
        dispatch_one(&subscribers, queued).await;
    }
    debug!("event bus dispatch loop stopped");
}

async fn dispatch_one(subscribers: &SubscriberTable, queued: QueuedEvent) {
    // Snapshot matching callbacks, then release the table lock before any
    // await point.
    let matching: Vec<(String, SubscriberCallback)> = match subscribers.read() {
        Ok(table) => table
            .values()
            .filter(|entry| entry.filter.matches(&queued.envelope.event))
            .map(|entry| (entry.label.clone(), entry.callback.clone()))
            .collect(),
        Err(_) => return,
    };

    let kind = queued.envelope.kind();
    for (label, callback) in matching {
        let fut = callback(queued.envelope.clone());
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                // Contained: other subscribers still get the event.
                warn!(
                    subscriber = %label,
                    kind = %kind,
                    origin = ?queued.origin,
                    error = %err,
                    "subscriber callback failed"
                );
            }
            Err(_) => {
                error!(
                    subscriber = %label,
                    kind = %kind,
                    "subscriber callback panicked"
                );
            }
        }
    }
}
