//! # In-Memory Broker
//!
//! Single-process broker used by the test suites: per-subject FIFO via
//! unbounded channels, wildcard subscriptions, and fault-injection hooks
//! (unreachable publishes, failing or slowed connects) for exercising the
//! retry/circuit-breaker/DLQ triad and the connection state machine.

use crate::error::MessagingError;
use crate::ports::{BrokerMessage, BrokerSession, BrokerTransport, MessageStream};
use crate::subjects;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

struct MemorySubscription {
    pattern: String,
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

struct MemoryBrokerInner {
    subscriptions: Mutex<Vec<MemorySubscription>>,
    unreachable: AtomicBool,
    fail_connects: AtomicBool,
    connect_delay: Mutex<Duration>,
    connect_attempts: AtomicU64,
    connects_in_flight: AtomicUsize,
    max_connects_in_flight: AtomicUsize,
    published: AtomicU64,
}

/// In-process broker with fault injection, shared by all its sessions.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<MemoryBrokerInner>,
}

impl MemoryBroker {
    /// Create a healthy broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryBrokerInner {
                subscriptions: Mutex::new(Vec::new()),
                unreachable: AtomicBool::new(false),
                fail_connects: AtomicBool::new(false),
                connect_delay: Mutex::new(Duration::ZERO),
                connect_attempts: AtomicU64::new(0),
                connects_in_flight: AtomicUsize::new(0),
                max_connects_in_flight: AtomicUsize::new(0),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Make every publish fail (simulated outage) or recover.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make every connect attempt fail or recover.
    pub fn set_fail_connects(&self, fail: bool) {
        self.inner.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Artificial dial latency, widening race windows in lifecycle tests.
    pub fn set_connect_delay(&self, delay: Duration) {
        if let Ok(mut d) = self.inner.connect_delay.lock() {
            *d = delay;
        }
    }

    /// Total connect attempts observed.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// High-water mark of simultaneous connect attempts.
    #[must_use]
    pub fn max_connects_in_flight(&self) -> usize {
        self.inner.max_connects_in_flight.load(Ordering::SeqCst)
    }

    /// Total messages accepted for delivery.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::SeqCst)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerTransport for MemoryBroker {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn BrokerSession>, MessagingError> {
        let inner = &self.inner;
        inner.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let in_flight = inner.connects_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner
            .max_connects_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);

        let delay = inner
            .connect_delay
            .lock()
            .map(|d| *d)
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = if inner.fail_connects.load(Ordering::SeqCst) {
            Err(MessagingError::Connect("broker refused dial".to_string()))
        } else {
            Ok(Arc::new(MemorySession {
                inner: self.inner.clone(),
            }) as Arc<dyn BrokerSession>)
        };

        inner.connects_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct MemorySession {
    inner: Arc<MemoryBrokerInner>,
}

#[async_trait]
impl BrokerSession for MemorySession {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(MessagingError::Publish {
                subject: subject.to_string(),
                reason: "broker unreachable".to_string(),
            });
        }

        let message = BrokerMessage {
            subject: subject.to_string(),
            payload,
        };

        let Ok(mut subscriptions) = self.inner.subscriptions.lock() else {
            return Err(MessagingError::Publish {
                subject: subject.to_string(),
                reason: "subscription table poisoned".to_string(),
            });
        };
        // Drop subscriptions whose receivers are gone, deliver to the rest.
        subscriptions.retain(|sub| {
            if subjects::matches(&sub.pattern, subject) {
                sub.tx.send(message.clone()).is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });

        self.inner.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<MessageStream, MessagingError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let Ok(mut subscriptions) = self.inner.subscriptions.lock() else {
            return Err(MessagingError::Subscribe {
                pattern: pattern.to_string(),
                reason: "subscription table poisoned".to_string(),
            });
        };
        subscriptions.push(MemorySubscription {
            pattern: pattern.to_string(),
            tx,
        });
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn flush(&self) -> Result<(), MessagingError> {
        Ok(())
    }
}
