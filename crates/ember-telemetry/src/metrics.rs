//! # Delivery Metrics
//!
//! Per-channel counters for the delivery paths: messages sent, failed
//! (by reason), dead-lettered, processing-time statistics, and circuit
//! transition counts.
//!
//! Locking is fine-grained: one group per channel, atomics for the hot
//! counters, short-held mutexes for the keyed maps. `snapshot()` copies
//! counters out; readers never hold writers for longer than a single
//! counter read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

#[derive(Default)]
struct ProcessingStats {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

#[derive(Default)]
struct ChannelMetrics {
    sent: AtomicU64,
    dead_lettered: AtomicU64,
    failed: Mutex<HashMap<String, u64>>,
    processing: Mutex<ProcessingStats>,
    transitions: Mutex<HashMap<String, u64>>,
}

/// Thread-safe per-channel metrics collector.
#[derive(Default)]
pub struct MetricsCollector {
    channels: RwLock<HashMap<String, Arc<ChannelMetrics>>>,
}

impl MetricsCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> Arc<ChannelMetrics> {
        if let Ok(channels) = self.channels.read() {
            if let Some(metrics) = channels.get(name) {
                return metrics.clone();
            }
        }
        match self.channels.write() {
            Ok(mut channels) => channels.entry(name.to_string()).or_default().clone(),
            Err(_) => Arc::new(ChannelMetrics::default()),
        }
    }

    /// Count a successfully delivered message.
    pub fn record_sent(&self, channel: &str) {
        self.channel(channel).sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a delivery failure, keyed by reason.
    pub fn record_failed(&self, channel: &str, reason: &str) {
        let metrics = self.channel(channel);
        if let Ok(mut failed) = metrics.failed.lock() {
            *failed.entry(reason.to_string()).or_insert(0) += 1;
        };
    }

    /// Count a message routed to the dead letter queue.
    pub fn record_dead_lettered(&self, channel: &str) {
        self.channel(channel)
            .dead_lettered
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long one delivery took end to end.
    pub fn record_processing_time(&self, channel: &str, duration: Duration) {
        let metrics = self.channel(channel);
        if let Ok(mut stats) = metrics.processing.lock() {
            stats.count += 1;
            stats.total += duration;
            stats.min = Some(stats.min.map_or(duration, |min| min.min(duration)));
            stats.max = stats.max.max(duration);
        };
    }

    /// Count a circuit state transition on a channel.
    pub fn record_circuit_transition(&self, channel: &str, from: &str, to: &str) {
        let metrics = self.channel(channel);
        if let Ok(mut transitions) = metrics.transitions.lock() {
            *transitions.entry(format!("{from}->{to}")).or_insert(0) += 1;
        };
    }

    /// Start a processing timer that records on drop.
    #[must_use]
    pub fn timer(self: &Arc<Self>, channel: impl Into<String>) -> ProcessingTimer {
        ProcessingTimer {
            collector: self.clone(),
            channel: channel.into(),
            start: Instant::now(),
        }
    }

    /// Copy every counter into an immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let channels = match self.channels.read() {
            Ok(channels) => channels
                .iter()
                .map(|(name, metrics)| (name.clone(), metrics.clone()))
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };

        let mut snapshot = BTreeMap::new();
        for (name, metrics) in channels {
            let failed = metrics
                .failed
                .lock()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
                .unwrap_or_default();
            let transitions = metrics
                .transitions
                .lock()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), *v)).collect())
                .unwrap_or_default();
            let processing = metrics
                .processing
                .lock()
                .map(|stats| ProcessingSnapshot {
                    count: stats.count,
                    total_ms: stats.total.as_secs_f64() * 1_000.0,
                    mean_ms: if stats.count == 0 {
                        0.0
                    } else {
                        stats.total.as_secs_f64() * 1_000.0 / stats.count as f64
                    },
                    min_ms: stats.min.unwrap_or(Duration::ZERO).as_secs_f64() * 1_000.0,
                    max_ms: stats.max.as_secs_f64() * 1_000.0,
                })
                .unwrap_or_default();

            snapshot.insert(
                name,
                ChannelSnapshot {
                    sent: metrics.sent.load(Ordering::Relaxed),
                    dead_lettered: metrics.dead_lettered.load(Ordering::Relaxed),
                    failed,
                    processing,
                    circuit_transitions: transitions,
                },
            );
        }

        MetricsSnapshot {
            generated_at: Utc::now(),
            channels: snapshot,
        }
    }
}

/// Immutable copy of all counters at one instant.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Per-channel counter groups.
    pub channels: BTreeMap<String, ChannelSnapshot>,
}

/// One channel's counters.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ChannelSnapshot {
    /// Messages delivered.
    pub sent: u64,
    /// Messages routed to the DLQ.
    pub dead_lettered: u64,
    /// Failure counts keyed by reason.
    pub failed: BTreeMap<String, u64>,
    /// Processing-time statistics.
    pub processing: ProcessingSnapshot,
    /// Circuit transition counts keyed as `from->to`.
    pub circuit_transitions: BTreeMap<String, u64>,
}

/// Processing-time statistics for one channel.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProcessingSnapshot {
    /// Deliveries measured.
    pub count: u64,
    /// Total time across deliveries.
    pub total_ms: f64,
    /// Mean per delivery.
    pub mean_ms: f64,
    /// Fastest delivery.
    pub min_ms: f64,
    /// Slowest delivery.
    pub max_ms: f64,
}

/// Timer guard for automatic processing-time observation. Records into
/// the collector when dropped.
pub struct ProcessingTimer {
    collector: Arc<MetricsCollector>,
    channel: String,
    start: Instant,
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        self.collector
            .record_processing_time(&self.channel, self.start.elapsed());
    }
}
