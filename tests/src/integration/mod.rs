//! Cross-crate integration scenarios.

pub mod connection;
pub mod delivery;
pub mod failure;

#[cfg(test)]
pub(crate) mod support {
    use messaging::adapters::MemoryBroker;
    use node_runtime::{CoreContainer, NodeConfig};
    use resilience::{CircuitBreakerConfig, DlqConfig};
    use shared_bus::SubscriberCallback;
    use shared_types::{EventEnvelope, EventFilter};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    /// A container wired over the shared in-memory broker, with fast
    /// retry/backoff/breaker timings for tests.
    pub async fn build_instance(broker: &MemoryBroker, dir: &TempDir) -> CoreContainer {
        let mut config = NodeConfig::default();
        config.dlq = DlqConfig::new(dir.path());
        config.retry.base_delay = Duration::from_millis(5);
        config.retry.max_delay = Duration::from_millis(20);
        config.circuit = CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_millis(150),
            enabled: true,
        };
        config.broker.reconnect.base_delay = Duration::from_millis(5);
        config.broker.reconnect.max_delay = Duration::from_millis(20);
        config.broker.reconnect.max_attempts = 100;

        CoreContainer::build(config, Arc::new(broker.clone()))
            .await
            .expect("container build")
    }

    /// Subscribe a counting callback to a container's bus. Returns the
    /// counter; the handle must be kept alive by the caller.
    pub fn counting_subscriber(
        container: &CoreContainer,
        label: &str,
    ) -> (Arc<AtomicU64>, shared_bus::SubscriberHandle) {
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let callback: SubscriberCallback = Arc::new(move |_envelope: EventEnvelope| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        });
        let handle = container
            .bus
            .subscribe(label, EventFilter::all(), callback);
        (count, handle)
    }

    /// Poll until `predicate` holds or the deadline passes.
    pub async fn wait_for(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if predicate() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        predicate()
    }

    /// Poll the DLQ until it holds `expected` entries or the deadline
    /// passes. Returns the final count.
    pub async fn wait_for_dlq_len(
        dlq: &resilience::DeadLetterQueue,
        expected: usize,
        deadline: Duration,
    ) -> usize {
        let start = tokio::time::Instant::now();
        loop {
            let count = dlq
                .list(&resilience::DlqFilter::default())
                .await
                .map(|entries| entries.len())
                .unwrap_or(0);
            if count == expected || start.elapsed() >= deadline {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
