//! Outage scenarios: retries exhaust into the DLQ, the circuit opens
//! and fast-fails, recovery closes it again, and dead letters replay.

#[cfg(test)]
mod tests {
    use crate::integration::support::{
        build_instance, counting_subscriber, wait_for, wait_for_dlq_len,
    };
    use messaging::adapters::MemoryBroker;
    use resilience::{CircuitState, DlqFilter, FailureReason};
    use shared_types::GameEvent;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    const DOMAIN_CHANNEL: &str = "events.domain.game_tick";

    #[tokio::test(flavor = "multi_thread")]
    async fn test_outage_opens_circuit_and_dead_letters_everything() {
        let broker = MemoryBroker::new();
        let dir = TempDir::new().unwrap();
        let instance = build_instance(&broker, &dir).await;
        instance.client.connect().await.unwrap();
        instance.bridge.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        broker.set_unreachable(true);

        for sequence in 0..10 {
            instance
                .bus
                .publish(GameEvent::GameTick { sequence })
                .unwrap();
        }

        // Nothing is silently dropped: all ten land in the DLQ.
        let count = wait_for_dlq_len(&instance.dlq, 10, Duration::from_secs(10)).await;
        assert_eq!(count, 10, "expected 10 dead letters");

        // Sustained failure tripped the breaker.
        assert_eq!(instance.breaker.state(DOMAIN_CHANNEL), CircuitState::Open);

        let entries = instance.dlq.list(&DlqFilter::default()).await.unwrap();
        assert!(entries.iter().all(|entry| matches!(
            entry.reason,
            FailureReason::RetriesExhausted | FailureReason::CircuitOpen
        )));
        // Once open, later deliveries fast-fail without touching the broker.
        assert!(
            entries
                .iter()
                .any(|entry| entry.reason == FailureReason::CircuitOpen),
            "no delivery was short-circuited"
        );

        // Metrics saw the open transition and the dead letters.
        let snapshot = instance.metrics.snapshot();
        let channel = &snapshot.channels[DOMAIN_CHANNEL];
        assert_eq!(channel.dead_lettered, 10);
        assert_eq!(channel.circuit_transitions["closed->open"], 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_recovery_closes_circuit_after_two_probes() {
        let broker = MemoryBroker::new();
        let dir = TempDir::new().unwrap();
        let instance = build_instance(&broker, &dir).await;
        instance.client.connect().await.unwrap();
        instance.bridge.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Open the circuit with a burst during an outage.
        broker.set_unreachable(true);
        for sequence in 0..10 {
            instance
                .bus
                .publish(GameEvent::GameTick { sequence })
                .unwrap();
        }
        let breaker = instance.breaker.clone();
        assert!(
            wait_for(Duration::from_secs(5), || {
                breaker.state(DOMAIN_CHANNEL) == CircuitState::Open
            })
            .await
        );

        // Broker comes back; wait out the open timeout (150ms in tests),
        // and let the client finish its background reconnect.
        broker.set_unreachable(false);
        let client = instance.client.clone();
        assert!(
            wait_for(Duration::from_secs(2), || {
                client.state() == shared_fsm::ConnectionState::Connected
            })
            .await,
            "client did not reconnect"
        );
        tokio::time::sleep(Duration::from_millis(200)).await;

        // First probe succeeds: half-open. Second: closed.
        instance
            .bus
            .publish(GameEvent::GameTick { sequence: 100 })
            .unwrap();
        assert!(
            wait_for(Duration::from_secs(2), || {
                breaker.state(DOMAIN_CHANNEL) == CircuitState::HalfOpen
            })
            .await,
            "first probe did not reach half-open"
        );

        instance
            .bus
            .publish(GameEvent::GameTick { sequence: 101 })
            .unwrap();
        assert!(
            wait_for(Duration::from_secs(2), || {
                breaker.state(DOMAIN_CHANNEL) == CircuitState::Closed
            })
            .await,
            "second probe did not close the circuit"
        );

        // Normal service resumed.
        let before = broker.published();
        instance
            .bus
            .publish(GameEvent::GameTick { sequence: 102 })
            .unwrap();
        let broker_after = broker.clone();
        assert!(
            wait_for(Duration::from_secs(2), move || broker_after.published() > before).await,
            "publishing did not resume after recovery"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dead_letter_replay_delivers_to_other_instance() {
        let broker = MemoryBroker::new();
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();
        let instance_a = build_instance(&broker, &dir_a).await;
        let instance_b = build_instance(&broker, &dir_b).await;
        instance_a.client.connect().await.unwrap();
        instance_b.client.connect().await.unwrap();
        instance_a.bridge.start();
        instance_b.bridge.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Dead-letter a burst during an outage.
        broker.set_unreachable(true);
        for sequence in 0..3 {
            instance_a
                .bus
                .publish(GameEvent::GameTick { sequence })
                .unwrap();
        }
        let count = wait_for_dlq_len(&instance_a.dlq, 3, Duration::from_secs(5)).await;
        assert_eq!(count, 3);

        // Recover, reset the breaker (operator action), and replay.
        broker.set_unreachable(false);
        let client = instance_a.client.clone();
        assert!(
            wait_for(Duration::from_secs(2), || {
                client.state() == shared_fsm::ConnectionState::Connected
            })
            .await
        );
        instance_a.breaker.reset(DOMAIN_CHANNEL);

        let (count_b, _sub_b) = counting_subscriber(&instance_b, "instance-b");
        let entries = instance_a.dlq.list(&DlqFilter::default()).await.unwrap();
        for entry in &entries {
            instance_a.bridge.replay(entry.id).await.unwrap();
        }

        // Replayed events reach the other instance; entries are gone.
        assert!(
            wait_for(Duration::from_secs(5), || {
                count_b.load(Ordering::SeqCst) == 3
            })
            .await,
            "replayed events not delivered"
        );
        let remaining = instance_a.dlq.list(&DlqFilter::default()).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dlq_reason_and_channel_filters() {
        let broker = MemoryBroker::new();
        let dir = TempDir::new().unwrap();
        let instance = build_instance(&broker, &dir).await;
        instance.client.connect().await.unwrap();
        instance.bridge.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        broker.set_unreachable(true);
        for sequence in 0..6 {
            instance
                .bus
                .publish(GameEvent::GameTick { sequence })
                .unwrap();
        }
        let count = wait_for_dlq_len(&instance.dlq, 6, Duration::from_secs(5)).await;
        assert_eq!(count, 6);

        let by_channel = instance
            .dlq
            .list(&DlqFilter {
                channel: Some(DOMAIN_CHANNEL.to_string()),
                ..DlqFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_channel.len(), 6);

        let open_only = instance
            .dlq
            .list(&DlqFilter {
                reason: Some(FailureReason::CircuitOpen),
                ..DlqFilter::default()
            })
            .await
            .unwrap();
        let exhausted_only = instance
            .dlq
            .list(&DlqFilter {
                reason: Some(FailureReason::RetriesExhausted),
                ..DlqFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(open_only.len() + exhausted_only.len(), 6);
    }
}
