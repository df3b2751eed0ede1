//! Healthy-broker delivery scenarios: every instance observes every
//! domain event (including the publisher, exactly once), and injection
//! never loops back onto the broker.

#[cfg(test)]
mod tests {
    use crate::integration::support::{build_instance, counting_subscriber, wait_for};
    use messaging::adapters::MemoryBroker;
    use messaging::BrokerTransport;
    use shared_types::{EventEnvelope, GameEvent, PlayerId, RoomId};
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_thousand_events_reach_every_instance_exactly_once() {
        let broker = MemoryBroker::new();
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        let instance_a = build_instance(&broker, &dir_a).await;
        let instance_b = build_instance(&broker, &dir_b).await;
        instance_a.client.connect().await.unwrap();
        instance_b.client.connect().await.unwrap();
        instance_a.bridge.start();
        instance_b.bridge.start();

        let (count_a, _sub_a) = counting_subscriber(&instance_a, "instance-a");
        let (count_b, _sub_b) = counting_subscriber(&instance_b, "instance-b");

        // Let instance B's wildcard subscription come up before publishing.
        assert!(
            wait_for(Duration::from_secs(2), || broker.published() == 0).await,
            "broker not idle"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        for sequence in 0..1_000 {
            instance_a
                .bus
                .publish(GameEvent::GameTick { sequence })
                .unwrap();
        }

        // Publisher sees its 1,000 via local dispatch; the remote
        // instance sees its 1,000 via the broker.
        assert!(
            wait_for(Duration::from_secs(10), || {
                count_a.load(Ordering::SeqCst) == 1_000 && count_b.load(Ordering::SeqCst) == 1_000
            })
            .await,
            "a={} b={}",
            count_a.load(Ordering::SeqCst),
            count_b.load(Ordering::SeqCst)
        );

        // Exactly once: no duplicate deliveries trickle in afterwards.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count_a.load(Ordering::SeqCst), 1_000);
        assert_eq!(count_b.load(Ordering::SeqCst), 1_000);

        // Healthy broker: nothing dead-lettered on either side.
        let dlq_a = instance_a.dlq.list(&Default::default()).await.unwrap();
        let dlq_b = instance_b.dlq.list(&Default::default()).await.unwrap();
        assert!(dlq_a.is_empty());
        assert!(dlq_b.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_injected_events_are_not_republished() {
        let broker = MemoryBroker::new();
        let dir = TempDir::new().unwrap();
        let instance = build_instance(&broker, &dir).await;
        instance.client.connect().await.unwrap();
        instance.bridge.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // An event arriving "from another instance".
        let remote = EventEnvelope::new(GameEvent::PlayerEnteredRoom {
            player: PlayerId::new(),
            room: RoomId::new(),
        });
        let session = broker.connect("mem://").await.unwrap();
        session
            .publish(
                "events.domain.player_entered_room",
                remote.to_json().unwrap(),
            )
            .await
            .unwrap();

        let (count, _sub) = counting_subscriber(&instance, "observer");
        // One local delivery via inject...
        assert!(
            wait_for(Duration::from_secs(2), || count.load(Ordering::SeqCst) >= 1).await
        );

        // ...and no republish: only the original external publish exists.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(broker.published(), 1, "injection looped back to the broker");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_typed_payloads_survive_the_wire() {
        let broker = MemoryBroker::new();
        let dir_a = TempDir::new().unwrap();
        let dir_b = TempDir::new().unwrap();

        let instance_a = build_instance(&broker, &dir_a).await;
        let instance_b = build_instance(&broker, &dir_b).await;
        instance_a.client.connect().await.unwrap();
        instance_b.client.connect().await.unwrap();
        instance_a.bridge.start();
        instance_b.bridge.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let callback: shared_bus::SubscriberCallback =
            std::sync::Arc::new(move |envelope: EventEnvelope| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(envelope);
                    Ok(())
                })
            });
        let _sub = instance_b.bus.subscribe(
            "combat-watcher",
            shared_types::EventFilter::kinds(vec![shared_types::EventKind::CombatStarted]),
            callback,
        );

        let attacker = PlayerId::new();
        let defender = PlayerId::new();
        let room = RoomId::new();
        let published = instance_a
            .bus
            .publish(GameEvent::CombatStarted {
                room,
                attacker,
                defender,
            })
            .unwrap();
        // A kind the filter excludes.
        instance_a
            .bus
            .publish(GameEvent::GameTick { sequence: 1 })
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received.id, published.id);
        assert_eq!(
            received.event,
            GameEvent::CombatStarted {
                room,
                attacker,
                defender
            }
        );
    }
}
