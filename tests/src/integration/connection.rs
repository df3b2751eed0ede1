//! Connection lifecycle scenarios: drop-and-recover with exactly one
//! attempt in flight, and mutual exclusion of concurrent connects.

#[cfg(test)]
mod tests {
    use crate::integration::support::{build_instance, wait_for};
    use messaging::adapters::MemoryBroker;
    use messaging::{ClientConfig, MessagingClient, MessagingError};
    use shared_fsm::{ConnectionState, ReconnectPolicy};
    use shared_types::GameEvent;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_connects_yield_single_attempt() {
        let broker = MemoryBroker::new();
        // Slow dials widen the race window.
        broker.set_connect_delay(Duration::from_millis(50));

        let client = Arc::new(MessagingClient::new(
            Arc::new(broker.clone()),
            ClientConfig {
                url: "mem://".to_string(),
                reconnect: ReconnectPolicy::default(),
            },
        ));

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.connect().await })
        };
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.connect().await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let rejections = results
            .iter()
            .filter(|r| matches!(r, Err(MessagingError::AlreadyConnecting)))
            .count();

        assert_eq!(successes, 1, "exactly one connect must win");
        assert_eq!(rejections, 1, "the loser must be rejected, not queued");
        assert_eq!(broker.connect_attempts(), 1);
        assert!(broker.max_connects_in_flight() <= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drop_mid_session_recovers_with_one_attempt_in_flight() {
        let broker = MemoryBroker::new();
        broker.set_connect_delay(Duration::from_millis(20));
        let dir = TempDir::new().unwrap();
        let instance = build_instance(&broker, &dir).await;
        instance.client.connect().await.unwrap();
        instance.bridge.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Drop the connection mid-session: next publish observes the loss.
        broker.set_unreachable(true);
        instance
            .bus
            .publish(GameEvent::GameTick { sequence: 1 })
            .unwrap();

        let client = instance.client.clone();
        assert!(
            wait_for(Duration::from_secs(2), || {
                matches!(
                    client.state(),
                    ConnectionState::Reconnecting
                        | ConnectionState::Degraded
                        | ConnectionState::Connecting
                        | ConnectionState::Connected
                )
            })
            .await
        );

        broker.set_unreachable(false);
        assert!(
            wait_for(Duration::from_secs(3), || {
                client.state() == ConnectionState::Connected
            })
            .await,
            "connection did not recover"
        );

        // The invariant under churn: never two dials at once.
        assert!(broker.max_connects_in_flight() <= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_is_terminal_until_reset() {
        let broker = MemoryBroker::new();
        broker.set_fail_connects(true);

        let client = MessagingClient::new(
            Arc::new(broker.clone()),
            ClientConfig {
                url: "mem://".to_string(),
                reconnect: ReconnectPolicy {
                    max_attempts: 3,
                    base_delay: Duration::from_millis(5),
                    max_delay: Duration::from_millis(20),
                },
            },
        );

        assert!(client.connect().await.is_err());
        assert!(
            wait_for(Duration::from_secs(2), || {
                client.state() == ConnectionState::Failed
            })
            .await,
            "client never reached the terminal failed state"
        );

        // Terminal: no dial happens without an explicit reset.
        let attempts_at_failure = broker.connect_attempts();
        assert!(client.connect().await.is_err());
        assert_eq!(broker.connect_attempts(), attempts_at_failure);

        broker.set_fail_connects(false);
        client.reset();
        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
    }
}
