//! # Emberfall Node
//!
//! Entry point: load configuration, build the core container, connect to
//! the broker, start the bridge and admin API, and shut everything down
//! within a bounded timeout on ctrl-c.

use anyhow::{Context, Result};
use ember_telemetry::LogConfig;
use messaging::adapters::NatsTransport;
use node_runtime::api::{self, ApiState};
use node_runtime::{CoreContainer, NodeConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bound on how long shutdown waits for each component to drain.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let log = LogConfig {
        json: std::env::var("EMBER_LOG_JSON").is_ok_and(|v| v == "1" || v == "true"),
        ..LogConfig::default()
    };
    ember_telemetry::init_logging(&log).context("logging init failed")?;

    let config = NodeConfig::from_env().context("configuration invalid")?;
    info!(
        broker = %config.broker.url,
        dlq_dir = %config.dlq.dir.display(),
        api = %config.api.bind_addr,
        "starting emberfall node"
    );

    let transport = Arc::new(NatsTransport::new());
    let container = CoreContainer::build(config.clone(), transport)
        .await
        .context("container build failed")?;

    // A broker outage at boot is not fatal: the state machine keeps the
    // reconnect cycle running in the background.
    if let Err(err) = container.client.connect().await {
        warn!(error = %err, "initial broker connect failed; reconnecting in background");
    }

    container.bridge.start();
    let cleanup = container.dlq.spawn_cleanup();

    let state = ApiState {
        metrics: container.metrics.clone(),
        dlq: container.dlq.clone(),
        bridge: container.bridge.clone(),
        client: container.client.clone(),
    };
    let listener = tokio::net::TcpListener::bind(config.api.bind_addr)
        .await
        .context("admin api bind failed")?;
    info!(addr = %config.api.bind_addr, "admin api listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("admin api server failed")?;

    info!("shutting down");
    container.bridge.stop(SHUTDOWN_TIMEOUT).await;
    container.client.shutdown();
    container.bus.shutdown(SHUTDOWN_TIMEOUT).await;
    cleanup.abort();
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
