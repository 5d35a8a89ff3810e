// src/server/mod.rs

use crate::config::Config;
use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use std::time::Duration;
use tracing::{info, warn};

mod connection_loop;
mod context;
mod event_logger;
mod initialization;
mod listener;
mod metrics_server;

pub use listener::GatewayServer;

const LOGGER_DRAIN: Duration = Duration::from_secs(2);

/// Runs the gateway until SIGINT or SIGTERM, then shuts it down gracefully.
pub async fn run(config: Config) -> Result<()> {
    initialization::log_startup_info(&config);

    let server = GatewayServer::new(config);
    let event_logger = event_logger::spawn(server.subscribe());

    let metrics_shutdown = CancellationToken::new();
    let metrics_task = if server.state().config.metrics.enabled {
        Some(tokio::spawn(metrics_server::run_metrics_server(
            server.state().clone(),
            metrics_shutdown.clone(),
        )))
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
        None
    };

    let endpoint = server
        .start()
        .await
        .with_context(|| format!("Failed to bind {}", server.state().config.listen_addr()))?;
    info!("Accepting Guard controllers on {}.", endpoint);

    wait_for_shutdown_signal().await?;

    server.stop().await;
    metrics_shutdown.cancel();
    if let Some(task) = metrics_task {
        let _ = task.await;
    }
    drop(server);
    // The logger ends once the last event bus handle is gone.
    if tokio::time::timeout(LOGGER_DRAIN, event_logger).await.is_err() {
        warn!("Event logger did not drain in time.");
    }
    info!("Server shutdown complete.");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
    }
    Ok(())
}
