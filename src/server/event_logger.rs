// src/server/event_logger.rs

//! A background task that writes every lifecycle event to the log.

use crate::core::events::{DisconnectReason, ServerEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Subscribes to the event bus and logs until the bus is dropped.
pub fn spawn(mut events: broadcast::Receiver<ServerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event logger lagged behind, {} events skipped.", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::Started { endpoint } => info!("Server started on {}.", endpoint),
        ServerEvent::Stopped { endpoint } => info!("Server on {} stopped.", endpoint),
        ServerEvent::Connected { key, .. } => trace!("Connected: {}", key),
        ServerEvent::Disconnected { key, reason } => match reason {
            DisconnectReason::Ping => debug!("Client {} disconnected after a liveness check.", key),
            _ => info!("Client {} disconnected, reason: {}", key, reason),
        },
        ServerEvent::Error { key, error } => debug!("Connection {} error: {}", key, error),
        ServerEvent::DataReceived { key, data } => {
            trace!("{} bytes from {}: {}", data.len(), key, hex::encode_upper(data));
        }
    }
}
