// src/server/listener.rs

//! Defines `GatewayServer`, the host-facing handle that owns the listener and
//! exposes the connection registry.

use super::connection_loop;
use super::context::ServerContext;
use super::initialization;
use crate::config::Config;
use crate::connection::{ClientConnection, PayloadHandler};
use crate::core::GatewayError;
use crate::core::events::{ConnectionFilter, DisconnectReason, ServerEvent};
use crate::core::protocol::{ProtocolVariant, encode_relay_command};
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A Guard gateway listener and its registry of live connections.
#[derive(Debug)]
pub struct GatewayServer {
    state: Arc<ServerState>,
    running: parking_lot::Mutex<Option<ServerContext>>,
}

impl GatewayServer {
    /// A server that accepts every connection and speaks the Guard protocol.
    pub fn new(config: Config) -> Self {
        Self::from_state(ServerState::new(config))
    }

    /// A server with a custom connection filter and payload handler.
    pub fn with_parts(
        config: Config,
        filter: Arc<dyn ConnectionFilter>,
        handler: Arc<dyn PayloadHandler>,
    ) -> Self {
        Self::from_state(ServerState::with_parts(config, filter, handler))
    }

    fn from_state(state: ServerState) -> Self {
        Self {
            state: Arc::new(state),
            running: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.state.events.subscribe()
    }

    /// Binds the listener and starts accepting connections.
    ///
    /// Returns the bound endpoint. A bind failure is returned, never retried.
    pub async fn start(&self) -> Result<SocketAddr, GatewayError> {
        if self.is_listening() {
            return Err(GatewayError::Internal("server is already running".into()));
        }
        self.state.clients.clear();

        let listener = initialization::bind_listener(&self.state.config).await?;
        let endpoint = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(connection_loop::run(
            listener,
            self.state.clone(),
            shutdown.clone(),
        ));

        {
            let mut running = self.running.lock();
            if running.is_some() {
                shutdown.cancel();
                return Err(GatewayError::Internal("server is already running".into()));
            }
            *running = Some(ServerContext {
                endpoint,
                shutdown,
                accept_task,
            });
        }

        self.state.publish(ServerEvent::Started { endpoint });
        Ok(endpoint)
    }

    /// Closes every connection, stops listening and waits for the workers.
    ///
    /// Calling it again, or on a server that never started, does nothing.
    pub async fn stop(&self) {
        let Some(ctx) = self.running.lock().take() else {
            return;
        };
        info!("Stopping Guard gateway on {}.", ctx.endpoint);

        ctx.shutdown.cancel();
        self.state.disconnect_all(DisconnectReason::ServerStopped);
        if let Err(e) = ctx.accept_task.await {
            warn!("Accept loop ended abnormally: {e:?}");
        }

        self.state.publish(ServerEvent::Stopped {
            endpoint: ctx.endpoint,
        });
        info!(
            "Guard gateway stopped after accepting {} connection(s).",
            self.state.stats.get_total_connections()
        );
    }

    pub fn is_listening(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|ctx| ctx.endpoint)
    }

    pub fn connection(&self, key: &str) -> Option<Arc<ClientConnection>> {
        self.state.get_client(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.clients.iter().map(|e| e.key().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.state.clients.len()
    }

    /// Sends raw bytes to one connection. Returns 0 if it is unknown or not live.
    pub async fn send_bytes(&self, key: &str, data: &[u8]) -> usize {
        match self.connection(key) {
            Some(conn) => conn.send_bytes(data).await,
            None => 0,
        }
    }

    pub async fn send_string(&self, key: &str, text: &str) -> usize {
        self.send_bytes(key, text.as_bytes()).await
    }

    pub async fn send_file(&self, key: &str, path: impl AsRef<Path>) -> u64 {
        match self.connection(key) {
            Some(conn) => conn.send_file(path).await,
            None => 0,
        }
    }

    /// Drops one connection with `DisconnectReason::ServerAborted`.
    ///
    /// Returns `false` if the key is unknown or the connection is already closing.
    pub fn disconnect(&self, key: &str) -> bool {
        self.connection(key)
            .is_some_and(|conn| conn.disconnect(DisconnectReason::ServerAborted))
    }

    /// Sends a relay command in the protocol variant the device last used.
    pub async fn send_relay_command(&self, key: &str) -> Result<usize, GatewayError> {
        let conn = self
            .connection(key)
            .ok_or_else(|| GatewayError::NotConnected(key.to_string()))?;
        let variant = conn
            .session
            .lock()
            .as_ref()
            .map(|s| s.variant)
            .unwrap_or(ProtocolVariant::Legacy);
        let frame = encode_relay_command(variant)?;
        match conn.send_bytes(&frame).await {
            0 => Err(GatewayError::NotConnected(key.to_string())),
            n => Ok(n),
        }
    }

    /// Total bytes read from all connections since the server was created.
    pub fn bytes_received(&self) -> u64 {
        self.state.stats.get_bytes_received()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.state.stats.get_bytes_sent()
    }
}
