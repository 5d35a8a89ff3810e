// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::client::ClientMap;
use super::stats::StatsState;
use crate::config::Config;
use crate::connection::{ClientConnection, PayloadHandler, SessionDispatcher};
use crate::core::events::{AcceptAll, ConnectionFilter, DisconnectReason, EventBus, ServerEvent};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The shared context handed to the accept loop and to every connection worker.
pub struct ServerState {
    /// The validated configuration the server was started with.
    pub config: Arc<Config>,
    /// Live connections, keyed by remote endpoint.
    pub clients: ClientMap,
    /// Server-wide byte and connection counters.
    pub stats: Arc<StatsState>,
    /// Lifecycle notifications for the hosting layer.
    pub events: Arc<EventBus>,
    /// Consulted for every accepted socket before a connection is created.
    pub filter: Arc<dyn ConnectionFilter>,
    /// Receives every chunk read from a connection.
    pub handler: Arc<dyn PayloadHandler>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("config", &self.config)
            .field("clients", &self.clients.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Builds the state with the default filter and the protocol dispatcher.
    pub fn new(config: Config) -> Self {
        let handler = Arc::new(SessionDispatcher::new(config.protocol.verify_checksum));
        Self::with_parts(config, Arc::new(AcceptAll), handler)
    }

    pub fn with_parts(
        config: Config,
        filter: Arc<dyn ConnectionFilter>,
        handler: Arc<dyn PayloadHandler>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            clients: Arc::new(DashMap::new()),
            stats: Arc::new(StatsState::new()),
            events: Arc::new(EventBus::new()),
            filter,
            handler,
        }
    }

    /// The idle timeout new connections start with. Zero disables it.
    pub fn default_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.config.keep_alive_secs)
    }

    pub fn get_client(&self, key: &str) -> Option<Arc<ClientConnection>> {
        self.clients.get(key).map(|entry| entry.value().clone())
    }

    pub fn publish(&self, event: ServerEvent) {
        self.events.publish(event);
    }

    /// Requests every registered connection to close with `reason`.
    ///
    /// Connections remove themselves from the registry as their workers exit;
    /// ones that already started closing are left alone.
    pub fn disconnect_all(&self, reason: DisconnectReason) -> usize {
        let connections: Vec<_> = self.clients.iter().map(|e| e.value().clone()).collect();
        let closed = connections
            .iter()
            .filter(|conn| conn.disconnect(reason))
            .count();
        debug!("Requested {} of {} connections to close ({}).", closed, connections.len(), reason);
        closed
    }
}
