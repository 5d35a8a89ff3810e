// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection resource management.

use super::client::ClientConnection;
use crate::core::events::{DisconnectReason, ServerEvent};
use crate::core::metrics;
use crate::core::state::ServerState;
use std::sync::Arc;
use tracing::debug;

/// An RAII guard that removes a connection from the registry and announces
/// its disconnection when the connection's worker exits, however it exits.
pub struct ConnectionGuard {
    /// A shared reference to the server state.
    pub(crate) state: Arc<ServerState>,
    pub(crate) conn: Arc<ClientConnection>,
}

impl ConnectionGuard {
    /// Creates a new `ConnectionGuard`.
    pub(crate) fn new(state: Arc<ServerState>, conn: Arc<ClientConnection>) -> Self {
        Self { state, conn }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let key = self.conn.key();

        // A newer connection may have reused the same endpoint key.
        let removed = self
            .state
            .clients
            .remove_if(key, |_, existing| Arc::ptr_eq(existing, &self.conn))
            .is_some();
        if !removed {
            debug!("Connection {} was already gone from the registry upon cleanup.", key);
        }

        metrics::CONNECTED_DEVICES.dec();
        let reason = self
            .conn
            .disconnect_reason()
            .unwrap_or(DisconnectReason::Normal);
        let reason_label: &'static str = reason.into();
        metrics::DISCONNECTS_TOTAL
            .with_label_values(&[reason_label])
            .inc();

        debug!(
            "Connection {} cleaned up ({}), {} bytes in, {} bytes out.",
            key,
            reason,
            self.conn.bytes_received(),
            self.conn.bytes_sent()
        );
        self.state.publish(ServerEvent::Disconnected {
            key: key.to_string(),
            reason,
        });
    }
}
