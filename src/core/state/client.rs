// src/core/state/client.rs

//! Contains state definitions related to client connections.

use crate::connection::ClientConnection;
use dashmap::DashMap;
use std::sync::Arc;

/// The registry of live connections, keyed by remote endpoint (`ip:port`).
pub type ClientMap = Arc<DashMap<String, Arc<ClientConnection>>>;
