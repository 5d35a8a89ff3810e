// src/core/events.rs

//! Defines the event bus that carries connection lifecycle notifications to
//! the hosting layer, and the hook used to vet incoming connections.

use crate::core::GatewayError;
use bytes::Bytes;
use serde::Serialize;
use std::net::SocketAddr;
use strum::{Display, IntoStaticStr};
use tokio::sync::broadcast::{self, Sender as BroadcastSender};
use tracing::trace;

/// The capacity of the broadcast channel. Slow subscribers lag rather than
/// slowing down connection workers.
const EVENT_BUS_CAPACITY: usize = 4096;

/// Why a connection left the `Active` state. Assigned exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, IntoStaticStr)]
pub enum DisconnectReason {
    /// The peer closed the socket or reset it.
    Normal,
    /// A read, write or dispatch failure.
    Exception,
    /// The host asked for this one connection to be dropped.
    ServerAborted,
    /// The whole server is shutting down.
    ServerStopped,
    /// Closed after answering a `PING` liveness check.
    Ping,
    /// No traffic within the idle timeout.
    TimeOut,
}

/// Lifecycle notifications published by the listener and connection workers.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Started {
        endpoint: SocketAddr,
    },
    Stopped {
        endpoint: SocketAddr,
    },
    Error {
        key: String,
        error: GatewayError,
    },
    Connected {
        key: String,
        remote: SocketAddr,
    },
    Disconnected {
        key: String,
        reason: DisconnectReason,
    },
    DataReceived {
        key: String,
        data: Bytes,
    },
}

/// A fire-and-forget multicast of `ServerEvent`s.
#[derive(Debug)]
pub struct EventBus {
    sender: BroadcastSender<ServerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ServerEvent) {
        if self.sender.send(event).is_err() {
            trace!("Published a server event with no active subscribers.");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }
}

/// Decides whether a freshly accepted socket may become a connection.
///
/// Called synchronously from the accept loop before any per-connection
/// resources are allocated, so implementations must not block.
pub trait ConnectionFilter: Send + Sync {
    fn on_connection_request(&self, key: &str) -> bool;
}

/// The default filter: every connection is accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ConnectionFilter for AcceptAll {
    fn on_connection_request(&self, _key: &str) -> bool {
        true
    }
}

impl<F> ConnectionFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn on_connection_request(&self, key: &str) -> bool {
        self(key)
    }
}
