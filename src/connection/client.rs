// src/connection/client.rs

//! Defines `ClientConnection`, the shared handle to one accepted socket.
//!
//! The receive side is owned by the connection's worker (`ConnectionHandler`);
//! everything else lives here so the registry, the dispatcher and the host can
//! send to or close the connection concurrently.

use super::session::DeviceSession;
use crate::core::events::DisconnectReason;
use crate::core::state::StatsState;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Active = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Active,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// One accepted TCP connection.
#[derive(Debug)]
pub struct ClientConnection {
    key: String,
    remote: SocketAddr,
    state: AtomicU8,
    reason: OnceLock<DisconnectReason>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    cancel: CancellationToken,
    idle_timeout_secs: AtomicU64,
    send_timeout: Option<Duration>,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    stats: Arc<StatsState>,
    /// Device metadata learned from decoded frames.
    pub session: parking_lot::Mutex<Option<DeviceSession>>,
}

impl ClientConnection {
    pub fn new(
        remote: SocketAddr,
        writer: OwnedWriteHalf,
        idle_timeout: Duration,
        send_timeout: Option<Duration>,
        stats: Arc<StatsState>,
    ) -> Self {
        Self {
            key: remote.to_string(),
            remote,
            state: AtomicU8::new(ConnectionState::Active as u8),
            reason: OnceLock::new(),
            writer: Mutex::new(Some(writer)),
            cancel: CancellationToken::new(),
            idle_timeout_secs: AtomicU64::new(idle_timeout.as_secs()),
            send_timeout,
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            stats,
            session: parking_lot::Mutex::new(None),
        }
    }

    /// The registry key: the remote endpoint as `ip:port`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_live(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// The reason assigned when the connection left `Active`, if it has.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        self.reason.get().copied()
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.load(Ordering::Relaxed))
    }

    /// Replaces the idle timeout. Takes effect the next time the timer is rearmed.
    pub fn set_idle_timeout(&self, timeout: Duration) {
        self.idle_timeout_secs
            .store(timeout.as_secs(), Ordering::Relaxed);
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub(crate) fn record_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        self.stats.add_bytes_received(n as u64);
    }

    fn record_sent(&self, n: u64) {
        self.bytes_sent.fetch_add(n, Ordering::Relaxed);
        self.stats.add_bytes_sent(n);
    }

    /// Resolves once the connection has been asked to close.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Moves the connection to `Closing` with `reason` and wakes its worker.
    ///
    /// Returns `false` if the connection had already left `Active`; the first
    /// reason wins.
    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        let transitioned = self
            .state
            .compare_exchange(
                ConnectionState::Active as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if transitioned {
            let _ = self.reason.set(reason);
            debug!("Connection {} closing ({}).", self.key, reason);
        }
        self.cancel.cancel();
        transitioned
    }

    /// Shuts the socket down and marks the connection `Closed`. Idempotent.
    pub(crate) async fn close(&self) {
        self.disconnect(DisconnectReason::Normal);
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer
            && let Err(e) = writer.shutdown().await
        {
            debug!("Error shutting down socket for {}: {}", self.key, e);
        }
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Writes `data` to the peer, returning the number of bytes sent.
    ///
    /// Returns 0 without failing when the connection is not live. A failed
    /// write closes the connection with `DisconnectReason::Exception`.
    pub async fn send_bytes(&self, data: &[u8]) -> usize {
        if data.is_empty() || !self.is_live() {
            return 0;
        }
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return 0,
            result = self.write_all(data) => result,
        };
        match result {
            Ok(()) => {
                self.record_sent(data.len() as u64);
                data.len()
            }
            Err(e) => {
                self.on_send_error(e);
                0
            }
        }
    }

    pub async fn send_string(&self, text: &str) -> usize {
        self.send_bytes(text.as_bytes()).await
    }

    /// Streams a file to the peer, returning the number of bytes sent.
    ///
    /// Returns 0 when the file cannot be opened or the connection is not live.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> u64 {
        let path = path.as_ref();
        if !self.is_live() {
            return 0;
        }
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) => {
                debug!("Cannot send {} to {}: {}", path.display(), self.key, e);
                return 0;
            }
        };
        let copy = async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or_else(not_connected)?;
            let n = self
                .bounded(async {
                    let n = tokio::io::copy(&mut file, &mut *writer).await?;
                    writer.flush().await?;
                    Ok(n)
                })
                .await?;
            Ok::<u64, io::Error>(n)
        };
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return 0,
            result = copy => result,
        };
        match result {
            Ok(n) => {
                self.record_sent(n);
                n
            }
            Err(e) => {
                self.on_send_error(e);
                0
            }
        }
    }

    async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(not_connected)?;
        self.bounded(writer.write_all(data)).await
    }

    /// Applies the configured send timeout to a write.
    async fn bounded<T>(&self, write: impl Future<Output = io::Result<T>>) -> io::Result<T> {
        match self.send_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "send timed out"))?,
            None => write.await,
        }
    }

    fn on_send_error(&self, e: io::Error) {
        if e.kind() == io::ErrorKind::NotConnected {
            return;
        }
        warn!("Send to {} failed: {}", self.key, e);
        self.disconnect(DisconnectReason::Exception);
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket already closed")
}
