// src/connection/handler.rs

//! Defines the `ConnectionHandler` which runs the receive loop of one connection.

use super::client::ClientConnection;
use super::guard::ConnectionGuard;
use crate::core::GatewayError;
use crate::core::events::{DisconnectReason, ServerEvent};
use crate::core::state::ServerState;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Owns the read half of a connection and drives it until it closes.
pub struct ConnectionHandler {
    conn: Arc<ClientConnection>,
    reader: OwnedReadHalf,
    state: Arc<ServerState>,
    buffer_size: usize,
    recv_timeout: Option<Duration>,
    idle_grace: Duration,
    // Created with the handler so cleanup runs even if the task never starts.
    // Declared last so the socket is fully released before it runs.
    _guard: ConnectionGuard,
}

impl ConnectionHandler {
    pub fn new(
        conn: Arc<ClientConnection>,
        reader: OwnedReadHalf,
        state: Arc<ServerState>,
    ) -> Self {
        let socket = &state.config.socket;
        let buffer_size = socket.recv_buffer_size.max(1);
        let recv_timeout = socket.recv_timeout();
        let idle_grace = state.config.idle_grace();
        let guard = ConnectionGuard::new(state.clone(), conn.clone());
        Self {
            conn,
            reader,
            state,
            buffer_size,
            recv_timeout,
            idle_grace,
            _guard: guard,
        }
    }

    /// The receive loop. Every exit path closes the socket, removes the
    /// connection from the registry and emits exactly one `Disconnected`.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; self.buffer_size];
        let mut deadline = idle_deadline(self.conn.idle_timeout());

        loop {
            tokio::select! {
                biased;

                _ = self.conn.cancelled() => {
                    debug!("Connection {} observed cancellation.", self.conn.key());
                    break;
                }
                _ = idle_expiry(deadline) => {
                    debug!("Connection {} idle timeout elapsed.", self.conn.key());
                    self.conn.disconnect(DisconnectReason::TimeOut);
                    break;
                }
                result = read_chunk(&mut self.reader, &mut buf, self.recv_timeout) => {
                    match result {
                        Ok(0) => {
                            self.report_error(GatewayError::PeerClosed(self.conn.key().to_string()));
                            self.conn.disconnect(DisconnectReason::Normal);
                            break;
                        }
                        Ok(n) => {
                            self.conn.record_received(n);
                            let chunk = Bytes::copy_from_slice(&buf[..n]);
                            self.state.publish(ServerEvent::DataReceived {
                                key: self.conn.key().to_string(),
                                data: chunk.clone(),
                            });
                            // The timer keeps running while the chunk is handled.
                            deadline = rearmed_deadline(self.conn.idle_timeout(), self.idle_grace);
                            if !self.dispatch(chunk, deadline).await {
                                break;
                            }
                            deadline = rearmed_deadline(self.conn.idle_timeout(), self.idle_grace);
                        }
                        Err(e) => {
                            let reason = reason_for_read_error(&e);
                            if reason == DisconnectReason::Exception {
                                warn!("Read error on {}: {}", self.conn.key(), e);
                            } else {
                                debug!("Connection {} read ended: {}", self.conn.key(), e);
                            }
                            self.report_error(e.into());
                            self.conn.disconnect(reason);
                            break;
                        }
                    }
                }
            }
        }

        self.conn.close().await;
    }

    /// Hands a chunk to the payload handler. Returns `false` when the
    /// connection was cancelled or went idle before the handler finished,
    /// e.g. while an acknowledgement was stuck on a full send buffer.
    async fn dispatch(&self, chunk: Bytes, deadline: Option<Instant>) -> bool {
        tokio::select! {
            biased;

            _ = self.conn.cancelled() => false,
            _ = idle_expiry(deadline) => {
                debug!("Connection {} idle timeout elapsed while handling data.", self.conn.key());
                self.conn.disconnect(DisconnectReason::TimeOut);
                false
            }
            _ = self.state.handler.on_data(&self.conn, chunk) => true,
        }
    }

    fn report_error(&self, error: GatewayError) {
        self.state.publish(ServerEvent::Error {
            key: self.conn.key().to_string(),
            error,
        });
    }
}

/// `None` when the timeout is zero, meaning the timer is disabled.
fn idle_deadline(timeout: Duration) -> Option<Instant> {
    (!timeout.is_zero()).then(|| Instant::now() + timeout)
}

/// After traffic the timer runs for the timeout plus the configured grace.
fn rearmed_deadline(timeout: Duration, grace: Duration) -> Option<Instant> {
    if timeout.is_zero() {
        return None;
    }
    idle_deadline(timeout + grace)
}

async fn idle_expiry(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn read_chunk(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    limit: Option<Duration>,
) -> io::Result<usize> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "receive timed out"))?,
        None => reader.read(buf).await,
    }
}

/// Maps a failed read onto the most specific disconnect reason.
fn reason_for_read_error(e: &io::Error) -> DisconnectReason {
    match e.kind() {
        io::ErrorKind::TimedOut => DisconnectReason::TimeOut,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => DisconnectReason::Normal,
        _ => DisconnectReason::Exception,
    }
}
