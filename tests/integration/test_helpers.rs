// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use guard_gateway::GatewayServer;
use guard_gateway::config::Config;
use guard_gateway::connection::PayloadHandler;
use guard_gateway::core::events::{ConnectionFilter, DisconnectReason, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// How long a test waits for something the server should do promptly.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A running gateway bound to an ephemeral loopback port.
pub struct TestContext {
    pub server: GatewayServer,
    pub addr: SocketAddr,
    pub events: broadcast::Receiver<ServerEvent>,
}

/// The configuration every test starts from.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        shutdown_grace_secs: 2,
        ..Config::default()
    }
}

fn init_tracing() {
    // Ignore the error if another test already installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        init_tracing();
        Self::start(GatewayServer::new(config)).await
    }

    pub async fn with_parts(
        config: Config,
        filter: Arc<dyn ConnectionFilter>,
        handler: Arc<dyn PayloadHandler>,
    ) -> Self {
        init_tracing();
        Self::start(GatewayServer::with_parts(config, filter, handler)).await
    }

    async fn start(server: GatewayServer) -> Self {
        let events = server.subscribe();
        let addr = server.start().await.expect("Failed to start gateway");
        Self {
            server,
            addr,
            events,
        }
    }

    /// Connects a client and waits until the server has registered it.
    /// Returns the stream and the registry key of the connection.
    pub async fn connect(&mut self) -> (TcpStream, String) {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect to gateway");
        self.registered(stream).await
    }

    /// Waits until the server has registered an already connected `stream`.
    pub async fn registered(&mut self, stream: TcpStream) -> (TcpStream, String) {
        let key = stream.local_addr().unwrap().to_string();
        let expected = key.clone();
        self.next_event(|e| matches!(e, ServerEvent::Connected { key, .. } if *key == expected))
            .await;
        (stream, key)
    }

    /// Waits for the next event satisfying `pred`, skipping all others.
    pub async fn next_event(&mut self, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        self.try_next_event(pred, EVENT_TIMEOUT)
            .await
            .expect("Timed out waiting for server event")
    }

    /// Like `next_event`, but gives up quietly after `window`.
    pub async fn try_next_event(
        &mut self,
        pred: impl Fn(&ServerEvent) -> bool,
        window: Duration,
    ) -> Option<ServerEvent> {
        let events = &mut self.events;
        tokio::time::timeout(window, async {
            loop {
                match events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
                }
            }
        })
        .await
        .ok()
    }

    /// Waits for the `Disconnected` event of `key` and returns its reason.
    pub async fn disconnected(&mut self, key: &str) -> DisconnectReason {
        let expected = key.to_string();
        match self
            .next_event(|e| matches!(e, ServerEvent::Disconnected { key, .. } if *key == expected))
            .await
        {
            ServerEvent::Disconnected { reason, .. } => reason,
            _ => unreachable!(),
        }
    }

    /// Asserts that no `Disconnected` event for `key` arrives within `window`.
    pub async fn assert_no_disconnect(&mut self, key: &str, window: Duration) {
        let events = &mut self.events;
        let outcome = tokio::time::timeout(window, async {
            loop {
                match events.recv().await {
                    Ok(ServerEvent::Disconnected { key: k, reason }) if k == key => return reason,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        std::future::pending::<()>().await;
                    }
                }
            }
        })
        .await;
        if let Ok(reason) = outcome {
            panic!("unexpected Disconnected({reason}) for {key}");
        }
    }
}

/// Reads one legacy-variant frame (one-byte length prefix).
pub async fn read_legacy_frame(stream: &mut TcpStream) -> Vec<u8> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        let len = stream.read_u8().await.expect("read length prefix") as usize;
        let mut frame = vec![len as u8];
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.expect("read frame body");
        frame.extend_from_slice(&body);
        frame
    })
    .await
    .expect("Timed out reading a legacy frame")
}

/// Reads one new-variant frame (two-byte big-endian length prefix).
pub async fn read_new_frame(stream: &mut TcpStream) -> Vec<u8> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        let len = stream.read_u16().await.expect("read length prefix");
        let mut frame = len.to_be_bytes().to_vec();
        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).await.expect("read frame body");
        frame.extend_from_slice(&body);
        frame
    })
    .await
    .expect("Timed out reading a new-variant frame")
}

/// Reads until the server closes the socket and returns everything read.
pub async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(EVENT_TIMEOUT, stream.read_to_end(&mut out))
        .await
        .expect("Timed out waiting for the server to close the socket")
        .expect("read until close");
    out
}
