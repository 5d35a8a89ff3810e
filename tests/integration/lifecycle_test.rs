// tests/integration/lifecycle_test.rs

//! Connection lifecycle: registration, every disconnect reason, registry
//! cleanup and server start/stop.

use super::fixtures::{HEARTBEAT, heartbeat_payload, legacy_frame};
use super::test_helpers::{TestContext, read_to_close, test_config};
use guard_gateway::GatewayServer;
use guard_gateway::connection::{ConnectionState, PING_REPLY, SessionDispatcher};
use guard_gateway::core::GatewayError;
use guard_gateway::core::events::{ConnectionFilter, DisconnectReason, ServerEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};

#[tokio::test]
async fn test_connect_registers_connection() {
    let mut ctx = TestContext::new().await;
    assert!(ctx.server.is_listening());
    assert_eq!(ctx.server.local_addr(), Some(ctx.addr));

    let (_stream, key) = ctx.connect().await;

    assert_eq!(ctx.server.count(), 1);
    assert_eq!(ctx.server.keys(), vec![key.clone()]);
    let conn = ctx.server.connection(&key).unwrap();
    assert_eq!(conn.key(), key);
    assert_eq!(conn.state(), ConnectionState::Active);
    assert_eq!(conn.idle_timeout(), Duration::from_secs(60));

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_ping_answers_and_closes() {
    let mut ctx = TestContext::new().await;
    let (mut stream, key) = ctx.connect().await;
    let conn = ctx.server.connection(&key).unwrap();

    stream.write_all(b"PING").await.unwrap();
    let received = read_to_close(&mut stream).await;

    assert_eq!(received, PING_REPLY);
    assert_eq!(ctx.disconnected(&key).await, DisconnectReason::Ping);
    assert!(ctx.server.connection(&key).is_none());
    // A liveness check is not a controller frame.
    assert!(conn.session.lock().is_none());
    assert_eq!(conn.idle_timeout(), Duration::from_secs(60));

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_idle_timeout_disconnects_once() {
    let mut config = test_config();
    config.keep_alive_secs = 1;
    let mut ctx = TestContext::with_config(config).await;
    let (mut stream, key) = ctx.connect().await;

    assert_eq!(ctx.disconnected(&key).await, DisconnectReason::TimeOut);
    assert!(read_to_close(&mut stream).await.is_empty());
    assert_eq!(ctx.server.count(), 0);
    ctx.assert_no_disconnect(&key, Duration::from_millis(300)).await;

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_idle_timeout_fires_while_ack_is_stuck() {
    let mut config = test_config();
    config.keep_alive_secs = 1;
    config.idle_grace_secs = 0;
    config.socket.send_timeout_ms = 0;
    config.socket.send_buffer_size = 1024;
    let mut ctx = TestContext::with_config(config).await;

    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(1024).unwrap();
    let stream = socket.connect(ctx.addr).await.unwrap();
    let (mut stream, key) = ctx.registered(stream).await;

    // Never read the acknowledgements. Once both socket buffers are full the
    // gateway stops consuming heartbeats because it is stuck writing an ack.
    let mut stalled = false;
    for seq in 0..20_000i16 {
        stream
            .write_all(&legacy_frame(seq, HEARTBEAT, &heartbeat_payload()))
            .await
            .unwrap();
        let expected = key.clone();
        let seen = ctx
            .try_next_event(
                |e| matches!(e, ServerEvent::DataReceived { key, .. } if *key == expected),
                Duration::from_millis(500),
            )
            .await;
        if seen.is_none() {
            stalled = true;
            break;
        }
    }
    assert!(stalled, "the gateway never blocked on a full send buffer");

    assert_eq!(ctx.disconnected(&key).await, DisconnectReason::TimeOut);
    assert_eq!(ctx.server.count(), 0);

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_zero_keep_alive_never_times_out() {
    let mut config = test_config();
    config.keep_alive_secs = 0;
    let mut ctx = TestContext::with_config(config).await;
    let (_stream, key) = ctx.connect().await;

    ctx.assert_no_disconnect(&key, Duration::from_millis(1500)).await;
    assert_eq!(ctx.server.count(), 1);

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_peer_close_is_normal() {
    let mut ctx = TestContext::new().await;
    let (stream, key) = ctx.connect().await;

    drop(stream);

    let expected = key.clone();
    let event = ctx
        .next_event(|e| matches!(e, ServerEvent::Error { key, .. } if *key == expected))
        .await;
    assert!(matches!(
        event,
        ServerEvent::Error {
            error: GatewayError::PeerClosed(_),
            ..
        }
    ));
    assert_eq!(ctx.disconnected(&key).await, DisconnectReason::Normal);
    assert_eq!(ctx.server.count(), 0);

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_host_disconnect_is_server_aborted() {
    let mut ctx = TestContext::new().await;
    let (mut stream, key) = ctx.connect().await;
    let conn = ctx.server.connection(&key).unwrap();

    assert!(ctx.server.disconnect(&key));
    // A second request finds the connection already closing.
    assert!(!ctx.server.disconnect(&key));

    assert_eq!(ctx.disconnected(&key).await, DisconnectReason::ServerAborted);
    assert!(read_to_close(&mut stream).await.is_empty());
    assert_eq!(conn.disconnect_reason(), Some(DisconnectReason::ServerAborted));
    assert!(!ctx.server.disconnect(&key));

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_send_to_closed_or_unknown_returns_zero() {
    let mut ctx = TestContext::new().await;
    let (_stream, key) = ctx.connect().await;
    let conn = ctx.server.connection(&key).unwrap();

    conn.disconnect(DisconnectReason::ServerAborted);
    ctx.disconnected(&key).await;

    assert!(!conn.is_live());
    assert_eq!(conn.send_bytes(b"late").await, 0);
    assert_eq!(conn.send_string("late").await, 0);
    assert_eq!(ctx.server.send_bytes(&key, b"late").await, 0);
    assert_eq!(ctx.server.send_bytes("10.0.0.1:1", b"nobody").await, 0);
    assert!(matches!(
        ctx.server.send_relay_command("10.0.0.1:1").await,
        Err(GatewayError::NotConnected(_))
    ));

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_stop_disconnects_everyone_and_is_idempotent() {
    let mut ctx = TestContext::new().await;
    let (mut first, first_key) = ctx.connect().await;
    let (mut second, second_key) = ctx.connect().await;
    assert_eq!(ctx.server.count(), 2);

    ctx.server.stop().await;

    // Collect both disconnects in whatever order the workers finished.
    let mut disconnected = Vec::new();
    while disconnected.len() < 2 {
        if let ServerEvent::Disconnected { key, reason } = ctx
            .next_event(|e| matches!(e, ServerEvent::Disconnected { .. }))
            .await
        {
            assert_eq!(reason, DisconnectReason::ServerStopped);
            disconnected.push(key);
        }
    }
    disconnected.sort();
    let mut expected = vec![first_key, second_key];
    expected.sort();
    assert_eq!(disconnected, expected);
    ctx.next_event(|e| matches!(e, ServerEvent::Stopped { .. })).await;

    assert!(read_to_close(&mut first).await.is_empty());
    assert!(read_to_close(&mut second).await.is_empty());
    assert_eq!(ctx.server.count(), 0);
    assert!(!ctx.server.is_listening());
    assert!(TcpStream::connect(ctx.addr).await.is_err());

    // Stopping again does nothing.
    ctx.server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connection_admitted_during_stop_is_closed() {
    let entered = Arc::new(AtomicBool::new(false));
    let flag = entered.clone();
    // Holds the accept loop inside admission while stop() is requested.
    let filter = move |_key: &str| {
        flag.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        true
    };
    let mut ctx = TestContext::with_parts(
        test_config(),
        Arc::new(filter),
        Arc::new(SessionDispatcher::default()),
    )
    .await;

    let mut stream = TcpStream::connect(ctx.addr).await.unwrap();
    let key = stream.local_addr().unwrap().to_string();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("filter was never consulted");

    let started = Instant::now();
    ctx.server.stop().await;

    // Closed promptly rather than left running until the grace period ends.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(ctx.disconnected(&key).await, DisconnectReason::ServerStopped);
    assert!(read_to_close(&mut stream).await.is_empty());
    assert_eq!(ctx.server.count(), 0);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let ctx = TestContext::new().await;
    ctx.server.stop().await;

    let addr = ctx.server.start().await.unwrap();
    assert!(ctx.server.is_listening());
    assert!(TcpStream::connect(addr).await.is_ok());
    assert!(matches!(
        ctx.server.start().await,
        Err(GatewayError::Internal(_))
    ));

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let ctx = TestContext::new().await;
    let mut config = test_config();
    config.port = ctx.addr.port();

    let second = GatewayServer::new(config);
    assert!(matches!(second.start().await, Err(GatewayError::Io(_))));
    assert!(!second.is_listening());

    ctx.server.stop().await;
}

struct RejectAll;

impl ConnectionFilter for RejectAll {
    fn on_connection_request(&self, _key: &str) -> bool {
        false
    }
}

#[tokio::test]
async fn test_filter_rejection_closes_socket() {
    let ctx = TestContext::with_parts(
        test_config(),
        Arc::new(RejectAll),
        Arc::new(SessionDispatcher::default()),
    )
    .await;

    let mut stream = TcpStream::connect(ctx.addr).await.unwrap();
    assert!(read_to_close(&mut stream).await.is_empty());
    assert_eq!(ctx.server.count(), 0);

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_closure_filter_sees_key() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let recorder = seen.clone();
    let filter = move |key: &str| {
        recorder.lock().push(key.to_string());
        true
    };
    let mut ctx = TestContext::with_parts(
        test_config(),
        Arc::new(filter),
        Arc::new(SessionDispatcher::default()),
    )
    .await;

    let (_stream, key) = ctx.connect().await;
    assert_eq!(*seen.lock(), vec![key]);

    ctx.server.stop().await;
}

#[tokio::test]
async fn test_max_clients_rejects_excess() {
    let mut config = test_config();
    config.max_clients = 1;
    let mut ctx = TestContext::with_config(config).await;
    let (_stream, _key) = ctx.connect().await;

    let mut extra = TcpStream::connect(ctx.addr).await.unwrap();
    assert!(read_to_close(&mut extra).await.is_empty());
    assert_eq!(ctx.server.count(), 1);

    ctx.server.stop().await;
}
