// src/server/connection_loop.rs

//! Contains the accept loop that turns sockets into registered connections,
//! and the bounded wait for connection workers when the loop is cancelled.

use crate::connection::{ClientConnection, ConnectionHandler};
use crate::core::events::{DisconnectReason, ServerEvent};
use crate::core::metrics;
use crate::core::state::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Accepts connections until `shutdown` is cancelled, then waits up to the
/// configured grace period for connection workers before aborting them.
pub async fn run(listener: TcpListener, state: Arc<ServerState>, shutdown: CancellationToken) {
    let mut client_tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Accept loop cancelled.");
                break;
            }

            res = listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        if let Some(handler) = admit(socket, addr, &state) {
                            client_tasks.spawn(handler.run());
                        }
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A connection handler panicked: {e:?}");
                }
            }
        }
    }

    // Stop listening before waiting on the workers. A socket admitted while
    // the stop request was in flight is closed here with everyone else.
    drop(listener);
    state.disconnect_all(DisconnectReason::ServerStopped);

    let grace = state.config.shutdown_grace();
    if tokio::time::timeout(grace, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!(
            "{} connection worker(s) still running after {:?}; aborting them.",
            client_tasks.len(),
            grace
        );
        client_tasks.shutdown().await;
    }
    debug!("All connection workers finished.");
}

/// Vets an accepted socket and, if admitted, registers it and returns its worker.
fn admit(
    socket: TcpStream,
    addr: SocketAddr,
    state: &Arc<ServerState>,
) -> Option<ConnectionHandler> {
    let key = addr.to_string();

    if state.clients.len() >= state.config.max_clients {
        warn!("Rejecting {}: max_clients ({}) reached.", key, state.config.max_clients);
        metrics::CONNECTIONS_REJECTED_TOTAL.inc();
        return None;
    }
    if !state.filter.on_connection_request(&key) {
        debug!("Connection request from {} rejected by filter.", key);
        metrics::CONNECTIONS_REJECTED_TOTAL.inc();
        return None;
    }

    let socket_config = &state.config.socket;
    if let Err(e) = socket.set_nodelay(socket_config.no_delay) {
        warn!("Failed to set TCP_NODELAY for {}: {}", key, e);
    }

    let (reader, writer) = socket.into_split();
    let conn = Arc::new(ClientConnection::new(
        addr,
        writer,
        state.default_idle_timeout(),
        socket_config.send_timeout(),
        state.stats.clone(),
    ));
    if let Some(stale) = state.clients.insert(key.clone(), conn.clone()) {
        debug!("Replaced a stale registry entry for {}.", stale.key());
    }

    state.stats.increment_total_connections();
    metrics::CONNECTIONS_ACCEPTED_TOTAL.inc();
    metrics::CONNECTED_DEVICES.inc();

    // Loopback connects are typically health checks.
    if addr.ip().is_loopback() {
        debug!("Accepted new connection from: {}", addr);
    } else {
        info!("Accepted new connection from: {}", addr);
    }
    state.publish(ServerEvent::Connected { key, remote: addr });

    Some(ConnectionHandler::new(conn, reader, state.clone()))
}
