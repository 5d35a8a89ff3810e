// src/server/initialization.rs

//! Binds the listening socket with the configured socket defaults.

use crate::config::Config;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket, lookup_host};
use tracing::{info, warn};

const LISTEN_BACKLOG: u32 = 1024;

/// Resolves the configured endpoint and binds a listener on it.
///
/// Buffer sizes are set on the listening socket so accepted sockets inherit them.
pub async fn bind_listener(config: &Config) -> io::Result<TcpListener> {
    let addr = resolve(&config.listen_addr()).await?;
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    set_buffer_size(config.socket.recv_buffer_size, |n| socket.set_recv_buffer_size(n));
    set_buffer_size(config.socket.send_buffer_size, |n| socket.set_send_buffer_size(n));
    socket.bind(addr)?;
    let listener = socket.listen(LISTEN_BACKLOG)?;
    info!("Guard gateway listening on {}", listener.local_addr()?);
    Ok(listener)
}

async fn resolve(endpoint: &str) -> io::Result<SocketAddr> {
    lookup_host(endpoint).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("'{endpoint}' did not resolve to any address"),
        )
    })
}

fn set_buffer_size(size: usize, apply: impl FnOnce(u32) -> io::Result<()>) {
    let size = u32::try_from(size).unwrap_or(u32::MAX);
    if let Err(e) = apply(size) {
        warn!("Could not set socket buffer size to {}: {}", size, e);
    }
}

/// Logs the effective configuration once at startup.
pub fn log_startup_info(config: &Config) {
    info!(
        "Idle timeout {}s, socket buffers {}/{} bytes, no-delay {}.",
        config.keep_alive_secs,
        config.socket.recv_buffer_size,
        config.socket.send_buffer_size,
        config.socket.no_delay
    );
    if config.protocol.verify_checksum {
        info!("Frames with a bad checksum will be rejected.");
    } else {
        info!("Frame checksums are checked but only logged on mismatch.");
    }
    if !config.load_balancer_brokers.is_empty() {
        info!(
            "{} load balancer broker(s) configured (not used by this build).",
            config.load_balancer_brokers.len()
        );
    }
}
