// src/server/context.rs

use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Holds everything needed to stop a running listener.
pub(crate) struct ServerContext {
    pub endpoint: SocketAddr,
    /// Cancels the accept loop.
    pub shutdown: CancellationToken,
    pub accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}
