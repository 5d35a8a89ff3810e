// src/connection/mod.rs

//! Manages the lifecycle of a single device TCP connection: the shared
//! connection handle, its receive loop, cleanup, and the protocol dispatcher
//! that consumes what it reads.

mod client;
mod dispatcher;
mod guard;
mod handler;
mod session;

pub use client::{ClientConnection, ConnectionState};
pub use dispatcher::{PING_REQUEST, PING_REPLY, PayloadHandler, SessionDispatcher};
pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use session::{DeviceSession, PING_GRACE_SECS};
