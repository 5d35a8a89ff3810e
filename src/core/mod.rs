// src/core/mod.rs

//! The central module: the wire protocol, errors, events, metrics and the
//! state shared between the listener and connection workers.

pub mod errors;
pub mod events;
pub mod metrics;
pub mod protocol;
pub mod state;

pub use errors::{GatewayError, ProtocolError};
pub use events::{DisconnectReason, ServerEvent};
