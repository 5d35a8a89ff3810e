// src/core/errors.rs

//! Defines the error types shared by the codec, the connection layer and the server.

use std::sync::Arc;
use thiserror::Error;

/// Failures raised while turning received bytes into frames and structured messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("truncated {context}: need {needed} bytes, got {actual}")]
    Truncated {
        context: &'static str,
        needed: usize,
        actual: usize,
    },

    #[error("declared length {declared} does not match {actual} bytes received")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("checksum mismatch: frame carries {received:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { received: u16, computed: u16 },

    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    #[error("unknown {table} code {code:#04x}")]
    UnknownCode { table: &'static str, code: u8 },

    #[error("invalid {context} timestamp")]
    InvalidTimestamp { context: &'static str },
}

impl ProtocolError {
    /// Shorthand for the most common failure: a slice shorter than its layout.
    pub(crate) fn truncated(context: &'static str, needed: usize, actual: usize) -> Self {
        ProtocolError::Truncated {
            context,
            needed,
            actual,
        }
    }
}

/// The main error enum for the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Protocol Error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Connection {0} is not connected")]
    NotConnected(String),

    #[error("Peer {0} closed the connection")]
    PeerClosed(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// `std::io::Error` is not cloneable, so it lives behind an Arc.
impl Clone for GatewayError {
    fn clone(&self) -> Self {
        match self {
            GatewayError::Io(e) => GatewayError::Io(Arc::clone(e)),
            GatewayError::Protocol(e) => GatewayError::Protocol(e.clone()),
            GatewayError::NotConnected(s) => GatewayError::NotConnected(s.clone()),
            GatewayError::PeerClosed(s) => GatewayError::PeerClosed(s.clone()),
            GatewayError::Internal(s) => GatewayError::Internal(s.clone()),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("JSON serialization failed: {e}"))
    }
}
