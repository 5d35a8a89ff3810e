// src/connection/session.rs

//! Defines the metadata kept for the controller behind a connection.

use crate::core::protocol::{ProtocolVariant, StructuredResult};
use serde::Serialize;

/// Extra seconds granted on top of the controller's own ping interval.
pub const PING_GRACE_SECS: u64 = 30;

/// What the gateway has learned about the device on a connection.
///
/// Created on the first successfully decoded frame and dropped with the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSession {
    /// Dotted four-byte identifier from the handshake.
    pub controller_id: Option<String>,
    pub object_number: Option<u16>,
    /// The GPRS ping interval promised in the handshake.
    pub ping_interval_secs: Option<u16>,
    /// Header shape of the last frame received from the device.
    pub variant: ProtocolVariant,
}

impl DeviceSession {
    pub(crate) fn new(variant: ProtocolVariant) -> Self {
        Self {
            controller_id: None,
            object_number: None,
            ping_interval_secs: None,
            variant,
        }
    }

    /// Merges the fields `result` carries; absent fields keep their value.
    pub(crate) fn update(&mut self, variant: ProtocolVariant, result: &StructuredResult) {
        self.variant = variant;
        if let Some(id) = result.controller_id() {
            self.controller_id = Some(id.to_string());
        }
        if let Some(number) = result.object_number() {
            self.object_number = Some(number);
        }
        if let Some(ping) = result.ping_interval_secs() {
            self.ping_interval_secs = Some(ping);
        }
    }

    /// The idle timeout implied by the device's ping interval, if it sent one.
    pub fn idle_timeout_secs(&self) -> Option<u64> {
        self.ping_interval_secs
            .map(|ping| ping as u64 + PING_GRACE_SECS)
    }
}
