// src/core/metrics.rs

//! Defines and registers Prometheus metrics for gateway monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};

lazy_static! {
    // --- Gauges ---
    /// The number of controllers currently connected.
    pub static ref CONNECTED_DEVICES: Gauge =
        register_gauge!("guard_gateway_connected_devices", "Number of currently connected devices.").unwrap();

    // --- Connection Counters ---
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_ACCEPTED_TOTAL: Counter =
        register_counter!("guard_gateway_connections_accepted_total", "Total number of connections accepted.").unwrap();
    /// Connections refused by the connection filter or the client limit.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("guard_gateway_connections_rejected_total", "Total number of connections rejected before a session was created.").unwrap();
    /// Closed connections, labeled by disconnect reason.
    pub static ref DISCONNECTS_TOTAL: CounterVec =
        register_counter_vec!("guard_gateway_disconnects_total", "Total number of closed connections, labeled by reason.", &["reason"]).unwrap();

    // --- Traffic Counters ---
    pub static ref BYTES_RECEIVED_TOTAL: Counter =
        register_counter!("guard_gateway_bytes_received_total", "Total bytes read from devices.").unwrap();
    pub static ref BYTES_SENT_TOTAL: Counter =
        register_counter!("guard_gateway_bytes_sent_total", "Total bytes written to devices.").unwrap();

    // --- Protocol Counters ---
    /// Successfully decoded frames, labeled by message type.
    pub static ref FRAMES_DECODED_TOTAL: CounterVec =
        register_counter_vec!("guard_gateway_frames_decoded_total", "Total frames decoded, labeled by message type.", &["type"]).unwrap();
    /// Frames that failed envelope or structural decoding.
    pub static ref PROTOCOL_ERRORS_TOTAL: Counter =
        register_counter!("guard_gateway_protocol_errors_total", "Total number of frames rejected by the protocol decoder.").unwrap();
}

/// Human-readable label for a message type code.
pub fn message_type_label(code: u8) -> &'static str {
    use crate::core::protocol::message::message_type;
    match code {
        message_type::HANDSHAKE => "handshake",
        message_type::EVENT_LOG => "event_log",
        message_type::HEARTBEAT => "heartbeat",
        message_type::INTEGRATION_TABLE => "integration_table",
        message_type::RELAY_ACK => "relay_ack",
        message_type::ERROR => "error",
        _ => "unknown",
    }
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
