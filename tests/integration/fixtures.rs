// tests/integration/fixtures.rs

//! Frame and payload builders shared by the integration and property tests.
//!
//! Payload layouts mirror what Guard controllers send on the wire.

use guard_gateway::core::protocol::ProtocolVariant;
use guard_gateway::core::protocol::checksum;

pub const HANDSHAKE: u8 = 0x0a;
pub const EVENT_LOG: u8 = 0x02;
pub const HEARTBEAT: u8 = 0x06;
pub const INTEGRATION_TABLE: u8 = 0x0e;

/// Builds a complete frame with a valid checksum.
pub fn frame(variant: ProtocolVariant, sequence: i16, message_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0u8, 0u8];
    body.extend_from_slice(&sequence.to_be_bytes());
    body.push(message_type);
    body.extend_from_slice(payload);
    let crc = checksum::body_checksum(&body);
    checksum::write_checksum(&mut body, crc);

    let mut out = match variant {
        ProtocolVariant::Legacy => vec![u8::try_from(body.len()).expect("legacy body fits a byte")],
        ProtocolVariant::New => u16::try_from(body.len())
            .expect("new body fits two bytes")
            .to_be_bytes()
            .to_vec(),
    };
    out.extend_from_slice(&body);
    out
}

pub fn legacy_frame(sequence: i16, message_type: u8, payload: &[u8]) -> Vec<u8> {
    frame(ProtocolVariant::Legacy, sequence, message_type, payload)
}

pub fn new_frame(sequence: i16, message_type: u8, payload: &[u8]) -> Vec<u8> {
    frame(ProtocolVariant::New, sequence, message_type, payload)
}

/// A 35-byte legacy handshake from controller `10.0.1.77` with the given GPRS ping.
pub fn legacy_handshake_payload(gprs_ping_secs: u16) -> Vec<u8> {
    let mut p = vec![0u8; 35];
    p[0] = 3;
    p[1..3].copy_from_slice(&[2, 14]);
    p[3..7].copy_from_slice(&[10, 0, 1, 77]);
    p[7..10].copy_from_slice(&[0x01, 0x02, 0x03]);
    p[10..12].copy_from_slice(&512u16.to_be_bytes());
    p[12] = 8;
    p[13..15].copy_from_slice(&gprs_ping_secs.to_be_bytes());
    p[15..17].copy_from_slice(&600u16.to_be_bytes());
    p[17] = 32;
    p[19] = 124;
    p[20] = 0b0000_0101;
    // Active channel is the second slot, which is LAN primary.
    p[22] = 2;
    p[23..35].fill(0x01);
    p[24] = 0x0e;
    p
}

/// A 151-byte new-variant handshake carrying `password` and the extension block.
pub fn new_handshake_payload(gprs_ping_secs: u16, password: [u8; 4]) -> Vec<u8> {
    let legacy = legacy_handshake_payload(gprs_ping_secs);
    let mut p = vec![0u8; 151];
    p[..7].copy_from_slice(&legacy[..7]);
    p[7..11].copy_from_slice(&password);
    p[11..36].copy_from_slice(&legacy[10..35]);
    p[36..51].copy_from_slice(b"356938035643809");
    p[123..129].copy_from_slice(&[0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E]);
    p[135] = 80;
    p[136..139].copy_from_slice(b"250");
    p[139..141].copy_from_slice(b"01");
    p[149] = 1;
    p[150] = 3;
    p
}

/// A 30-byte event log record for `object_number`.
pub fn event_log_payload(log_number: u16, object_number: u16) -> Vec<u8> {
    let mut p = vec![0u8; 30];
    p[0..2].copy_from_slice(&log_number.to_be_bytes());
    p[2..8].copy_from_slice(&[15, 3, 24, 10, 30, 0]);
    p[8..14].copy_from_slice(&[15, 3, 24, 10, 30, 5]);
    p[14] = 1;
    p[15..17].copy_from_slice(&object_number.to_be_bytes());
    p[19..21].copy_from_slice(&1130u16.to_be_bytes());
    p[22] = 4;
    p[24] = 20;
    p[27] = 120;
    p
}

/// A 5-byte heartbeat.
pub fn heartbeat_payload() -> Vec<u8> {
    vec![24, 1, 123, 0b0000_0011, 0]
}
