// src/core/protocol/encoder.rs

//! Builds outgoing frames: acknowledgements for received messages and the
//! frames the gateway sends on its own initiative.

use super::checksum::{self, CHECKSUM_LEN};
use super::frame::{DecodedMessage, GuardFrameCodec, ProtocolVariant, ENVELOPE_LEN};
use super::message::{ack_type, message_type};
use crate::core::GatewayError;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use tokio_util::codec::Encoder;

/// Number of zero bytes carried by a relay command.
const RELAY_COMMAND_DATA_LEN: usize = 6;

/// An outgoing frame before the checksum and length prefix are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub variant: ProtocolVariant,
    pub sequence: i16,
    pub ack: u8,
    pub data: Bytes,
}

impl ResponseFrame {
    /// A convenience method to encode a frame into a single buffer.
    pub fn encode_to_bytes(&self) -> Result<Bytes, GatewayError> {
        let mut buf = BytesMut::with_capacity(self.variant.min_frame_len() + self.data.len());
        GuardFrameCodec::default().encode(self.clone(), &mut buf)?;
        Ok(buf.freeze())
    }
}

impl Encoder<ResponseFrame> for GuardFrameCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: ResponseFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::with_capacity(ENVELOPE_LEN + item.data.len());
        body.put_bytes(0, CHECKSUM_LEN);
        body.put_i16(item.sequence);
        body.put_u8(item.ack);
        body.extend_from_slice(&item.data);

        let crc = checksum::crc16(&body);
        checksum::write_checksum(&mut body, crc);

        item.variant.put_length_prefix(body.len(), dst)?;
        dst.extend_from_slice(&body);
        Ok(())
    }
}

/// Builds the acknowledgement for a received message, if its type has one.
pub fn encode_response(message: &DecodedMessage) -> Result<Option<Bytes>, GatewayError> {
    encode_response_at(message, Local::now().naive_local())
}

/// Same as [`encode_response`] with an explicit clock for the handshake reply.
pub fn encode_response_at(
    message: &DecodedMessage,
    now: NaiveDateTime,
) -> Result<Option<Bytes>, GatewayError> {
    let (ack, sequence, data) = match message.message_type {
        message_type::HANDSHAKE => {
            let mut data = BytesMut::with_capacity(10);
            data.extend_from_slice(&clock_bytes(now));
            // New-variant controllers expect their password echoed back.
            if message.is_new_protocol() {
                if let Some(password) = message.payload.get(7..11) {
                    data.extend_from_slice(password);
                }
            }
            (ack_type::HANDSHAKE, message.sequence, data.freeze())
        }
        message_type::EVENT_LOG => {
            let log_number = message.payload.slice(..message.payload.len().min(2));
            (ack_type::EVENT_LOG, message.sequence, log_number)
        }
        message_type::HEARTBEAT => (ack_type::HEARTBEAT, message.sequence, Bytes::new()),
        message_type::INTEGRATION_TABLE => {
            (ack_type::INTEGRATION_TABLE, message.sequence, Bytes::new())
        }
        message_type::ERROR => (ack_type::ERROR, 0, Bytes::new()),
        _ => return Ok(None),
    };

    let frame = ResponseFrame {
        variant: message.variant,
        sequence,
        ack,
        data,
    };
    frame.encode_to_bytes().map(Some)
}

/// A standalone `0xff` error frame, sent before dropping a misbehaving device.
pub fn encode_error_frame(variant: ProtocolVariant) -> Result<Bytes, GatewayError> {
    ResponseFrame {
        variant,
        sequence: 0,
        ack: ack_type::ERROR,
        data: Bytes::new(),
    }
    .encode_to_bytes()
}

/// The server-initiated relay command (`0x30`).
pub fn encode_relay_command(variant: ProtocolVariant) -> Result<Bytes, GatewayError> {
    ResponseFrame {
        variant,
        sequence: 0,
        ack: ack_type::RELAY_COMMAND,
        data: Bytes::from_static(&[0u8; RELAY_COMMAND_DATA_LEN]),
    }
    .encode_to_bytes()
}

fn clock_bytes(now: NaiveDateTime) -> [u8; 6] {
    [
        now.day() as u8,
        now.month() as u8,
        (now.year() - 2000) as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    ]
}
