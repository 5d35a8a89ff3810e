// src/core/protocol/frame.rs

//! Frame envelope handling: variant detection, header extraction and the
//! `tokio_util` decoder that treats one received chunk as one frame.

use super::checksum::{self, CHECKSUM_LEN};
use crate::core::{GatewayError, ProtocolError};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Bytes following the length prefix before the payload starts:
/// checksum (2) + sequence counter (2) + message type (1).
pub const ENVELOPE_LEN: usize = CHECKSUM_LEN + 2 + 1;

/// The two incompatible header shapes spoken by Guard controllers.
///
/// Nothing on the wire names the variant. A frame is `Legacy` when its first
/// byte equals the number of bytes that follow it; otherwise it carries a
/// two-byte big-endian length and is `New`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProtocolVariant {
    Legacy,
    New,
}

impl ProtocolVariant {
    /// Classifies a raw buffer. Returns `None` for an empty buffer.
    pub fn detect(buf: &[u8]) -> Option<Self> {
        let (&first, rest) = buf.split_first()?;
        if first as usize == rest.len() {
            Some(ProtocolVariant::Legacy)
        } else {
            Some(ProtocolVariant::New)
        }
    }

    pub fn from_is_new(is_new: bool) -> Self {
        if is_new {
            ProtocolVariant::New
        } else {
            ProtocolVariant::Legacy
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, ProtocolVariant::New)
    }

    /// Width of the length prefix in bytes.
    pub fn prefix_len(self) -> usize {
        match self {
            ProtocolVariant::Legacy => 1,
            ProtocolVariant::New => 2,
        }
    }

    /// Smallest possible frame: length prefix plus an empty-payload envelope.
    pub fn min_frame_len(self) -> usize {
        self.prefix_len() + ENVELOPE_LEN
    }

    /// Appends the length prefix for a body of `body_len` bytes.
    pub fn put_length_prefix(self, body_len: usize, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match self {
            ProtocolVariant::Legacy => {
                let len = u8::try_from(body_len).map_err(|_| ProtocolError::LengthMismatch {
                    declared: body_len,
                    actual: u8::MAX as usize,
                })?;
                dst.put_u8(len);
            }
            ProtocolVariant::New => {
                let len = u16::try_from(body_len).map_err(|_| ProtocolError::LengthMismatch {
                    declared: body_len,
                    actual: u16::MAX as usize,
                })?;
                dst.put_u16(len);
            }
        }
        Ok(())
    }
}

/// The envelope of one received frame, with the payload left undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub variant: ProtocolVariant,
    pub sequence: i16,
    pub message_type: u8,
    pub payload: Bytes,
    /// Checksum carried by the frame.
    pub checksum: u16,
    /// Checksum recomputed over the body with the checksum bytes zeroed.
    pub computed_checksum: u16,
}

impl DecodedMessage {
    pub fn is_new_protocol(&self) -> bool {
        self.variant.is_new()
    }

    pub fn checksum_matches(&self) -> bool {
        self.checksum == self.computed_checksum
    }
}

/// Splits one frame into its envelope fields.
///
/// `frame` must hold exactly one frame; bytes are never carried over between calls.
pub fn decode_frame(frame: Bytes) -> Result<DecodedMessage, ProtocolError> {
    let variant = ProtocolVariant::detect(&frame).ok_or(ProtocolError::Empty)?;
    let min = variant.min_frame_len();
    if frame.len() < min {
        return Err(ProtocolError::truncated("frame header", min, frame.len()));
    }

    let prefix = variant.prefix_len();
    if variant.is_new() {
        let declared = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        let actual = frame.len() - prefix;
        if declared != actual {
            return Err(ProtocolError::LengthMismatch { declared, actual });
        }
    }

    let body = &frame[prefix..];
    let checksum = checksum::read_checksum(body).unwrap_or_default();
    let computed_checksum = checksum::body_checksum(body);

    let seq_at = prefix + CHECKSUM_LEN;
    let sequence = i16::from_be_bytes([frame[seq_at], frame[seq_at + 1]]);
    let message_type = frame[seq_at + 2];
    let payload = frame.slice(prefix + ENVELOPE_LEN..);

    Ok(DecodedMessage {
        variant,
        sequence,
        message_type,
        payload,
        checksum,
        computed_checksum,
    })
}

/// The codec for Guard frames.
///
/// Decoding consumes the whole buffer as a single frame; there is no
/// reassembly of frames split across reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuardFrameCodec {
    /// Reject frames whose embedded checksum does not match instead of only logging.
    pub verify_checksum: bool,
}

impl GuardFrameCodec {
    pub fn new(verify_checksum: bool) -> Self {
        Self { verify_checksum }
    }

    /// Decodes one received chunk, applying the checksum policy.
    pub fn decode_chunk(&self, chunk: Bytes) -> Result<DecodedMessage, ProtocolError> {
        let message = decode_frame(chunk)?;
        if !message.checksum_matches() {
            if self.verify_checksum {
                return Err(ProtocolError::ChecksumMismatch {
                    received: message.checksum,
                    computed: message.computed_checksum,
                });
            }
            warn!(
                "Checksum mismatch on frame type {:#04x} (seq {}): carried {:#06x}, computed {:#06x}",
                message.message_type, message.sequence, message.checksum, message.computed_checksum
            );
        }
        Ok(message)
    }
}

impl Decoder for GuardFrameCodec {
    type Item = DecodedMessage;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let chunk = src.split_to(src.len()).freeze();
        Ok(Some(self.decode_chunk(chunk)?))
    }
}
