// src/core/protocol/mod.rs

//! The Guard wire protocol: framing, checksum, structural decoding and
//! response encoding. Everything here is pure and synchronous.

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod message;
pub mod tables;

pub use decoder::decode_structure;
pub use encoder::{
    encode_error_frame, encode_relay_command, encode_response, ResponseFrame,
};
pub use frame::{decode_frame, DecodedMessage, GuardFrameCodec, ProtocolVariant};
pub use message::StructuredResult;
pub use tables::{Channel, DeviceType, RelayStatus};
