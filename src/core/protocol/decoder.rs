// src/core/protocol/decoder.rs

//! Structural decoding: turns the payload of a `DecodedMessage` into a typed
//! `StructuredResult` according to its message type.

use super::frame::{DecodedMessage, ProtocolVariant};
use super::message::{
    message_type, ConfigTime, EventLog, Handshake, HandshakeExtension, Heartbeat,
    IntegrationRecord, PowerStatus, RelayAck, SignalQuality, StructuredResult, voltage_from_raw,
};
use super::tables::{Channel, DeviceType, RelayStatus};
use crate::core::ProtocolError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const EVENT_LOG_LEN: usize = 30;
const HEARTBEAT_LEN: usize = 5;
const RELAY_ACK_LEN: usize = 4;
const CHANNEL_SLOTS: usize = 12;

/// Size of one slave record in an integration table.
pub const INTEGRATION_RECORD_LEN: usize = 12;

/// Decodes the payload of `message` into its typed record.
pub fn decode_structure(message: &DecodedMessage) -> Result<StructuredResult, ProtocolError> {
    let payload = &message.payload[..];
    match message.message_type {
        message_type::HANDSHAKE => {
            decode_handshake(payload, message.variant).map(|h| StructuredResult::Handshake(Box::new(h)))
        }
        message_type::EVENT_LOG => decode_event_log(payload).map(StructuredResult::EventLog),
        message_type::HEARTBEAT => decode_heartbeat(payload).map(StructuredResult::Heartbeat),
        message_type::INTEGRATION_TABLE => {
            decode_integration_table(payload, Utc::now()).map(StructuredResult::IntegrationTable)
        }
        message_type::RELAY_ACK => decode_relay_ack(payload).map(StructuredResult::RelayAck),
        message_type::ERROR => Ok(StructuredResult::Error),
        other => Err(ProtocolError::UnknownMessageType(other)),
    }
}

fn require(payload: &[u8], needed: usize, context: &'static str) -> Result<(), ProtocolError> {
    if payload.len() < needed {
        return Err(ProtocolError::truncated(context, needed, payload.len()));
    }
    Ok(())
}

fn be_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([bytes[at], bytes[at + 1]])
}

/// Big-endian unsigned integer of up to four bytes.
fn be_uint(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

/// ASCII text padded with NULs or spaces.
fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == '\0' || c.is_ascii_whitespace())
        .to_string()
}

fn mac_address(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn dotted(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| b.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Offsets of the handshake fields that move with the protocol variant.
///
/// New-variant frames widen the password to four bytes, pushing every
/// following field one byte further.
struct HandshakeLayout {
    password: std::ops::Range<usize>,
    buffer_size: usize,
    zone_count: usize,
    gprs_ping: usize,
    csd_ping: usize,
    gsm_level: usize,
    gsm_error: usize,
    voltage: usize,
    status: usize,
    reserved: usize,
    active_channel: usize,
    channels: usize,
    min_len: usize,
}

impl HandshakeLayout {
    fn for_variant(variant: ProtocolVariant) -> Self {
        let s = usize::from(variant.is_new());
        Self {
            password: 7..10 + s,
            buffer_size: 10 + s,
            zone_count: 12 + s,
            gprs_ping: 13 + s,
            csd_ping: 15 + s,
            gsm_level: 17 + s,
            gsm_error: 18 + s,
            voltage: 19 + s,
            status: 20 + s,
            reserved: 21 + s,
            active_channel: 22 + s,
            channels: 23 + s,
            min_len: if variant.is_new() { 151 } else { 35 },
        }
    }
}

fn decode_handshake(p: &[u8], variant: ProtocolVariant) -> Result<Handshake, ProtocolError> {
    let layout = HandshakeLayout::for_variant(variant);
    require(p, layout.min_len, "handshake")?;

    let channels = p[layout.channels..layout.channels + CHANNEL_SLOTS]
        .iter()
        .map(|&code| Channel::lookup(code))
        .collect::<Result<Vec<_>, _>>()?;

    // The active channel is a 1-based index into the channel list.
    let active_index = p[layout.active_channel];
    let active_channel = (active_index as usize)
        .checked_sub(1)
        .and_then(|i| channels.get(i))
        .copied()
        .ok_or(ProtocolError::UnknownCode {
            table: "active channel",
            code: active_index,
        })?;

    let extension = if variant.is_new() {
        Some(decode_handshake_extension(p)?)
    } else {
        None
    };

    Ok(Handshake {
        protocol_version: p[0],
        firmware_version: dotted(&p[1..3]),
        controller_id: dotted(&p[3..7]),
        password: be_uint(&p[layout.password]),
        buffer_size: be_u16(p, layout.buffer_size),
        zone_count: p[layout.zone_count],
        gprs_ping_secs: be_u16(p, layout.gprs_ping),
        csd_ping_secs: be_u16(p, layout.csd_ping),
        signal: SignalQuality::from_raw(p[layout.gsm_level], p[layout.gsm_error]),
        voltage: voltage_from_raw(p[layout.voltage]),
        status: PowerStatus::from(p[layout.status]),
        reserved: p[layout.reserved],
        channels,
        active_channel,
        extension,
    })
}

fn decode_handshake_extension(p: &[u8]) -> Result<HandshakeExtension, ProtocolError> {
    Ok(HandshakeExtension {
        imei: ascii_field(&p[36..51]),
        sim1_name: ascii_field(&p[51..67]),
        sim2_name: ascii_field(&p[67..83]),
        sim1_iccid: ascii_field(&p[83..103]),
        sim2_iccid: ascii_field(&p[103..123]),
        mac_ethernet: mac_address(&p[123..129]),
        mac_wifi: mac_address(&p[129..135]),
        device_type: DeviceType::lookup(p[135])?,
        mcc: ascii_field(&p[136..139]),
        mnc: ascii_field(&p[139..141]),
        lac: ascii_field(&p[141..145]),
        cell_id: ascii_field(&p[145..149]),
        hardware_version: dotted(&p[149..151]),
    })
}

/// Day, month, two-digit year (offset from 2000), hour, minute, second.
fn timestamp(bytes: &[u8], context: &'static str) -> Result<NaiveDateTime, ProtocolError> {
    let [day, month, year, hour, minute, second] = bytes else {
        return Err(ProtocolError::truncated(context, 6, bytes.len()));
    };
    NaiveDate::from_ymd_opt(2000 + *year as i32, *month as u32, *day as u32)
        .and_then(|d| d.and_hms_opt(*hour as u32, *minute as u32, *second as u32))
        .ok_or(ProtocolError::InvalidTimestamp { context })
}

fn decode_event_log(p: &[u8]) -> Result<EventLog, ProtocolError> {
    require(p, EVENT_LOG_LEN, "event log")?;
    Ok(EventLog {
        log_number: be_u16(p, 0),
        event_time: timestamp(&p[2..8], "event")?,
        controller_time: timestamp(&p[8..14], "controller")?,
        rs485_address: p[14],
        object_number: be_u16(p, 15),
        format_number: p[17],
        attribute: p[18],
        event_code: be_u16(p, 19),
        chapter: p[21],
        zone: p[22],
        channel: p[23],
        signal: SignalQuality::from_raw(p[24], p[25]),
        status: PowerStatus::from(p[26]),
        voltage: voltage_from_raw(p[27]),
        reserved: [p[28], p[29]],
    })
}

fn decode_heartbeat(p: &[u8]) -> Result<Heartbeat, ProtocolError> {
    require(p, HEARTBEAT_LEN, "heartbeat")?;
    Ok(Heartbeat {
        signal: SignalQuality::from_raw(p[0], p[1]),
        voltage: voltage_from_raw(p[2]),
        status: PowerStatus::from(p[3]),
        reserved: p[4],
    })
}

/// Decodes consecutive slave records. A trailing partial record is ignored.
fn decode_integration_table(
    p: &[u8],
    now: DateTime<Utc>,
) -> Result<Vec<IntegrationRecord>, ProtocolError> {
    p.chunks_exact(INTEGRATION_RECORD_LEN)
        .map(|r| decode_integration_record(r, now))
        .collect()
}

fn decode_integration_record(
    r: &[u8],
    now: DateTime<Utc>,
) -> Result<IntegrationRecord, ProtocolError> {
    let raw_time = &r[4..8];
    let last_config = if raw_time.iter().all(|&b| b == 0xFF) {
        ConfigTime::Unset(now)
    } else {
        let secs = be_uint(raw_time) as i64;
        DateTime::from_timestamp(secs, 0)
            .map(ConfigTime::At)
            .ok_or(ProtocolError::InvalidTimestamp {
                context: "integration record",
            })?
    };
    let flags = be_u16(r, 10);

    Ok(IntegrationRecord {
        address: r[0],
        device_type: DeviceType::lookup(r[1])?,
        object_number: be_u16(r, 2),
        last_config,
        firmware_version: dotted(&r[8..10]),
        is_active: r[0] & 0x80 == 0,
        is_online: flags & 0x0001 != 0,
        is_config_changed: flags & 0x0004 != 0,
    })
}

fn decode_relay_ack(p: &[u8]) -> Result<RelayAck, ProtocolError> {
    require(p, RELAY_ACK_LEN, "relay ack")?;
    Ok(RelayAck {
        object_number: be_u16(p, 0),
        relay_number: p[2],
        status: RelayStatus::lookup(p[3])?,
    })
}
