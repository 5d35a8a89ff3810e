// src/core/protocol/message.rs

//! Structured records produced by decoding a frame payload.

use super::tables::{Channel, DeviceType, RelayStatus};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

/// Message type codes sent by controllers.
pub mod message_type {
    pub const EVENT_LOG: u8 = 0x02;
    pub const HEARTBEAT: u8 = 0x06;
    pub const HANDSHAKE: u8 = 0x0a;
    pub const INTEGRATION_TABLE: u8 = 0x0e;
    pub const RELAY_ACK: u8 = 0x32;
    pub const ERROR: u8 = 0xff;
}

/// Acknowledgement and command codes sent by the gateway.
pub mod ack_type {
    pub const EVENT_LOG: u8 = 0x04;
    pub const HEARTBEAT: u8 = 0x08;
    pub const HANDSHAKE: u8 = 0x0c;
    pub const INTEGRATION_TABLE: u8 = 0x10;
    pub const RELAY_COMMAND: u8 = 0x30;
    pub const ERROR: u8 = 0xff;
}

/// Supervision bits shared by handshake, event and heartbeat payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PowerStatus {
    pub tamper_monitored: bool,
    pub tamper_open: bool,
    pub mains_monitored: bool,
    pub mains_failure: bool,
    pub battery_monitored: bool,
    pub battery_low: bool,
}

impl From<u8> for PowerStatus {
    fn from(bits: u8) -> Self {
        let bit = |n: u8| bits & (1 << n) != 0;
        Self {
            tamper_monitored: bit(0),
            tamper_open: bit(1),
            mains_monitored: bit(2),
            mains_failure: bit(3),
            battery_monitored: bit(4),
            battery_low: bit(5),
        }
    }
}

/// GSM signal and error levels, scaled to percent of the modem's range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SignalQuality {
    pub level_percent: u16,
    pub error_percent: u16,
}

impl SignalQuality {
    /// Level is reported on a 0..=32 scale, error rate on 0..=9.
    pub fn from_raw(level: u8, error: u8) -> Self {
        Self {
            level_percent: level as u16 * 100 / 32,
            error_percent: error as u16 * 100 / 9,
        }
    }
}

/// Supply voltage in volts, transmitted in tenths.
pub fn voltage_from_raw(raw: u8) -> f32 {
    raw as f32 / 10.0
}

/// Sent once per connection by a controller announcing itself (`0x0a`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Handshake {
    pub protocol_version: u8,
    pub firmware_version: String,
    pub controller_id: String,
    pub password: u32,
    pub buffer_size: u16,
    pub zone_count: u8,
    pub gprs_ping_secs: u16,
    pub csd_ping_secs: u16,
    pub signal: SignalQuality,
    pub voltage: f32,
    pub status: PowerStatus,
    pub reserved: u8,
    pub channels: Vec<Channel>,
    pub active_channel: Channel,
    /// Present only on new-variant frames.
    pub extension: Option<HandshakeExtension>,
}

/// Modem and hardware identity appended by new-variant handshakes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandshakeExtension {
    pub imei: String,
    pub sim1_name: String,
    pub sim2_name: String,
    pub sim1_iccid: String,
    pub sim2_iccid: String,
    pub mac_ethernet: String,
    pub mac_wifi: String,
    pub device_type: DeviceType,
    pub mcc: String,
    pub mnc: String,
    pub lac: String,
    pub cell_id: String,
    pub hardware_version: String,
}

/// One entry of the controller's event journal (`0x02`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventLog {
    pub log_number: u16,
    pub event_time: NaiveDateTime,
    pub controller_time: NaiveDateTime,
    pub rs485_address: u8,
    pub object_number: u16,
    pub format_number: u8,
    pub attribute: u8,
    pub event_code: u16,
    pub chapter: u8,
    pub zone: u8,
    pub channel: u8,
    pub signal: SignalQuality,
    pub status: PowerStatus,
    pub voltage: f32,
    pub reserved: [u8; 2],
}

/// Periodic keep-alive (`0x06`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heartbeat {
    pub signal: SignalQuality,
    pub voltage: f32,
    pub status: PowerStatus,
    pub reserved: u8,
}

/// When a slave device last had its configuration changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "time")]
pub enum ConfigTime {
    /// The slave reported no time; the decode time is substituted.
    Unset(DateTime<Utc>),
    At(DateTime<Utc>),
}

impl ConfigTime {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ConfigTime::Unset(t) | ConfigTime::At(t) => *t,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, ConfigTime::Unset(_))
    }
}

/// One slave device listed in an integration table (`0x0e`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrationRecord {
    pub address: u8,
    pub device_type: DeviceType,
    pub object_number: u16,
    pub last_config: ConfigTime,
    pub firmware_version: String,
    pub is_active: bool,
    pub is_online: bool,
    pub is_config_changed: bool,
}

/// Controller reply to a relay command (`0x32`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayAck {
    pub object_number: u16,
    pub relay_number: u8,
    pub status: RelayStatus,
}

/// The decoded payload of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum StructuredResult {
    Handshake(Box<Handshake>),
    EventLog(EventLog),
    Heartbeat(Heartbeat),
    IntegrationTable(Vec<IntegrationRecord>),
    RelayAck(RelayAck),
    /// The controller rejected a previous frame (bad CRC or length).
    Error,
}

impl StructuredResult {
    pub fn message_type(&self) -> u8 {
        match self {
            StructuredResult::Handshake(_) => message_type::HANDSHAKE,
            StructuredResult::EventLog(_) => message_type::EVENT_LOG,
            StructuredResult::Heartbeat(_) => message_type::HEARTBEAT,
            StructuredResult::IntegrationTable(_) => message_type::INTEGRATION_TABLE,
            StructuredResult::RelayAck(_) => message_type::RELAY_ACK,
            StructuredResult::Error => message_type::ERROR,
        }
    }

    pub fn controller_id(&self) -> Option<&str> {
        match self {
            StructuredResult::Handshake(h) => Some(&h.controller_id),
            _ => None,
        }
    }

    /// The object number, when the message carries a non-zero one.
    pub fn object_number(&self) -> Option<u16> {
        let number = match self {
            StructuredResult::EventLog(e) => e.object_number,
            StructuredResult::RelayAck(r) => r.object_number,
            _ => 0,
        };
        (number != 0).then_some(number)
    }

    /// The GPRS ping interval the controller promised, when non-zero.
    pub fn ping_interval_secs(&self) -> Option<u16> {
        match self {
            StructuredResult::Handshake(h) if h.gprs_ping_secs != 0 => Some(h.gprs_ping_secs),
            _ => None,
        }
    }
}
