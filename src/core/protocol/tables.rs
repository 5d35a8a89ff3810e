// src/core/protocol/tables.rs

//! Closed lookup tables referenced by Guard payloads. A code outside a table is
//! reported as `ProtocolError::UnknownCode`.

use crate::core::ProtocolError;
use serde::Serialize;
use strum::{Display, FromRepr};

/// Communication channel configured on a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, FromRepr)]
#[repr(u8)]
pub enum Channel {
    #[strum(to_string = "Not used")]
    NotUsed = 0x01,
    #[strum(to_string = "SIM1 -> GPRS IP primary server")]
    Sim1GprsPrimary = 0x02,
    #[strum(to_string = "SIM1 -> GPRS IP backup server")]
    Sim1GprsBackup = 0x03,
    #[strum(to_string = "SIM1 -> CSD primary modem")]
    Sim1CsdPrimary = 0x04,
    #[strum(to_string = "SIM1 -> CSD primary modem")]
    Sim1CsdPrimaryAlt = 0x05,
    #[strum(to_string = "SIM1 -> CSD backup modem")]
    Sim1CsdBackup = 0x06,
    #[strum(to_string = "SIM1 -> CSD backup modem")]
    Sim1CsdBackupAlt = 0x07,
    #[strum(to_string = "SIM2 -> GPRS IP primary server")]
    Sim2GprsPrimary = 0x08,
    #[strum(to_string = "SIM2 -> GPRS IP backup server")]
    Sim2GprsBackup = 0x09,
    #[strum(to_string = "SIM2 -> CSD primary modem")]
    Sim2CsdPrimary = 0x0a,
    #[strum(to_string = "SIM2 -> CSD primary modem")]
    Sim2CsdPrimaryAlt = 0x0b,
    #[strum(to_string = "SIM2 -> CSD backup modem")]
    Sim2CsdBackup = 0x0c,
    #[strum(to_string = "SIM2 -> CSD backup modem")]
    Sim2CsdBackupAlt = 0x0d,
    #[strum(to_string = "LAN -> IP primary server")]
    LanPrimary = 0x0e,
    #[strum(to_string = "LAN -> IP backup server")]
    LanBackup = 0x0f,
}

impl Channel {
    pub fn lookup(code: u8) -> Result<Self, ProtocolError> {
        Self::from_repr(code).ok_or(ProtocolError::UnknownCode {
            table: "channel",
            code,
        })
    }
}

/// Hardware model reported by a controller or by one of its integrated slaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, FromRepr)]
#[repr(u8)]
pub enum DeviceType {
    UnknownDevice = 0,
    #[strum(to_string = "ISTOK852")]
    Istok852 = 1,
    #[strum(to_string = "ISTOK852E")]
    Istok852E = 2,
    #[strum(to_string = "ISTOK852Pe")]
    Istok852Pe = 3,
    #[strum(to_string = "ISTOK432")]
    Istok432 = 4,
    #[strum(to_string = "SDZ")]
    Sdz = 5,
    #[strum(to_string = "ISTOK852U")]
    Istok852U = 6,
    #[strum(to_string = "ISTOK430Rs")]
    Istok430Rs = 7,
    #[strum(to_string = "ISTOK850Rs")]
    Istok850Rs = 8,
    #[strum(to_string = "ISTOK1650Rs")]
    Istok1650Rs = 9,
    #[strum(to_string = "SKZ")]
    Skz = 10,
    KipLora = 13,
    #[strum(to_string = "ISTOKDtr")]
    IstokDtr = 14,
    SkzLoraMost = 15,
    BolidS2000PP = 36,
    #[strum(to_string = "ISTOK432TM")]
    Istok432Tm = 80,
    IstokNet = 250,
    MobileButton = 254,
    OtherDevices = 255,
}

impl DeviceType {
    pub fn lookup(code: u8) -> Result<Self, ProtocolError> {
        Self::from_repr(code).ok_or(ProtocolError::UnknownCode {
            table: "device type",
            code,
        })
    }
}

/// Outcome of a relay control request, as acknowledged by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, FromRepr)]
#[repr(u8)]
pub enum RelayStatus {
    #[strum(to_string = "Request processed successfully")]
    Processed = 0x00,
    #[strum(to_string = "Relay disabled in configuration")]
    RelayDisabled = 0x01,
    #[strum(to_string = "Invalid command (bad request parameters)")]
    InvalidCommand = 0x02,
    #[strum(to_string = "No RS-485 link to the expander")]
    NoExpanderLink = 0x03,
    #[strum(to_string = "No object with this number is connected to the transmitter")]
    ObjectNotConnected = 0x04,
    #[strum(to_string = "Not supported by the expander firmware")]
    UnsupportedFirmware = 0x05,
    #[strum(to_string = "Previous control command still executing")]
    CommandInProgress = 0x06,
    #[strum(to_string = "Repeated request (same count as the previous one)")]
    RepeatedRequest = 0x07,
}

impl RelayStatus {
    pub fn lookup(code: u8) -> Result<Self, ProtocolError> {
        Self::from_repr(code).ok_or(ProtocolError::UnknownCode {
            table: "relay status",
            code,
        })
    }
}
