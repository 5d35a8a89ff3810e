// src/core/protocol/checksum.rs

//! The frame checksum: a reflected CRC-16 (polynomial 0xA001, seed 0xFFFF,
//! no final xor), always computed with the two checksum bytes zeroed.

use crc::{CRC_16_MODBUS, Crc};

/// Reflected 0x8005 (0xA001), init 0xFFFF, xorout 0.
const CRC16_ALGO: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Number of checksum bytes at the front of a frame body.
pub const CHECKSUM_LEN: usize = 2;

/// Computes the CRC over `bytes` exactly as given.
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC16_ALGO.checksum(bytes)
}

/// Computes the CRC of a frame body (everything after the length prefix),
/// treating its first two bytes as zero regardless of their content.
pub fn body_checksum(body: &[u8]) -> u16 {
    let mut digest = CRC16_ALGO.digest();
    let zeroed = body.len().min(CHECKSUM_LEN);
    digest.update(&[0u8; CHECKSUM_LEN][..zeroed]);
    if body.len() > CHECKSUM_LEN {
        digest.update(&body[CHECKSUM_LEN..]);
    }
    digest.finalize()
}

/// Writes `crc` into the first two bytes of `body`, low byte first.
pub fn write_checksum(body: &mut [u8], crc: u16) {
    body[..CHECKSUM_LEN].copy_from_slice(&crc.to_le_bytes());
}

/// Reads the checksum embedded in the first two bytes of `body`.
pub fn read_checksum(body: &[u8]) -> Option<u16> {
    match body {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}
