//! sdspi-server - Card Specific Data.
//!
//! Fetches the 16-byte CSD register with CMD9 and derives the number of
//! addressable 512-byte sectors from it. Version 1 of the register (SDv1
//! and MMC) encodes capacity as a block count times a block length; version
//! 2 (SDv2 and up) is a plain multiple of 512 KiB.

use super::{cmd, proto::*, CardType, Error};
use crate::port::SdSpiPort;

/// CSD register, version 1.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub struct CsdV1 {
    /// The 16 bytes of the register, MSB first as the card sends them.
    pub data: [u8; 16],
}

impl CsdV1 {
    pub fn new() -> Self {
        CsdV1 { data: [0u8; 16] }
    }

    fn data(&self) -> &[u8; 16] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(read_bl_len, u8, 5, 0, 4);
    define_field!(device_size, u32, [(6, 0, 2), (7, 0, 8), (8, 6, 2)]);
    define_field!(device_size_multiplier, u8, [(9, 0, 2), (10, 7, 1)]);

    /// Usable card size in bytes.
    pub fn card_capacity_bytes(&self) -> u64 {
        let blocks = (self.device_size() as u64 + 1)
            << (self.device_size_multiplier() + 2);
        blocks << self.read_bl_len()
    }

    /// Usable card size in 512-byte sectors.
    pub fn sector_count(&self) -> u32 {
        (self.card_capacity_bytes() >> 9) as u32
    }
}

impl Default for CsdV1 {
    fn default() -> Self {
        Self::new()
    }
}

/// CSD register, version 2.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub struct CsdV2 {
    /// The 16 bytes of the register, MSB first as the card sends them.
    pub data: [u8; 16],
}

impl CsdV2 {
    pub fn new() -> Self {
        CsdV2 { data: [0u8; 16] }
    }

    fn data(&self) -> &[u8; 16] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(device_size, u32, [(7, 0, 6), (8, 0, 8), (9, 0, 8)]);

    /// Usable card size in bytes.
    pub fn card_capacity_bytes(&self) -> u64 {
        (self.sector_count() as u64) * 512
    }

    /// Usable card size in 512-byte sectors: (C_SIZE + 1) * 1024.
    pub fn sector_count(&self) -> u32 {
        (self.device_size() + 1) * 1024
    }
}

impl Default for CsdV2 {
    fn default() -> Self {
        Self::new()
    }
}

/// A parsed CSD of either version.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub enum Csd {
    V1(CsdV1),
    V2(CsdV2),
}

impl Csd {
    pub fn sector_count(&self) -> u32 {
        match self {
            Csd::V1(csd) => csd.sector_count(),
            Csd::V2(csd) => csd.sector_count(),
        }
    }
}

/// Fetch the CSD with CMD9 and return the card's sector count.
///
/// Returns `Ok(0)` when the card rejects CMD9 or never produces the data
/// token; the caller treats such a card as unmountable. The register's
/// version field is ignored in favour of the card type the bring-up
/// handshake already established.
pub(crate) fn read_sector_count<P: SdSpiPort>(
    port: &mut P,
    card_type: CardType,
) -> Result<u32, Error> {
    if cmd::send_cmd(port, CMD9, 0)? != R1_READY_STATE {
        return Ok(0);
    }

    // Wait for the data packet's start token, bounded like a block read.
    port.timer_on(READ_TOKEN_TIMEOUT);
    let mut token = cmd::receive(port)?;
    while token == 0xFF && port.timer_status() {
        token = cmd::receive(port)?;
    }
    port.timer_off();
    if token != DATA_START_BLOCK {
        cmd::release(port)?;
        return Ok(0);
    }

    let mut data = [0u8; 16];
    for byte in data.iter_mut() {
        *byte = cmd::receive(port)?;
    }
    // Discard the packet CRC.
    cmd::receive(port)?;
    cmd::receive(port)?;
    cmd::release(port)?;

    let csd = if card_type.contains(CardType::SD2) {
        Csd::V2(CsdV2 { data })
    } else {
        Csd::V1(CsdV1 { data })
    };
    Ok(csd.sector_count())
}
