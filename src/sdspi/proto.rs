//! sdspi-server - SD protocol constants.
//!
//! Command indices, response bits, data tokens and the fixed timeouts of
//! the SD Physical Layer spec v2, as used over SPI.

/// CMD0: software reset, enter idle state.
pub const CMD0: u8 = 0;
/// CMD1: legacy (MMC) initiate initialization.
pub const CMD1: u8 = 1;
/// CMD8: send interface condition (voltage check, SDv2 detection).
pub const CMD8: u8 = 8;
/// CMD9: read the CSD register.
pub const CMD9: u8 = 9;
/// CMD16: set the read/write block length.
pub const CMD16: u8 = 16;
/// CMD17: read a single block.
pub const CMD17: u8 = 17;
/// CMD24: write a single block.
pub const CMD24: u8 = 24;
/// CMD55: escape for an application-specific command.
pub const CMD55: u8 = 55;
/// CMD58: read the OCR register.
pub const CMD58: u8 = 58;
/// CMD59: turn CRC checking on or off.
pub const CMD59: u8 = 59;

/// Marker bit for application commands: `ACMDn` is sent as CMD55 then CMDn.
pub const APP_CMD: u8 = 0x80;
/// ACMD41: send operating condition, begin initialization.
pub const ACMD41: u8 = APP_CMD | 41;

/// CMD8 argument: 2.7-3.6 V range plus the `0xAA` check pattern.
pub const CMD8_ARG_VHS: u32 = 0x1AA;
/// ACMD41 argument bit 30: host supports high-capacity (block) addressing.
pub const ACMD41_HCS: u32 = 1 << 30;
/// OCR byte 0 bit: card capacity status (set on block-addressed cards).
pub const OCR_CCS: u8 = 0x40;

/// R1 with only the idle bit set: command accepted, card in idle state.
pub const R1_IDLE_STATE: u8 = 0x01;
/// R1 of a card that has left the idle state.
pub const R1_READY_STATE: u8 = 0x00;
/// While this bit is set no response has arrived yet.
pub const R1_PENDING: u8 = 0x80;

/// Valid CRC for CMD0 with a zero argument.
pub const CRC_CMD0: u8 = 0x95;
/// Valid CRC for CMD8 with the `0x1AA` argument.
pub const CRC_CMD8: u8 = 0x87;
/// Placeholder CRC, accepted once CRC checking is off.
pub const CRC_STUFF: u8 = 0x01;

/// Start token of a single-block data packet, both directions.
pub const DATA_START_BLOCK: u8 = 0xFE;
/// Mask for the data-response byte returned after a write packet.
pub const DATA_RES_MASK: u8 = 0x1F;
/// Data-response pattern `xxx0 0101`: block accepted.
pub const DATA_RES_ACCEPTED: u8 = 0x05;

/// Bytes in one data block.
pub const BLOCK_LEN: usize = 512;
/// CRC bytes trailing every data block.
pub const BLOCK_CRC_LEN: usize = 2;

/// R1 poll bound after a command frame, in byte times. Roughly the 5 ms
/// command-response window at the 400 kHz identification clock.
pub const CMD_RESPONSE_ATTEMPTS: u32 = 250;
/// Power-up settle time and CMD0 reset window, in ms.
pub const INIT_READY_TIMEOUT: u32 = 500;
/// Leave-idle window for SDv1/MMC cards, in ms.
pub const LEGACY_IDLE_TIMEOUT: u32 = 250;
/// Leave-idle window for SDv2 cards polled with HCS, in ms.
pub const HCS_IDLE_TIMEOUT: u32 = 1000;
/// How long to wait for a read data packet's start token, in ms.
pub const READ_TOKEN_TIMEOUT: u32 = 100;
/// How long a write may stay in the programming state, in ms.
pub const WRITE_BUSY_TIMEOUT: u32 = 250;

/// Full restarts the init FSM may take before giving up.
pub const INIT_ATTEMPTS: u8 = 3;
