use crate::port::SdSpiPort;
use crate::sdspi::{
    cmd,
    csd::{self, CsdV1, CsdV2},
    proto::*,
    CardType,
};

use hex_literal::hex;
use std::collections::VecDeque;

/// A port that replays a scripted byte stream and records everything the
/// driver does to it. The timer grants one millisecond per status poll.
struct ScriptedPort {
    sent: Vec<u8>,
    replies: VecDeque<u8>,
    cs_low: bool,
    timer: Option<u32>,
}

impl ScriptedPort {
    fn new(replies: &[u8]) -> Self {
        ScriptedPort {
            sent: Vec::new(),
            replies: replies.iter().copied().collect(),
            cs_low: false,
            timer: None,
        }
    }
}

impl SdSpiPort for ScriptedPort {
    type Error = core::convert::Infallible;

    fn exchange(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.sent.push(byte);
        Ok(self.replies.pop_front().unwrap_or(0xFF))
    }

    fn cs_low(&mut self) -> Result<(), Self::Error> {
        self.cs_low = true;
        Ok(())
    }

    fn cs_high(&mut self) -> Result<(), Self::Error> {
        self.cs_low = false;
        Ok(())
    }

    fn clock_low(&mut self) {}

    fn clock_high(&mut self) {}

    fn timer_on(&mut self, ms: u32) {
        self.timer = Some(ms);
    }

    fn timer_status(&mut self) -> bool {
        match self.timer.as_mut() {
            Some(0) | None => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }

    fn timer_off(&mut self) {
        self.timer = None;
    }
}

/// The 6-byte frame sent after the two chip-select spacer bytes.
fn frame_of(sent: &[u8], start: usize) -> &[u8] {
    &sent[start + 2..start + 8]
}

#[test]
fn command_frame_layout() {
    // Spacers, frame, then an immediate R1.
    let mut replies = vec![0xFF; 8];
    replies.push(R1_READY_STATE);
    let mut port = ScriptedPort::new(&replies);

    let res = cmd::send_cmd(&mut port, CMD17, 0x0102_0304).unwrap();
    assert_eq!(res, R1_READY_STATE);
    assert_eq!(
        frame_of(&port.sent, 0),
        &[0x40 | CMD17, 0x01, 0x02, 0x03, 0x04, CRC_STUFF]
    );
    // Chip select stays asserted for the response phase.
    assert!(port.cs_low);
}

#[test]
fn command_crc_selection() {
    let mut replies = vec![0xFF; 8];
    replies.push(R1_IDLE_STATE);
    let mut port = ScriptedPort::new(&replies);
    cmd::send_cmd(&mut port, CMD0, 0).unwrap();
    assert_eq!(frame_of(&port.sent, 0)[5], CRC_CMD0);

    let mut replies = vec![0xFF; 8];
    replies.push(R1_IDLE_STATE);
    let mut port = ScriptedPort::new(&replies);
    cmd::send_cmd(&mut port, CMD8, CMD8_ARG_VHS).unwrap();
    assert_eq!(frame_of(&port.sent, 0)[5], CRC_CMD8);
}

#[test]
fn acmd_sends_cmd55_first() {
    // CMD55: spacers + frame, R1 idle; then ACMD41: spacers + frame, ready.
    let mut replies = vec![0xFF; 8];
    replies.push(R1_IDLE_STATE);
    replies.extend([0xFF; 8].iter());
    replies.push(R1_READY_STATE);
    let mut port = ScriptedPort::new(&replies);

    let res = cmd::send_cmd(&mut port, ACMD41, ACMD41_HCS).unwrap();
    assert_eq!(res, R1_READY_STATE);
    assert_eq!(frame_of(&port.sent, 0)[0], 0x40 | CMD55);
    assert_eq!(
        frame_of(&port.sent, 9),
        &[0x40 | 41, 0x40, 0x00, 0x00, 0x00, CRC_STUFF]
    );
}

#[test]
fn acmd_aborts_when_cmd55_fails() {
    let mut replies = vec![0xFF; 8];
    replies.push(0x05);
    let mut port = ScriptedPort::new(&replies);

    let res = cmd::send_cmd(&mut port, ACMD41, 0).unwrap();
    assert_eq!(res, 0x05);
    assert!(!port.sent.contains(&(0x40 | 41)));
}

#[test]
fn response_poll_is_bounded() {
    // Nothing but 0xFF on the bus: the poll must terminate, hand the 0xFF
    // back for the caller to interpret, and leave the phase timer alone.
    let mut port = ScriptedPort::new(&[]);
    let res = cmd::send_cmd(&mut port, CMD0, 0).unwrap();
    assert_eq!(res, 0xFF);
    assert!(port.timer.is_none());
    assert_eq!(port.sent.len() as u32, 8 + 1 + CMD_RESPONSE_ATTEMPTS);
}

#[test]
fn csd_v1_capacity() {
    // READ_BL_LEN = 9, C_SIZE = 1023, C_SIZE_MULT = 7: a 256 MiB card.
    let mut csd = CsdV1::new();
    csd.data = hex!("00 00 00 00 00 09 00 FF C0 03 80 00 00 00 00 00");
    assert_eq!(csd.read_bl_len(), 9);
    assert_eq!(csd.device_size(), 1023);
    assert_eq!(csd.device_size_multiplier(), 7);
    assert_eq!(csd.card_capacity_bytes(), 256 * 1024 * 1024);
    assert_eq!(csd.sector_count(), 524_288);
}

#[test]
fn csd_v2_capacity() {
    // C_SIZE = 0x3B37: the CSD of an 8 GB class card.
    let mut csd = CsdV2::new();
    csd.data = hex!("40 0E 00 32 5B 59 00 00 3B 37 7F 80 0A 40 00 01");
    assert_eq!(csd.csd_ver(), 1);
    assert_eq!(csd.device_size(), 0x3B37);
    assert_eq!(csd.sector_count(), 15_523_840);
}

#[test]
fn csd_fetch_over_the_wire() {
    // CMD9 accepted, one wait byte, token, 16 register bytes, CRC.
    let mut replies = vec![0xFF; 8];
    replies.push(R1_READY_STATE);
    replies.push(0xFF);
    replies.push(DATA_START_BLOCK);
    replies.extend(hex!("40 0E 00 32 5B 59 00 00 3B 37 7F 80 0A 40 00 01").iter());
    replies.extend([0xAA, 0xBB].iter());
    let mut port = ScriptedPort::new(&replies);

    let sectors = csd::read_sector_count(&mut port, CardType::SD2 | CardType::BLOCK).unwrap();
    assert_eq!(sectors, 15_523_840);
    // The register fetch must leave the bus free.
    assert!(!port.cs_low);
}

#[test]
fn csd_fetch_rejected_means_zero_sectors() {
    let mut replies = vec![0xFF; 8];
    replies.push(0x04); // illegal command
    let mut port = ScriptedPort::new(&replies);

    let sectors = csd::read_sector_count(&mut port, CardType::SD1).unwrap();
    assert_eq!(sectors, 0);
}
