//! sdspi-server - Command codec.
//!
//! Frames a 6-byte SD command, handles the CMD55 escape for application
//! commands and polls for the R1 response within a bounded window.

use super::{proto::*, Error};
use crate::port::SdSpiPort;

/// One full-duplex exchange with the transport fault folded into the SD
/// error taxonomy.
pub(crate) fn transfer<P: SdSpiPort>(port: &mut P, byte: u8) -> Result<u8, Error> {
    port.exchange(byte).map_err(|_e| Error::Transport)
}

/// Clock a byte in.
pub(crate) fn receive<P: SdSpiPort>(port: &mut P) -> Result<u8, Error> {
    transfer(port, 0xFF)
}

/// Deassert chip select and clock out a trailing spacer.
pub(crate) fn release<P: SdSpiPort>(port: &mut P) -> Result<(), Error> {
    port.release().map_err(|_e| Error::Transport)
}

/// Send a command and poll for its R1 response.
///
/// Application commands carry [`APP_CMD`] and are emitted as CMD55 followed
/// by the target command; if CMD55 answers with anything above idle, that
/// response is returned without issuing the ACMD.
///
/// The returned byte is whichever exchange ended the R1 poll. A timeout is
/// indistinguishable from `0xFF`; interpretation belongs to the caller.
pub(crate) fn send_cmd<P: SdSpiPort>(port: &mut P, cmd: u8, arg: u32) -> Result<u8, Error> {
    let mut cmd = cmd;
    if cmd & APP_CMD != 0 {
        cmd &= !APP_CMD;
        let res = send_cmd(port, CMD55, 0)?;
        if res > 1 {
            return Ok(res);
        }
    }

    // Select the card: one 8-clock spacer on each chip-select edge.
    port.cs_high().map_err(|_e| Error::Transport)?;
    receive(port)?;
    port.cs_low().map_err(|_e| Error::Transport)?;
    receive(port)?;

    // Start bit, command index, big-endian argument.
    transfer(port, 0x40 | cmd)?;
    transfer(port, (arg >> 24) as u8)?;
    transfer(port, (arg >> 16) as u8)?;
    transfer(port, (arg >> 8) as u8)?;
    transfer(port, arg as u8)?;

    // CRC checking is off after reset; only the two reset-path commands
    // need a real checksum.
    let crc = match cmd {
        CMD0 => CRC_CMD0,
        CMD8 => CRC_CMD8,
        _ => CRC_STUFF,
    };
    transfer(port, crc)?;

    // Poll for a response within the command window. The poll is bounded
    // in byte times rather than armed on the port timer, which the FSMs
    // keep running across commands for their phase windows.
    let mut res = receive(port)?;
    let mut attempts = CMD_RESPONSE_ATTEMPTS;
    while (res & R1_PENDING) != 0 && attempts > 0 {
        res = receive(port)?;
        attempts -= 1;
    }

    Ok(res)
}
