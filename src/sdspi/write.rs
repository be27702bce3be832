//! sdspi-server - Single-block write state machine.
//!
//! CMD24, the start token, 512 data bytes streamed one exchange per tick,
//! then the CRC/accept handshake and a bounded wait for the card to finish
//! programming.

use super::{cmd, proto::*, Device, Error, Progress};
use crate::port::SdSpiPort;

#[cfg(feature = "log")]
use log::trace;

#[cfg(feature = "defmt-log")]
use defmt::trace;

#[derive(Debug, Copy, Clone, PartialEq)]
enum Step {
    /// Validate arguments, issue CMD24, emit the start token.
    Issue,
    /// One buffer byte per tick.
    Stream,
    /// Two dummy CRC bytes, then the data-response byte decides.
    Handshake,
    /// The card holds the line low while programming; poll one byte per
    /// tick under the write timer.
    BusyPoll,
    /// Release the bus, count the write, publish.
    Finish,
}

/// In-flight state of one single-block write.
pub(crate) struct WriteFsm {
    step: Step,
    sector: u32,
    /// Index of the next buffer byte to send.
    index: u16,
    /// Last byte seen on the busy line.
    line: u8,
}

impl WriteFsm {
    pub(crate) fn new(sector: u32) -> Self {
        WriteFsm {
            step: Step::Issue,
            sector,
            index: 0,
            line: 0xFF,
        }
    }

    /// Advance the write by one state.
    pub(crate) fn step<P: SdSpiPort>(
        &mut self,
        port: &mut P,
        device: &mut Device,
        buf: &[u8],
    ) -> Progress {
        match self.run(port, device, buf) {
            Ok(progress) => progress,
            Err(e) => {
                let _ = port.release();
                Progress::Done(Err(e))
            }
        }
    }

    fn run<P: SdSpiPort>(
        &mut self,
        port: &mut P,
        device: &mut Device,
        buf: &[u8],
    ) -> Result<Progress, Error> {
        match self.step {
            Step::Issue => {
                if self.sector > device.last_sector() || buf.len() < BLOCK_LEN {
                    // Rejected before any bus traffic.
                    return Ok(Progress::Done(Err(Error::InvalidParameter)));
                }
                let addr = device.block_address(self.sector);
                if cmd::send_cmd(port, CMD24, addr)? == R1_READY_STATE {
                    trace!("write: sector {} issued", self.sector);
                    cmd::transfer(port, DATA_START_BLOCK)?;
                    self.index = 0;
                    self.step = Step::Stream;
                } else {
                    cmd::release(port)?;
                    return Ok(Progress::Done(Err(Error::Protocol)));
                }
            }
            Step::Stream => {
                cmd::transfer(port, buf[self.index as usize])?;
                self.index += 1;
                if self.index as usize == BLOCK_LEN {
                    self.step = Step::Handshake;
                }
            }
            Step::Handshake => {
                // CRC checking is off; the card still expects two bytes.
                cmd::transfer(port, 0xFF)?;
                cmd::transfer(port, 0xFF)?;
                let response = cmd::receive(port)?;
                if (response & DATA_RES_MASK) != DATA_RES_ACCEPTED {
                    cmd::release(port)?;
                    return Ok(Progress::Done(Err(Error::Reject)));
                }
                port.timer_on(WRITE_BUSY_TIMEOUT);
                self.step = Step::BusyPoll;
            }
            Step::BusyPoll => {
                self.line = cmd::receive(port)?;
                if self.line != 0 || !port.timer_status() {
                    self.step = Step::Finish;
                }
            }
            Step::Finish => {
                port.timer_off();
                device.count_write();
                cmd::release(port)?;
                let result = if self.line == 0 {
                    // Still programming when the window closed.
                    Err(Error::Busy)
                } else {
                    Ok(())
                };
                return Ok(Progress::Done(result));
            }
        }
        Ok(Progress::Pending)
    }
}
