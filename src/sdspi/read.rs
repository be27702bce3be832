//! sdspi-server - Single-block read state machine.
//!
//! CMD17, wait for the start token, then stream the 512-byte block plus its
//! CRC one exchange per tick, copying the requested byte range into the
//! caller's buffer. The token wait is bounded by the data-packet timer.

use super::{cmd, proto::*, Device, Error, Progress, SdResult};
use crate::port::SdSpiPort;

#[cfg(feature = "log")]
use log::trace;

#[cfg(feature = "defmt-log")]
use defmt::trace;

#[derive(Debug, Copy, Clone, PartialEq)]
enum Step {
    /// Validate arguments and issue CMD17.
    Issue,
    /// One exchange per tick until a token or the timer ends the wait.
    AwaitToken,
    /// Only `0xFE` starts a block; anything else is a protocol fault.
    CheckToken,
    /// One data byte per tick, 512 data plus 2 CRC.
    Stream,
    /// Release the bus, count the read, publish.
    Finish,
}

/// In-flight state of one single-block read.
pub(crate) struct ReadFsm {
    step: Step,
    sector: u32,
    offset: u16,
    count: u16,
    token: u8,
    /// Index of the next byte of the data packet.
    index: u16,
    /// Next free slot in the destination buffer.
    dst: u16,
    result: SdResult,
}

impl ReadFsm {
    pub(crate) fn new(sector: u32, offset: u16, count: u16) -> Self {
        ReadFsm {
            step: Step::Issue,
            sector,
            offset,
            count,
            token: 0xFF,
            index: 0,
            dst: 0,
            result: Err(Error::Protocol),
        }
    }

    /// Advance the read by one state.
    pub(crate) fn step<P: SdSpiPort>(
        &mut self,
        port: &mut P,
        device: &mut Device,
        buf: &mut [u8],
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
        buf: &mut [u8],
    ) -> Result<Progress, Error> {
        match self.step {
            Step::Issue => {
                if self.sector > device.last_sector()
                    || self.count == 0
                    || self.offset as usize + self.count as usize > BLOCK_LEN
                    || buf.len() < self.count as usize
                {
                    // Rejected before any bus traffic.
                    return Ok(Progress::Done(Err(Error::InvalidParameter)));
                }
                let addr = device.block_address(self.sector);
                if cmd::send_cmd(port, CMD17, addr)? == R1_READY_STATE {
                    trace!("read: sector {} issued", self.sector);
                    port.timer_on(READ_TOKEN_TIMEOUT);
                    self.step = Step::AwaitToken;
                } else {
                    self.step = Step::Finish;
                }
            }
            Step::AwaitToken => {
                self.token = cmd::receive(port)?;
                if self.token != 0xFF || !port.timer_status() {
                    self.step = Step::CheckToken;
                }
            }
            Step::CheckToken => {
                port.timer_off();
                if self.token == DATA_START_BLOCK {
                    self.index = 0;
                    self.dst = 0;
                    self.step = Step::Stream;
                } else {
                    self.step = Step::Finish;
                }
            }
            Step::Stream => {
                let data = cmd::receive(port)?;
                if self.index >= self.offset && self.index < self.offset + self.count {
                    buf[self.dst as usize] = data;
                    self.dst += 1;
                }
                self.index += 1;
                if self.index as usize == BLOCK_LEN + BLOCK_CRC_LEN {
                    self.result = Ok(());
                    self.step = Step::Finish;
                }
            }
            Step::Finish => {
                cmd::release(port)?;
                device.count_read();
                return Ok(Progress::Done(self.result));
            }
        }
        Ok(Progress::Pending)
    }
}
