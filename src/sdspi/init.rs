//! sdspi-server - Card bring-up state machine.
//!
//! Resets the card into SPI mode, detects its generation (SDv1, SDv2,
//! MMCv3), negotiates block addressing and derives the capacity from the
//! CSD. Each `step` runs one state and returns, so long waits (power-up
//! settle, reset polling, leave-idle polling) cost one timer or command
//! exchange per tick instead of a blocking loop.

use super::{cmd, csd, proto::*, CardType, Device, Error, Progress};
use crate::port::SdSpiPort;

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq)]
enum Step {
    /// Decide between another bring-up attempt and finalizing.
    PowerOn,
    /// Let the 500 ms power-up window elapse.
    DummyClocks,
    /// CMD0 until the card reports idle or the reset window closes.
    Reset,
    /// One more CMD0 to confirm the idle state stuck.
    ConfirmIdle,
    /// CMD8 splits the world into v2 cards and everything older.
    CheckVersion,
    /// First ACMD41 decides SDv1 vs MMC and picks the leave-idle command.
    LegacyProbe,
    /// Poll the chosen leave-idle command, one issue per tick.
    LegacyLeaveIdle,
    /// CRC off and 512-byte block length, both mandatory.
    LegacyConfig,
    /// Capture the R7 trailer and check the voltage window.
    ReadVoltage,
    /// ACMD41 with HCS at full bus speed, one issue per tick.
    HcsPoll,
    /// CMD58 to fetch the OCR, gated on the HCS poll having left idle.
    ReadCapacity,
    /// OCR trailer: the CCS bit selects block addressing.
    CaptureOcr,
    /// Populate the device descriptor from the CSD.
    Finalize,
    /// Release the bus and report.
    Publish,
}

/// In-flight state of one init operation.
pub(crate) struct InitFsm {
    step: Step,
    card_type: CardType,
    attempts: u8,
    /// ACMD41 or CMD1, whichever the legacy probe selected.
    leave_idle_cmd: u8,
    /// Whether the last leave-idle poll saw the card ready before its
    /// window closed.
    left_idle: bool,
}

impl InitFsm {
    pub(crate) fn new() -> Self {
        InitFsm {
            step: Step::PowerOn,
            card_type: CardType::empty(),
            attempts: 0,
            leave_idle_cmd: ACMD41,
            left_idle: false,
        }
    }

    /// Advance the bring-up by one state.
    pub(crate) fn step<P: SdSpiPort>(&mut self, port: &mut P, device: &mut Device) -> Progress {
        match self.run(port, device) {
            Ok(progress) => progress,
            Err(e) => {
                let _ = port.release();
                Progress::Done(Err(e))
            }
        }
    }

    fn run<P: SdSpiPort>(&mut self, port: &mut P, device: &mut Device) -> Result<Progress, Error> {
        match self.step {
            Step::PowerOn => {
                if self.attempts != INIT_ATTEMPTS && self.card_type.is_empty() {
                    trace!("init: attempt {}", self.attempts + 1);
                    self.attempts += 1;
                    port.reset();
                    port.cs_high().map_err(|_e| Error::Transport)?;
                    port.clock_low();
                    // At least 74 dummy clocks with chip select deasserted
                    // put the card into SPI mode.
                    for _ in 0..10 {
                        cmd::receive(port)?;
                    }
                    port.timer_on(INIT_READY_TIMEOUT);
                    self.step = Step::DummyClocks;
                } else {
                    self.step = Step::Finalize;
                }
            }
            Step::DummyClocks => {
                if !port.timer_status() {
                    port.timer_off();
                    device.unmount();
                    port.cs_high().map_err(|_e| Error::Transport)?;
                    port.timer_on(INIT_READY_TIMEOUT);
                    self.step = Step::Reset;
                }
            }
            Step::Reset => {
                if cmd::send_cmd(port, CMD0, 0)? == R1_IDLE_STATE {
                    port.timer_off();
                    self.step = Step::ConfirmIdle;
                } else if !port.timer_status() {
                    // Window closed with no idle response; the confirm step
                    // will bounce this attempt back to PowerOn.
                    port.timer_off();
                    self.step = Step::ConfirmIdle;
                }
            }
            Step::ConfirmIdle => {
                if cmd::send_cmd(port, CMD0, 0)? == R1_IDLE_STATE {
                    self.step = Step::CheckVersion;
                } else {
                    self.step = Step::PowerOn;
                }
            }
            Step::CheckVersion => {
                if cmd::send_cmd(port, CMD8, CMD8_ARG_VHS)? == R1_IDLE_STATE {
                    self.step = Step::ReadVoltage;
                } else {
                    self.step = Step::LegacyProbe;
                }
            }
            Step::LegacyProbe => {
                if cmd::send_cmd(port, ACMD41, 0)? <= R1_IDLE_STATE {
                    self.card_type = CardType::SD1;
                    self.leave_idle_cmd = ACMD41;
                } else {
                    self.card_type = CardType::MMC3;
                    self.leave_idle_cmd = CMD1;
                }
                debug!("init: legacy card, type {:?}", self.card_type);
                self.left_idle = false;
                port.timer_on(LEGACY_IDLE_TIMEOUT);
                self.step = Step::LegacyLeaveIdle;
            }
            Step::LegacyLeaveIdle => {
                if cmd::send_cmd(port, self.leave_idle_cmd, 0)? == R1_READY_STATE {
                    self.left_idle = true;
                    port.timer_off();
                    self.step = Step::LegacyConfig;
                } else if !port.timer_status() {
                    port.timer_off();
                    self.step = Step::LegacyConfig;
                }
            }
            Step::LegacyConfig => {
                if !self.left_idle {
                    warn!("init: legacy card stuck in idle");
                    self.card_type = CardType::empty();
                }
                // CRC stays off (the default) and the block length is
                // pinned to 512 bytes; both must be acknowledged.
                if cmd::send_cmd(port, CMD59, 0)? != R1_READY_STATE {
                    self.card_type = CardType::empty();
                }
                if cmd::send_cmd(port, CMD16, BLOCK_LEN as u32)? != R1_READY_STATE {
                    self.card_type = CardType::empty();
                }
                self.step = Step::PowerOn;
            }
            Step::ReadVoltage => {
                let mut ocr = [0u8; 4];
                for byte in ocr.iter_mut() {
                    *byte = cmd::receive(port)?;
                }
                if ocr[2] == 0x01 && ocr[3] == 0xAA {
                    self.left_idle = false;
                    port.timer_on(HCS_IDLE_TIMEOUT);
                    self.step = Step::HcsPoll;
                } else {
                    warn!("init: voltage window rejected, {:?}", ocr);
                    self.step = Step::PowerOn;
                }
            }
            Step::HcsPoll => {
                port.clock_high();
                if !port.timer_status() {
                    port.timer_off();
                    self.step = Step::ReadCapacity;
                } else if cmd::send_cmd(port, ACMD41, ACMD41_HCS)? == R1_READY_STATE {
                    self.left_idle = true;
                    port.timer_off();
                    self.step = Step::ReadCapacity;
                }
            }
            Step::ReadCapacity => {
                // Gate on the HCS poll's exit reason; a timed-out card gets
                // another bring-up attempt instead of a CMD58.
                if self.left_idle && cmd::send_cmd(port, CMD58, 0)? == R1_READY_STATE {
                    self.step = Step::CaptureOcr;
                } else {
                    self.step = Step::PowerOn;
                }
            }
            Step::CaptureOcr => {
                let mut ocr = [0u8; 4];
                for byte in ocr.iter_mut() {
                    *byte = cmd::receive(port)?;
                }
                self.card_type = if ocr[0] & OCR_CCS != 0 {
                    CardType::SD2 | CardType::BLOCK
                } else {
                    CardType::SD2
                };
                debug!("init: v2 card, type {:?}", self.card_type);
                self.step = Step::PowerOn;
            }
            Step::Finalize => {
                if !self.card_type.is_empty() {
                    let sectors = csd::read_sector_count(port, self.card_type)?;
                    if sectors == 0 {
                        warn!("init: CSD unreadable, treating card as absent");
                        self.card_type = CardType::empty();
                    } else {
                        device.mount(self.card_type, sectors - 1);
                        debug!("init: mounted, last sector {}", sectors - 1);
                    }
                }
                self.step = Step::Publish;
            }
            Step::Publish => {
                cmd::release(port)?;
                let result = if self.card_type.is_empty() {
                    Err(Error::NoInit)
                } else {
                    Ok(())
                };
                return Ok(Progress::Done(result));
            }
        }
        Ok(Progress::Pending)
    }
}
