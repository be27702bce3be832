//! sdspi-server - The request-dispatching server.
//!
//! [`SdServer::service`] is meant to be called once per tick of a
//! cooperative scheduler. Each call does a bounded amount of work: accept a
//! submitted transaction, or advance the in-flight operation by exactly one
//! FSM step. Between ticks the FSM keeps all protocol state, so a companion
//! task can run on the same core while a transfer is in progress.

mod transaction;

pub use transaction::{Request, Status, Transaction};

use crate::port::SdSpiPort;
use crate::sdspi::{
    cmd, proto, Device, Error, InitFsm, Progress, ReadFsm, SdResult, WriteFsm,
};

#[cfg(feature = "log")]
use log::warn;

#[cfg(feature = "defmt-log")]
use defmt::warn;

/// The operation in flight, if any. At most one exists at a time; the
/// variant owns that operation's step index and scratch.
enum Operation {
    Idle,
    Init(InitFsm),
    Read(ReadFsm),
    Write(WriteFsm),
}

/// Owns the SPI port and the device descriptor, and drives one operation
/// FSM at a time on behalf of whichever transaction is presented to
/// [`service`](Self::service).
pub struct SdServer<P: SdSpiPort> {
    port: P,
    device: Device,
    op: Operation,
}

impl<P: SdSpiPort> SdServer<P> {
    pub fn new(port: P) -> Self {
        SdServer {
            port,
            device: Device::new(),
            op: Operation::Idle,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// `true` when no operation is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self.op, Operation::Idle)
    }

    /// Give the port back. Only sensible once idle.
    pub fn free(self) -> P {
        self.port
    }

    /// Probe the card with a CMD0 round trip.
    ///
    /// Does not touch the device descriptor; repeated probes are
    /// side-effect free as far as this driver is concerned. Returns
    /// [`Error::Busy`] instead of interleaving with an operation in
    /// flight.
    pub fn status(&mut self) -> SdResult {
        if !self.is_idle() {
            return Err(Error::Busy);
        }
        let res = match cmd::send_cmd(&mut self.port, proto::CMD0, 0) {
            Ok(res) => res,
            Err(e) => {
                // Free the bus even when the probe itself faults.
                let _ = self.port.release();
                return Err(e);
            }
        };
        cmd::release(&mut self.port)?;
        if res & proto::R1_PENDING == 0 {
            Ok(())
        } else {
            Err(Error::NoResponse)
        }
    }

    /// Run one server tick against the given transaction slot.
    ///
    /// A `Submitted` transaction is accepted when the server is idle; an
    /// accepted one is advanced by one FSM step per call until its result
    /// is published. The same transaction must keep being presented until
    /// it is done: a *different* submitted slot while an operation is in
    /// flight means the old mailbox was dropped, and the in-flight
    /// operation is aborted (bus released, no result published) before the
    /// new request is accepted on a later tick.
    pub fn service(&mut self, trans: &mut Transaction<'_>) {
        if !self.is_idle() && !trans.is_in_flight() {
            warn!("server: transaction abandoned mid-flight, aborting");
            let _ = self.port.release();
            self.op = Operation::Idle;
            return;
        }

        match &mut self.op {
            Operation::Idle => {
                if trans.is_submitted() {
                    self.op = match trans.request() {
                        Request::Init => Operation::Init(InitFsm::new()),
                        Request::Read {
                            sector,
                            offset,
                            count,
                        } => Operation::Read(ReadFsm::new(sector, offset, count)),
                        Request::Write { sector } => Operation::Write(WriteFsm::new(sector)),
                    };
                    trans.mark_in_flight();
                }
            }
            Operation::Init(fsm) => {
                if let Progress::Done(result) = fsm.step(&mut self.port, &mut self.device) {
                    trans.publish(result);
                    self.op = Operation::Idle;
                }
            }
            Operation::Read(fsm) => {
                let progress = match trans.read_buffer() {
                    Some(buf) => fsm.step(&mut self.port, &mut self.device, buf),
                    None => {
                        // Request/buffer mismatch; constructors rule this
                        // out, so treat it as a bad argument.
                        let _ = self.port.release();
                        Progress::Done(Err(Error::InvalidParameter))
                    }
                };
                if let Progress::Done(result) = progress {
                    trans.publish(result);
                    self.op = Operation::Idle;
                }
            }
            Operation::Write(fsm) => {
                let progress = match trans.write_buffer() {
                    Some(buf) => fsm.step(&mut self.port, &mut self.device, buf),
                    None => {
                        let _ = self.port.release();
                        Progress::Done(Err(Error::InvalidParameter))
                    }
                };
                if let Progress::Done(result) = progress {
                    trans.publish(result);
                    self.op = Operation::Idle;
                }
            }
        }
    }
}
