//! sdspi-server - The request mailbox between client and server.
//!
//! A [`Transaction`] is a capacity-one slot: the client builds one around
//! its buffer, presents it to [`SdServer::service`] every tick, and reads
//! the published result once the status reports done. While the transaction
//! exists it holds the buffer borrow, so the client cannot touch the bytes
//! of an operation in flight.
//!
//! [`SdServer::service`]: crate::server::SdServer::service

use crate::sdspi::SdResult;

/// What the client is asking for. Sector addressing is logical (512-byte
/// blocks) regardless of card type.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Request {
    /// Bring the card up and populate the device descriptor.
    Init,
    /// Read bytes `[offset, offset + count)` of `sector`.
    Read { sector: u32, offset: u16, count: u16 },
    /// Write 512 bytes into `sector`.
    Write { sector: u32 },
}

/// Where a transaction is in its life cycle.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    /// Built by the client, not yet accepted by the server.
    Submitted,
    /// Accepted; the operation FSM is being ticked.
    InFlight,
    /// The server published this result and went back to idle.
    Done(SdResult),
}

enum Buffer<'b> {
    None,
    Read(&'b mut [u8]),
    Write(&'b [u8]),
}

/// One request/response slot, owning the buffer borrow for its lifetime.
pub struct Transaction<'b> {
    request: Request,
    buffer: Buffer<'b>,
    status: Status,
}

impl<'b> Transaction<'b> {
    /// A card bring-up request.
    pub fn init() -> Self {
        Transaction {
            request: Request::Init,
            buffer: Buffer::None,
            status: Status::Submitted,
        }
    }

    /// A single-block read of bytes `[offset, offset + count)` into `buf`.
    /// `buf` must hold at least `count` bytes.
    pub fn read(buf: &'b mut [u8], sector: u32, offset: u16, count: u16) -> Self {
        Transaction {
            request: Request::Read {
                sector,
                offset,
                count,
            },
            buffer: Buffer::Read(buf),
            status: Status::Submitted,
        }
    }

    /// A single-block write of the first 512 bytes of `buf`.
    pub fn write(buf: &'b [u8], sector: u32) -> Self {
        Transaction {
            request: Request::Write { sector },
            buffer: Buffer::Write(buf),
            status: Status::Submitted,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The published result, once there is one. Clients poll this after
    /// each `service` tick; `Some` means the slot is free again.
    pub fn result(&self) -> Option<SdResult> {
        match self.status {
            Status::Done(result) => Some(result),
            _ => None,
        }
    }

    pub(crate) fn request(&self) -> Request {
        self.request
    }

    pub(crate) fn is_submitted(&self) -> bool {
        self.status == Status::Submitted
    }

    pub(crate) fn is_in_flight(&self) -> bool {
        self.status == Status::InFlight
    }

    pub(crate) fn read_buffer(&mut self) -> Option<&mut [u8]> {
        match &mut self.buffer {
            Buffer::Read(buf) => Some(&mut **buf),
            _ => None,
        }
    }

    pub(crate) fn write_buffer(&self) -> Option<&[u8]> {
        match &self.buffer {
            Buffer::Write(buf) => Some(&**buf),
            _ => None,
        }
    }

    pub(crate) fn mark_in_flight(&mut self) {
        self.status = Status::InFlight;
    }

    pub(crate) fn publish(&mut self, result: SdResult) {
        self.status = Status::Done(result);
    }
}
