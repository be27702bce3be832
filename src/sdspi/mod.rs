//! sdspi-server - SD card protocol over SPI.
//!
//! Implements the SD Physical Layer handshake and single-block transfers on
//! a generic SPI port. Each operation (init / read / write) is a resumable
//! state machine advanced one bounded step at a time, so a cooperative
//! scheduler can interleave other work with a transfer in flight.

pub(crate) mod cmd;
pub mod csd;
pub mod proto;

mod init;
mod read;
mod write;

pub(crate) use init::InitFsm;
pub(crate) use read::ReadFsm;
pub(crate) use write::WriteFsm;

bitflags::bitflags! {
    /// What kind of card answered the bring-up handshake.
    ///
    /// An empty set means no card has been identified. `BLOCK` marks
    /// high-capacity cards that take sector numbers instead of byte
    /// addresses in CMD17/CMD24.
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct CardType: u8 {
        const SD1 = 0x01;
        const SD2 = 0x02;
        const MMC3 = 0x04;
        const BLOCK = 0x08;
    }
}

/// The ways an SD transaction can fail.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// SPI or chip-select failure below the SD protocol.
    Transport,
    /// No card was brought up: init exhausted its retries, or no request is
    /// valid because the card never mounted.
    NoInit,
    /// SD protocol fault: unexpected R1, bad data token, rejected command.
    Protocol,
    /// Invalid argument: sector out of range, zero or oversized byte count,
    /// undersized buffer.
    InvalidParameter,
    /// The card was still programming when the write timeout expired.
    Busy,
    /// The card rejected the written data block.
    Reject,
    /// No R1 was ever observed (status probe).
    NoResponse,
}

/// Result of a completed SD transaction.
pub type SdResult = Result<(), Error>;

/// What one FSM step produced.
pub(crate) enum Progress {
    /// The operation needs more ticks.
    Pending,
    /// The operation finished and published this result. The bus has been
    /// released.
    Done(SdResult),
}

/// Read/write completion counters, kept per device.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TransferStats {
    /// Completed read operations, successful or not.
    pub reads: u32,
    /// Completed write operations that reached the data phase.
    pub writes: u32,
}

/// Per-card descriptor: card type, mount state and addressable range.
///
/// Created empty; populated by a successful init and only ever mutated by
/// the init FSM and the transfer counters.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug)]
pub struct Device {
    card_type: CardType,
    mounted: bool,
    last_sector: u32,
    stats: TransferStats,
}

impl Device {
    pub fn new() -> Self {
        Device {
            card_type: CardType::empty(),
            mounted: false,
            last_sector: 0,
            stats: TransferStats::default(),
        }
    }

    /// The detected card type. Empty until a card mounts.
    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    /// `true` once init derived the card's capacity from its CSD.
    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Index of the last addressable 512-byte sector (inclusive).
    pub fn last_sector(&self) -> u32 {
        self.last_sector
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    pub(crate) fn unmount(&mut self) {
        self.mounted = false;
    }

    pub(crate) fn mount(&mut self, card_type: CardType, last_sector: u32) {
        self.card_type = card_type;
        self.mounted = true;
        self.last_sector = last_sector;
        self.stats = TransferStats::default();
    }

    pub(crate) fn count_read(&mut self) {
        self.stats.reads += 1;
    }

    pub(crate) fn count_write(&mut self) {
        self.stats.writes += 1;
    }

    /// Command argument for a block transfer: high-capacity cards are
    /// addressed by sector number, standard-capacity cards by byte offset.
    pub(crate) fn block_address(&self, sector: u32) -> u32 {
        if self.card_type.contains(CardType::BLOCK) {
            sector
        } else {
            sector * proto::BLOCK_LEN as u32
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}
