//! # sdspi-server
//!
//! > A cooperative, tick-driven SD card block driver over SPI
//!
//! This crate speaks the SD Physical Layer protocol over a single-master
//! SPI bus and exposes a 512-byte-sector block interface: initialize, read
//! sector, write sector, status. It is `#![no_std]`, does not use `alloc`,
//! and is written for small single-core targets running a cooperative
//! scheduler.
//!
//! What sets it apart from a classic blocking SD driver is that every
//! operation (init / read / write) is a resumable state machine. A client
//! task posts a request into a [`Transaction`] slot; the server task calls
//! [`SdServer::service`] once per scheduler tick, which advances the
//! in-flight operation by exactly one bounded step: a timer poll, one
//! command, or a single byte of a data block. Long protocol waits
//! (power-up settle, leave-idle polling, card-busy polling) therefore yield
//! the CPU to a companion task instead of spinning.
//!
//! ## Using the crate
//!
//! Implement [`SdSpiPort`] for your board (or build a [`HalPort`] from
//! `embedded-hal` SPI, chip-select and countdown-timer impls), then either
//! drive the server from your scheduler:
//!
//! ```rust,ignore
//! let mut server = SdServer::new(port);
//! let mut trans = Transaction::init();
//! loop {
//!     server.service(&mut trans);          // one tick
//!     if let Some(result) = trans.result() {
//!         break result;
//!     }
//!     other_task();                        // runs between FSM steps
//! }
//! ```
//!
//! or use the blocking [`SdCard`] facade when nothing else needs the core:
//!
//! ```rust,ignore
//! let mut card = SdCard::new(port);
//! card.init()?;
//! card.read(&mut buf, sector, 0, 512)?;
//! ```
//!
//! ## Features
//!
//! * `defmt-log`: by turning off the default features and enabling
//! `defmt-log` you can configure this crate to log messages over defmt
//! instead.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is
//! enabled.

#![cfg_attr(not(test), no_std)]

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

#[cfg(test)]
mod test;

#[macro_use]
mod structure;

pub mod blocking;
pub mod port;
pub mod sdspi;
pub mod server;

pub use crate::blocking::SdCard;
pub use crate::port::{BusClock, HalPort, SdSpiPort};
pub use crate::sdspi::{CardType, Device, Error, SdResult, TransferStats};
pub use crate::server::{Request, SdServer, Status, Transaction};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
