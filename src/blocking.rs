//! sdspi-server - Blocking convenience wrapper.
//!
//! [`SdCard`] submits a transaction and spins the server until the result
//! is published. Nothing else runs in the meantime, so this is for demos,
//! tests and single-task firmware; cooperative callers drive
//! [`SdServer::service`] themselves.

use crate::port::SdSpiPort;
use crate::sdspi::{Device, SdResult};
use crate::server::{SdServer, Transaction};

/// A blocking facade over [`SdServer`].
pub struct SdCard<P: SdSpiPort> {
    server: SdServer<P>,
}

impl<P: SdSpiPort> SdCard<P> {
    pub fn new(port: P) -> Self {
        SdCard {
            server: SdServer::new(port),
        }
    }

    pub fn device(&self) -> &Device {
        self.server.device()
    }

    /// Bring the card up, spinning until init finishes.
    pub fn init(&mut self) -> SdResult {
        self.run(Transaction::init())
    }

    /// Read bytes `[offset, offset + count)` of `sector` into `buf`.
    pub fn read(&mut self, buf: &mut [u8], sector: u32, offset: u16, count: u16) -> SdResult {
        self.run(Transaction::read(buf, sector, offset, count))
    }

    /// Write the first 512 bytes of `buf` into `sector`.
    pub fn write(&mut self, buf: &[u8], sector: u32) -> SdResult {
        self.run(Transaction::write(buf, sector))
    }

    /// CMD0 round trip; `Ok` when the card answers at all.
    pub fn status(&mut self) -> SdResult {
        self.server.status()
    }

    /// Give the port back.
    pub fn free(self) -> P {
        self.server.free()
    }

    fn run(&mut self, mut trans: Transaction<'_>) -> SdResult {
        loop {
            self.server.service(&mut trans);
            if let Some(result) = trans.result() {
                return result;
            }
        }
    }
}
