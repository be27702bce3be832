//! sdspi-server - SPI/timer port abstraction.
//!
//! The driver talks to the outside world through [`SdSpiPort`]: a single
//! full-duplex SPI channel, a chip-select line, a two-speed bus clock and one
//! millisecond countdown timer. [`HalPort`] implements the trait on top of
//! the `embedded-hal` blocking SPI and GPIO traits for targets that have
//! them; anything more exotic can implement [`SdSpiPort`] directly.

use embedded_hal::{
    blocking::spi::Transfer, digital::v2::OutputPin, timer::CountDown,
};

/// The hardware a card driver runs on.
///
/// Contract notes:
///
/// * `exchange` clocks exactly one byte out and one byte in.
/// * `timer_status` returns `true` while the timer is armed and has not yet
///   expired. A disarmed or expired timer reads `false`.
/// * `release` deasserts chip select and clocks eight dummy bits so the card
///   lets go of the data line.
pub trait SdSpiPort {
    /// Transport-level error (SPI or chip-select failure).
    type Error: core::fmt::Debug;

    /// Re-initialize the SPI peripheral. Called once per init attempt;
    /// a no-op on ports that need no reconfiguration.
    fn reset(&mut self) {}

    /// Full-duplex exchange of a single byte.
    fn exchange(&mut self, byte: u8) -> Result<u8, Self::Error>;

    /// Assert chip select (active low).
    fn cs_low(&mut self) -> Result<(), Self::Error>;

    /// Deassert chip select.
    fn cs_high(&mut self) -> Result<(), Self::Error>;

    /// Switch the bus to the slow (≤ 400 kHz) identification clock.
    fn clock_low(&mut self);

    /// Switch the bus to the full data-transfer clock.
    fn clock_high(&mut self);

    /// Arm the millisecond countdown timer.
    fn timer_on(&mut self, ms: u32);

    /// `true` while the timer is armed and running.
    fn timer_status(&mut self) -> bool;

    /// Disarm the timer. `timer_status` reads `false` afterwards.
    fn timer_off(&mut self);

    /// Receive a byte from the card by clocking out `0xFF`.
    fn receive(&mut self) -> Result<u8, Self::Error> {
        self.exchange(0xFF)
    }

    /// Send a byte to the card, discarding whatever comes back.
    fn send(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.exchange(byte).map(|_| ())
    }

    /// Free the bus: chip select high plus one trailing spacer byte.
    fn release(&mut self) -> Result<(), Self::Error> {
        self.cs_high()?;
        self.exchange(0xFF).map(|_| ())
    }
}

/// Bus clock-rate switch.
///
/// `embedded-hal` 0.2 has no trait for reconfiguring an SPI peripheral's
/// clock, so [`HalPort`] delegates the low/high switch to this one.
pub trait BusClock {
    /// Select the slow identification clock.
    fn slow(&mut self);
    /// Select the full-speed data clock.
    fn fast(&mut self);
}

/// Errors produced by [`HalPort`]. The underlying HAL error is dropped;
/// the driver treats every transport fault the same way.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HalPortError {
    /// The SPI transfer failed.
    Spi,
    /// The chip-select pin could not be driven.
    Gpio,
}

/// [`SdSpiPort`] over `embedded-hal` traits: a blocking SPI transfer, an
/// `OutputPin` chip select, a `CountDown` timer counting milliseconds and a
/// [`BusClock`] for the rate switch.
pub struct HalPort<SPI, CS, TIMER, CLK>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TIMER: CountDown,
    TIMER::Time: From<u32>,
    CLK: BusClock,
{
    spi: SPI,
    cs: CS,
    timer: TIMER,
    clock: CLK,
    timer_running: bool,
}

impl<SPI, CS, TIMER, CLK> HalPort<SPI, CS, TIMER, CLK>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TIMER: CountDown,
    TIMER::Time: From<u32>,
    CLK: BusClock,
{
    pub fn new(spi: SPI, cs: CS, timer: TIMER, clock: CLK) -> Self {
        HalPort {
            spi,
            cs,
            timer,
            clock,
            timer_running: false,
        }
    }

    /// Take the peripherals back.
    pub fn free(self) -> (SPI, CS, TIMER, CLK) {
        (self.spi, self.cs, self.timer, self.clock)
    }
}

impl<SPI, CS, TIMER, CLK> SdSpiPort for HalPort<SPI, CS, TIMER, CLK>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    TIMER: CountDown,
    TIMER::Time: From<u32>,
    CLK: BusClock,
{
    type Error = HalPortError;

    fn exchange(&mut self, byte: u8) -> Result<u8, Self::Error> {
        self.spi
            .transfer(&mut [byte])
            .map(|b| b[0])
            .map_err(|_e| HalPortError::Spi)
    }

    fn cs_low(&mut self) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(|_e| HalPortError::Gpio)
    }

    fn cs_high(&mut self) -> Result<(), Self::Error> {
        self.cs.set_high().map_err(|_e| HalPortError::Gpio)
    }

    fn clock_low(&mut self) {
        self.clock.slow();
    }

    fn clock_high(&mut self) {
        self.clock.fast();
    }

    fn timer_on(&mut self, ms: u32) {
        self.timer.start(ms);
        self.timer_running = true;
    }

    fn timer_status(&mut self) -> bool {
        if !self.timer_running {
            return false;
        }
        match self.timer.wait() {
            Err(nb::Error::WouldBlock) => true,
            _ => {
                // Expired (or the countdown misbehaved). Latch the result so
                // repeated polls keep reading `false` until re-armed.
                self.timer_running = false;
                false
            }
        }
    }

    fn timer_off(&mut self) {
        self.timer_running = false;
    }
}
