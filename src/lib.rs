//! Driver for ILI9341 / ILI9486 / ILI9488 TFT controllers on an 8-bit 8080
//! parallel bus, bit-banged through a memory-mapped GPIO output register.
//!
//! Every byte on the bus is one store of a precomputed register word (see
//! [`bus::LookupTable`]) followed by a WR strobe through the chip's atomic
//! "set bits" register, so the per-pixel cost on a slow MCU is two stores.
//!
//! ```text
//! draw_* / text / image APIs
//!          │
//!   address window (CASET / PASET / RAMWR)
//!          │
//!   bus primitives (command / data / burst)
//!          │
//!   GpioRegisters (MMIO, or a simulator in tests)
//! ```
//!
//! The resistive touch sampler in [`touch`] is independent of the display and
//! often shares its pins; never run both from different execution contexts.
#![cfg_attr(not(test), no_std)]

use core::convert::Infallible;

mod fmt;

pub mod bus;
pub mod color;
pub mod controller;
pub mod display;
pub mod image;
pub mod text;
pub mod touch;

#[cfg(test)]
mod sim;

pub use bus::{Bus, BusConfig, BusPins, GpioRegisters, MmioRegisters, Platform, RegisterAddresses};
pub use color::{Color, PixelFormat};
pub use controller::{Controller, Rotation};
pub use display::{Cabc, Config, Ili9xxx};
pub use image::{BmpError, BmpHeader};
pub use text::{Font, Glyph};
pub use touch::{TouchCalibration, TouchConfig, TouchPanel, TouchScreen};

#[derive(Debug)]
pub enum Error<E = Infallible> {
    /// Reset pin error
    Pin(Infallible),
    /// Reading an image asset failed
    Io(E),
    /// Image asset ended before the announced pixel data
    UnexpectedEof,
    /// Rotation index outside 0..=3
    InvalidRotation(u8),
    /// Vertical scroll areas must add up to the panel height
    ScrollMismatch { requested: u32, screen: u16 },
    /// Operation needs a different pixel format
    UnsupportedFormat(PixelFormat),
    /// Controller cannot drive the configured pixel format
    UnsupportedController {
        controller: Controller,
        format: PixelFormat,
    },
    /// Text drawn before a font was set
    MissingFont,
    /// BMP header rejected
    Bmp(BmpError),
    /// Bus pin assignment rejected
    Config(bus::PinError),
}

impl<E> From<bus::PinError> for Error<E> {
    fn from(error: bus::PinError) -> Self {
        Error::Config(error)
    }
}

impl<E> From<BmpError> for Error<E> {
    fn from(error: BmpError) -> Self {
        Error::Bmp(error)
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), self = "Timer",),
    async(feature = "async", keep_self)
)]
/// Simplified timer trait for delay operations.
pub trait Timer {
    /// Delay for the specified number of milliseconds.
    async fn delay_ms(milliseconds: u64);
}

/// [`Timer`] backed by `embassy-time`.
#[cfg(feature = "embassy-time")]
pub struct EmbassyTimer;

#[cfg(all(feature = "embassy-time", feature = "async"))]
impl Timer for EmbassyTimer {
    async fn delay_ms(milliseconds: u64) {
        embassy_time::Timer::after_millis(milliseconds).await;
    }
}

#[cfg(all(feature = "embassy-time", not(feature = "async")))]
impl Timer for EmbassyTimer {
    fn delay_ms(milliseconds: u64) {
        embassy_time::block_for(embassy_time::Duration::from_millis(milliseconds));
    }
}
