//! # Hardware Abstraction Layer for Radio Hardware
//!
//! This module defines the bus and GPIO traits the RFM69 driver is written
//! against. The driver owns no knowledge of the underlying hardware beyond
//! "transfer bytes" and "write bytes"; platform implementations live in
//! submodules.

use thiserror::Error;

/// Errors that can occur during HAL operations
#[derive(Debug, Error)]
pub enum HalError {
    #[error("SPI communication error: {0}")]
    Spi(String),

    #[error("GPIO operation error: {0}")]
    Gpio(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Full-duplex chip-select bus.
///
/// The first byte of every transaction is the register address; bit 7 set
/// marks a write.
pub trait SpiBus: Send {
    /// Exchange `data` with the device and return the bytes clocked in,
    /// one per byte sent.
    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, HalError>;

    /// Send `data`, discarding whatever is clocked in.
    fn write(&mut self, data: &[u8]) -> Result<(), HalError>;
}

/// Direction of a GPIO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

/// Minimal GPIO access used for the reset pulse and activity LEDs.
pub trait GpioPort: Send {
    /// Configure the pin direction
    fn set_mode(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError>;

    /// Drive an output pin high (`true`) or low (`false`)
    fn write(&mut self, pin: u8, level: bool) -> Result<(), HalError>;
}

impl<T: SpiBus + ?Sized> SpiBus for Box<T> {
    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, HalError> {
        (**self).transfer(data)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HalError> {
        (**self).write(data)
    }
}

impl<T: GpioPort + ?Sized> GpioPort for Box<T> {
    fn set_mode(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        (**self).set_mode(pin, direction)
    }

    fn write(&mut self, pin: u8, level: bool) -> Result<(), HalError> {
        (**self).write(pin, level)
    }
}

// Platform implementations
#[cfg(feature = "raspberry-pi")]
pub mod raspberry_pi;

#[cfg(feature = "raspberry-pi")]
pub use raspberry_pi::{RaspberryPiGpio, RaspberryPiSpi};
