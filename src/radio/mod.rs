//! # Radio Layer
//!
//! RFM69 transceiver support: the hardware abstraction traits, the register
//! map, the async driver and an in-memory mock of the chip.

pub mod hal;
pub mod mock;
pub mod rfm69;
pub mod rfm69_registers;

pub use hal::{GpioPort, HalError, PinDirection, SpiBus};
pub use rfm69::{RadioState, ReceivedPacket, ResetPin, Rfm69};
pub use rfm69_registers::Mode;
