//! # MiHome Error Handling
//!
//! This module defines the MiHomeError enum, which represents the different error
//! types that can occur in the mihome-rs crate, from register verification in the
//! RFM69 driver up to queue bookkeeping in the gateway.

use crate::radio::hal::HalError;
use thiserror::Error;

/// Represents the different error types that can occur in the MiHome crate.
#[derive(Debug, Error)]
pub enum MiHomeError {
    /// The caller supplied an out-of-range or missing value. Raised before any I/O.
    #[error("Bad parameter: {0}")]
    BadParameter(String),

    /// The operation is not valid in the current radio mode.
    #[error("Out of order: {0}")]
    OutOfOrder(String),

    /// A register read back a different value than was written.
    #[error("Unexpected response from register 0x{register:02X}: wrote 0x{expected:02X}, read 0x{actual:02X}")]
    UnexpectedResponse { register: u8, expected: u8, actual: u8 },

    /// A bounded poll exceeded its ceiling.
    #[error("Device timeout waiting for {0}")]
    DeviceTimeout(String),

    /// A payload violates its wire-format invariants.
    #[error("Message corruption: {0}")]
    MessageCorruption(String),

    /// A queued request already carries the requested value.
    #[error("Not modified")]
    NotModified,

    /// The wire datatype is recognised but not supported.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Bus or GPIO failure, propagated unchanged.
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MiHomeError {
    /// Conditions the receive loop can ride out without resetting the radio.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MiHomeError::DeviceTimeout(_))
    }
}
