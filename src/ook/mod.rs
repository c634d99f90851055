//! # OOK Socket Control
//!
//! Energenie "legacy" remote sockets listen for a fixed 16-byte on-off-keyed
//! frame carrying a 20-bit house address and a 4-bit command. There is no
//! reply channel.

pub mod codec;

pub use codec::{decode_ook, encode_ook, OokCodec, OOK_PAYLOAD_SIZE, OOK_PREAMBLE};

use crate::error::MiHomeError;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Largest 20-bit house address
pub const MAX_ADDRESS: u32 = 0xF_FFFF;

/// Highest socket number; socket 0 addresses every socket at the address
pub const MAX_SOCKET: u8 = 4;

/// One socket command
#[derive(Debug, Clone, Serialize)]
pub struct OokMessage {
    address: u32,
    socket: u8,
    state: bool,
    timestamp: DateTime<Utc>,
}

impl OokMessage {
    pub fn new(address: u32, socket: u8, state: bool) -> Result<Self, MiHomeError> {
        Self::with_timestamp(address, socket, state, Utc::now())
    }

    pub fn with_timestamp(
        address: u32,
        socket: u8,
        state: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, MiHomeError> {
        if address > MAX_ADDRESS {
            return Err(MiHomeError::BadParameter(format!(
                "OOK address 0x{:X} exceeds 20 bits",
                address
            )));
        }
        if socket > MAX_SOCKET {
            return Err(MiHomeError::BadParameter(format!(
                "OOK socket {} out of range 0-{}",
                socket, MAX_SOCKET
            )));
        }
        Ok(Self {
            address,
            socket,
            state,
            timestamp,
        })
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn socket(&self) -> u8 {
        self.socket
    }

    /// `true` = on
    pub fn state(&self) -> bool {
        self.state
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl PartialEq for OokMessage {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.socket == other.socket && self.state == other.state
    }
}

impl Eq for OokMessage {}
