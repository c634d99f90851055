//! # OpenThings Protocol
//!
//! OpenThings is the self-describing telemetry protocol spoken by Energenie
//! MiHome devices (energy monitors, adaptor plugs, radiator valves, sensors)
//! over FSK at 434.3 MHz.
//!
//! ## Message Layout
//!
//! ```text
//! len | mfr | product | pip(2) | sensor(3) | records... | 00 | crc(2)
//! ```
//!
//! Each record is `param | type | data`: bit 7 of `param` flags a report,
//! the high nibble of `type` is the [`OtDataType`] and the low nibble the
//! data size.

pub mod codec;
pub mod message;
pub mod parameters;
pub mod record;

pub use codec::{decode_openthings, encode_openthings, OtCodec, OT_HEADER_SIZE, OT_MIN_SIZE};
pub use message::OtMessage;
pub use parameters::OtParameter;
pub use record::{OtDataType, OtRecord, MAX_RECORD_DATA};

use serde::Serialize;

/// Manufacturer ids known to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Manufacturer {
    Sentec = 0x01,
    Hildebrand = 0x02,
    Rasberry = 0x03,
    Energenie = 0x04,
}

impl Manufacturer {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x01 => Some(Manufacturer::Sentec),
            0x02 => Some(Manufacturer::Hildebrand),
            0x03 => Some(Manufacturer::Rasberry),
            0x04 => Some(Manufacturer::Energenie),
            _ => None,
        }
    }
}
