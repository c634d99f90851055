//! # Utility Modules
//!
//! Hex formatting and rate-limited logging shared by the radio driver, the
//! codecs and the gateway.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_hex_compact, pretty_hex, HexError};
pub use logging::{log_payload_hex, LogThrottle};
