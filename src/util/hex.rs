//! # Hex Encoding/Decoding Utilities
//!
//! Hex helpers used for payload logging, the AES key in the gateway
//! configuration, and test vectors.
//!
//! ## Usage
//!
//! ```rust
//! use mihome_rs::util::hex::{encode_hex, decode_hex, pretty_hex};
//!
//! let data = [0x80, 0x00, 0x00, 0x00];
//! assert_eq!(encode_hex(&data), "80000000");
//! assert_eq!(decode_hex("80 00 00 00").unwrap(), data);
//! println!("{}", pretty_hex(&data, 16));
//! ```

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to lowercase hex string
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode hex string to bytes
///
/// Accepts both cases; whitespace is stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Hex dump with offsets and an ASCII column
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    let bytes_per_line = bytes_per_line.max(1);
    data.chunks(bytes_per_line)
        .enumerate()
        .map(|(i, chunk)| {
            let hex = format_hex_compact(chunk);
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!(
                "{:04x}: {:<width$} |{}|",
                i * bytes_per_line,
                hex,
                ascii,
                width = bytes_per_line * 3 - 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Space-separated hex, e.g. "80 00 00 00"
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
