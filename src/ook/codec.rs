//! OOK frame encoding.
//!
//! Frame layout (16 bytes):
//!
//! ```text
//! 80 00 00 00 | 12 bytes of symbols
//! ```
//!
//! The 24 source bits `address[19:0] ++ command[3:0]` are sent two per byte,
//! each bit as a 4-bit symbol: `0` => `1000`, `1` => `1110`.

use super::OokMessage;
use crate::codec::{Codec, Message, RadioMode};
use crate::error::MiHomeError;
use chrono::{DateTime, Utc};
use log::warn;

/// Frame preamble
pub const OOK_PREAMBLE: [u8; 4] = [0x80, 0x00, 0x00, 0x00];

/// Encoded frame length
pub const OOK_PAYLOAD_SIZE: usize = 16;

const SYMBOL_ZERO: u8 = 0x8;
const SYMBOL_ONE: u8 = 0xE;

/// (socket, on nibble, off nibble)
const COMMANDS: [(u8, u8, u8); 5] = [
    (0, 0xB, 0x3),
    (1, 0xF, 0x7),
    (2, 0xE, 0x6),
    (3, 0xD, 0x5),
    (4, 0xC, 0x4),
];

fn command_nibble(socket: u8, state: bool) -> Option<u8> {
    COMMANDS
        .iter()
        .find(|(s, _, _)| *s == socket)
        .map(|&(_, on, off)| if state { on } else { off })
}

fn command_from_nibble(nibble: u8) -> Option<(u8, bool)> {
    COMMANDS.iter().find_map(|&(socket, on, off)| {
        if nibble == on {
            Some((socket, true))
        } else if nibble == off {
            Some((socket, false))
        } else {
            None
        }
    })
}

fn symbol(bit: u8) -> u8 {
    if bit & 1 == 1 {
        SYMBOL_ONE
    } else {
        SYMBOL_ZERO
    }
}

fn bit(symbol: u8) -> Result<u8, MiHomeError> {
    match symbol {
        SYMBOL_ZERO => Ok(0),
        SYMBOL_ONE => Ok(1),
        other => Err(MiHomeError::MessageCorruption(format!(
            "invalid OOK symbol 0x{:X}",
            other
        ))),
    }
}

/// Encode a socket command into its 16-byte frame. A socket outside the
/// command table encodes to an empty payload.
pub fn encode_ook(message: &OokMessage) -> Vec<u8> {
    let Some(command) = command_nibble(message.socket(), message.state()) else {
        warn!("No OOK command for socket {}, not encoding", message.socket());
        return Vec::new();
    };
    let address = message.address();
    let source = [
        (address >> 12) as u8,
        (address >> 4) as u8,
        ((address << 4) as u8) | command,
    ];

    let mut out = Vec::with_capacity(OOK_PAYLOAD_SIZE);
    out.extend_from_slice(&OOK_PREAMBLE);
    for byte in source {
        for shift in [6u8, 4, 2, 0] {
            out.push((symbol(byte >> (shift + 1)) << 4) | symbol(byte >> shift));
        }
    }
    out
}

/// Decode a 16-byte frame.
pub fn decode_ook(payload: &[u8], timestamp: DateTime<Utc>) -> Result<OokMessage, MiHomeError> {
    if payload.len() != OOK_PAYLOAD_SIZE {
        return Err(MiHomeError::MessageCorruption(format!(
            "OOK frame is {} bytes, expected {}",
            payload.len(),
            OOK_PAYLOAD_SIZE
        )));
    }
    if payload[..OOK_PREAMBLE.len()] != OOK_PREAMBLE {
        return Err(MiHomeError::MessageCorruption("bad OOK preamble".into()));
    }

    let mut source = [0u8; 3];
    for (i, chunk) in payload[OOK_PREAMBLE.len()..].chunks(4).enumerate() {
        let mut byte = 0u8;
        for &b in chunk {
            byte = (byte << 2) | (bit(b >> 4)? << 1) | bit(b & 0x0F)?;
        }
        source[i] = byte;
    }

    let address = (u32::from(source[0]) << 12)
        | (u32::from(source[1]) << 4)
        | u32::from(source[2] >> 4);
    let (socket, state) = command_from_nibble(source[2] & 0x0F).ok_or_else(|| {
        MiHomeError::MessageCorruption(format!(
            "unknown OOK command 0x{:X}",
            source[2] & 0x0F
        ))
    })?;

    OokMessage::with_timestamp(address, socket, state, timestamp)
}

/// [`Codec`] for OOK socket control
#[derive(Debug, Default, Clone, Copy)]
pub struct OokCodec;

impl Codec for OokCodec {
    fn name(&self) -> &'static str {
        "ook"
    }

    fn mode(&self) -> RadioMode {
        RadioMode::Control
    }

    fn encode(&self, message: &Message) -> Vec<u8> {
        match message {
            Message::Ook(m) => encode_ook(m),
            _ => Vec::new(),
        }
    }

    fn decode(&self, payload: &[u8], timestamp: DateTime<Utc>) -> Result<Message, MiHomeError> {
        decode_ook(payload, timestamp).map(Message::Ook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_frame() {
        // Address 0x6C6C6, socket 1 on
        let msg = OokMessage::new(0x6C6C6, 1, true).unwrap();
        let frame = encode_ook(&msg);
        assert_eq!(frame.len(), OOK_PAYLOAD_SIZE);
        assert_eq!(&frame[..4], &OOK_PREAMBLE);
        // 0x6C => 01 10 11 00
        assert_eq!(&frame[4..8], &[0x8E, 0xE8, 0xEE, 0x88]);
        // Last source byte 0x6F => 01 10 11 11
        assert_eq!(&frame[12..16], &[0x8E, 0xE8, 0xEE, 0xEE]);
    }

    #[test]
    fn test_command_table() {
        for (socket, on, off) in COMMANDS {
            assert_eq!(command_nibble(socket, true), Some(on));
            assert_eq!(command_nibble(socket, false), Some(off));
            assert_eq!(command_from_nibble(on), Some((socket, true)));
            assert_eq!(command_from_nibble(off), Some((socket, false)));
        }
        assert_eq!(command_from_nibble(0x0), None);
        assert_eq!(command_nibble(5, true), None);
    }

    #[test]
    fn test_unmapped_socket_encodes_nothing() {
        let msg = OokMessage {
            address: 0x6C6C6,
            socket: 7,
            state: false,
            timestamp: Utc::now(),
        };
        assert!(encode_ook(&msg).is_empty());
        assert!(OokCodec.encode(&Message::Ook(msg)).is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_symbol() {
        let msg = OokMessage::new(0x12345, 0, false).unwrap();
        let mut frame = encode_ook(&msg);
        frame[9] = 0x8A;
        assert!(matches!(
            decode_ook(&frame, Utc::now()),
            Err(MiHomeError::MessageCorruption(_))
        ));
    }

    #[test]
    fn test_codec_ignores_other_messages() {
        let codec = OokCodec;
        let ot = crate::openthings::OtMessage::new(crate::openthings::Manufacturer::Energenie, 2, 1);
        assert!(codec.encode(&Message::OpenThings(ot)).is_empty());
    }
}
