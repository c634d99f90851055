//! # Codec Abstraction
//!
//! A codec turns a [`Message`] into an over-the-air payload and back. The
//! gateway holds an ordered list of codecs; the first one that produces a
//! non-empty payload transmits, and the first one that decodes an inbound
//! payload wins.

use crate::error::MiHomeError;
use crate::ook::OokMessage;
use crate::openthings::OtMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Radio personality a codec needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioMode {
    /// Radio idle; for a codec, valid in every mode
    None,
    /// FSK at 434.3 MHz, OpenThings telemetry
    Monitor,
    /// OOK at 433.92 MHz, socket control
    Control,
}

/// A decoded or to-be-encoded message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum Message {
    Ook(OokMessage),
    OpenThings(OtMessage),
}

impl Message {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Message::Ook(m) => m.timestamp(),
            Message::OpenThings(m) => m.timestamp(),
        }
    }

    pub fn as_ook(&self) -> Option<&OokMessage> {
        match self {
            Message::Ook(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_openthings(&self) -> Option<&OtMessage> {
        match self {
            Message::OpenThings(m) => Some(m),
            _ => None,
        }
    }
}

impl From<OokMessage> for Message {
    fn from(m: OokMessage) -> Self {
        Message::Ook(m)
    }
}

impl From<OtMessage> for Message {
    fn from(m: OtMessage) -> Self {
        Message::OpenThings(m)
    }
}

/// Wire protocol encoder/decoder
pub trait Codec: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Radio personality required to send and receive this protocol
    fn mode(&self) -> RadioMode;

    /// Encode `message`; an empty payload means "not mine".
    fn encode(&self, message: &Message) -> Vec<u8>;

    /// Decode an inbound payload received at `timestamp`.
    fn decode(&self, payload: &[u8], timestamp: DateTime<Utc>) -> Result<Message, MiHomeError>;
}
