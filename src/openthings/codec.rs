//! OpenThings wire encoding and decoding.

use super::message::OtMessage;
use super::parameters::OtParameter;
use super::record::{OtDataType, OtRecord, MAX_RECORD_DATA};
use super::Manufacturer;
use crate::codec::{Codec, Message, RadioMode};
use crate::error::MiHomeError;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use nom::bytes::complete::{tag, take};
use nom::combinator::verify;
use nom::multi::many_till;
use nom::number::complete::be_u8;
use nom::IResult;

/// Length, manufacturer, product, PIP and sensor id
pub const OT_HEADER_SIZE: usize = 8;

/// Header plus terminator and checksum
pub const OT_MIN_SIZE: usize = OT_HEADER_SIZE + 3;

const TERMINATOR: u8 = 0x00;
const REPORT_FLAG: u8 = 0x80;

/// Encode `message`. Returns an empty payload if it would not fit the
/// one-byte length field.
pub fn encode_openthings(message: &OtMessage) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(64);

    buf.put_u8(0); // length, patched below
    buf.put_u8(message.manufacturer().id() & 0x7F);
    buf.put_u8(message.product());
    buf.put_u16(rand::random::<u16>());
    let sensor = message.sensor().to_be_bytes();
    buf.put_slice(&sensor[1..]);

    for record in message.records() {
        if record.data.len() > MAX_RECORD_DATA {
            warn!(
                "OpenThings record {} carries {} bytes, not encoding",
                record.parameter,
                record.data.len()
            );
            return Vec::new();
        }
        let flag = if record.is_report { REPORT_FLAG } else { 0 };
        let parameter = flag | record.parameter.id();
        if parameter == TERMINATOR {
            warn!("OpenThings parameter 0x00 would read as the terminator, not encoding");
            return Vec::new();
        }
        buf.put_u8(parameter);
        buf.put_u8((record.datatype.nibble() << 4) | record.data.len() as u8);
        buf.put_slice(&record.data);
    }

    buf.put_u8(TERMINATOR);
    buf.put_u16(0); // CRC placeholder

    let length = buf.len() - 1;
    if length > usize::from(u8::MAX) {
        warn!("OpenThings message of {} bytes exceeds the length field", length);
        return Vec::new();
    }
    buf[0] = length as u8;
    buf.to_vec()
}

/// (parameter byte, type byte, data)
type RawRecord<'a> = (u8, u8, &'a [u8]);

fn raw_record(input: &[u8]) -> IResult<&[u8], RawRecord<'_>> {
    let (input, parameter) = verify(be_u8, |b: &u8| *b != TERMINATOR)(input)?;
    let (input, type_byte) = be_u8(input)?;
    let (input, data) = take((type_byte & 0x0F) as usize)(input)?;
    Ok((input, (parameter, type_byte, data)))
}

/// Records up to and including the terminator; the remainder (checksum) is
/// returned untouched.
fn raw_records(input: &[u8]) -> IResult<&[u8], Vec<RawRecord<'_>>> {
    let (rest, (records, _)) = many_till(raw_record, tag(&[TERMINATOR][..]))(input)?;
    Ok((rest, records))
}

/// Decode an OpenThings payload. The checksum is not verified and bytes
/// beyond the length field are ignored.
pub fn decode_openthings(payload: &[u8], timestamp: DateTime<Utc>) -> Result<OtMessage, MiHomeError> {
    if payload.len() < OT_MIN_SIZE {
        return Err(MiHomeError::MessageCorruption(format!(
            "OpenThings payload of {} bytes is shorter than {}",
            payload.len(),
            OT_MIN_SIZE
        )));
    }
    let length = usize::from(payload[0]);
    if length + 1 > payload.len() {
        return Err(MiHomeError::MessageCorruption(format!(
            "length field claims {} bytes, {} present",
            length,
            payload.len() - 1
        )));
    }
    if length + 1 < OT_MIN_SIZE {
        return Err(MiHomeError::MessageCorruption(format!(
            "length field {} is below the minimum message size",
            length
        )));
    }
    let frame = &payload[..=length];

    let manufacturer = Manufacturer::from_id(frame[1] & 0x7F).ok_or_else(|| {
        MiHomeError::MessageCorruption(format!("unknown manufacturer 0x{:02X}", frame[1] & 0x7F))
    })?;
    let product = frame[2];
    let pip = u16::from_be_bytes([frame[3], frame[4]]);
    let sensor = u32::from_be_bytes([0, frame[5], frame[6], frame[7]]);

    let (_checksum, raw) = raw_records(&frame[OT_HEADER_SIZE..]).map_err(|_| {
        MiHomeError::MessageCorruption(format!(
            "record stream from sensor 0x{:06X} is truncated or unterminated",
            sensor
        ))
    })?;

    let mut message = OtMessage::with_timestamp(manufacturer, product, sensor, timestamp);
    for (parameter, type_byte, data) in raw {
        let datatype = OtDataType::from_nibble(type_byte >> 4).ok_or_else(|| {
            MiHomeError::MessageCorruption(format!("unknown datatype 0x{:X}", type_byte >> 4))
        })?;
        message.append(OtRecord {
            parameter: OtParameter::new(parameter),
            is_report: parameter & REPORT_FLAG != 0,
            datatype,
            data: data.to_vec(),
        });
    }

    debug!(
        "OpenThings {:?} product 0x{:02X} sensor 0x{:06X} pip 0x{:04X}: {} records",
        manufacturer,
        product,
        sensor,
        pip,
        message.records().len()
    );
    Ok(message)
}

/// [`Codec`] for OpenThings telemetry
#[derive(Debug, Default, Clone, Copy)]
pub struct OtCodec;

impl Codec for OtCodec {
    fn name(&self) -> &'static str {
        "openthings"
    }

    fn mode(&self) -> RadioMode {
        RadioMode::Monitor
    }

    fn encode(&self, message: &Message) -> Vec<u8> {
        match message {
            Message::OpenThings(m) => encode_openthings(m),
            _ => Vec::new(),
        }
    }

    fn decode(&self, payload: &[u8], timestamp: DateTime<Utc>) -> Result<Message, MiHomeError> {
        decode_openthings(payload, timestamp).map(Message::OpenThings)
    }
}
