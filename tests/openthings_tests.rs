//! Tests for the OpenThings codec and record value handling.

use chrono::Utc;
use mihome_rs::codec::{Codec, Message, RadioMode};
use mihome_rs::openthings::{
    decode_openthings, encode_openthings, Manufacturer, OtCodec, OtDataType, OtMessage,
    OtParameter, OtRecord, OT_MIN_SIZE,
};
use mihome_rs::MiHomeError;
use proptest::prelude::*;

/// eTRV report: TEMPERATURE 21.5 °C as DEC_8 and BATTERY_LEVEL 3.0 V as UDEC_8
fn etrv_report() -> Vec<u8> {
    vec![
        0x12, 0x04, 0x03, 0xBE, 0xEF, 0x00, 0x0A, 0x1B, 0xF4, 0x92, 0x15, 0x80, 0xE2, 0x22,
        0x03, 0x00, 0x00, 0x00, 0x00,
    ]
}

#[test]
fn test_decode_etrv_report() {
    let msg = decode_openthings(&etrv_report(), Utc::now()).unwrap();
    assert_eq!(msg.manufacturer(), Manufacturer::Energenie);
    assert_eq!(msg.product(), 0x03);
    assert_eq!(msg.sensor(), 0x000A1B);

    let temperature = msg.record(OtParameter::TEMPERATURE).unwrap();
    assert_eq!(temperature.datatype, OtDataType::Dec8);
    assert_eq!(temperature.float_value().unwrap(), 21.5);

    let battery = msg.record(OtParameter::BATTERY_LEVEL).unwrap();
    assert_eq!(battery.datatype, OtDataType::Udec8);
    assert_eq!(battery.float_value().unwrap(), 3.0);
}

#[test]
fn test_encode_length_byte_and_footer() {
    let msg = OtMessage::new(Manufacturer::Energenie, 0x02, 0x123456)
        .with_record(OtRecord::bool(OtParameter::SWITCH_STATE, true, true));
    let payload = encode_openthings(&msg);
    assert_eq!(usize::from(payload[0]), payload.len() - 1);
    assert_eq!(&payload[5..8], &[0x12, 0x34, 0x56]);
    assert_eq!(&payload[8..11], &[0xF3, 0x01, 0x01]);
    assert_eq!(&payload[payload.len() - 3..], &[0x00, 0x00, 0x00]);
}

#[test]
fn test_pip_varies() {
    let msg = OtMessage::new(Manufacturer::Energenie, 0x03, 1)
        .with_record(OtRecord::null(OtParameter::IDENTIFY, true));
    let pips: std::collections::HashSet<[u8; 2]> = (0..16)
        .map(|_| {
            let p = encode_openthings(&msg);
            [p[3], p[4]]
        })
        .collect();
    assert!(pips.len() > 1);
}

#[test]
fn test_decode_rejects_corruption() {
    assert!(matches!(
        decode_openthings(&etrv_report()[..OT_MIN_SIZE - 1], Utc::now()),
        Err(MiHomeError::MessageCorruption(_))
    ));

    // Terminator replaced by a record header that runs off the end
    let mut unterminated = etrv_report();
    unterminated[16] = 0x80;
    unterminated[17] = 0x0F;
    assert!(matches!(
        decode_openthings(&unterminated, Utc::now()),
        Err(MiHomeError::MessageCorruption(_))
    ));

    let mut overlong = etrv_report();
    overlong[0] = 0x40;
    assert!(decode_openthings(&overlong, Utc::now()).is_err());
}

#[test]
fn test_parameter_zero_not_encoded() {
    let msg = OtMessage::new(Manufacturer::Energenie, 0x03, 1)
        .with_record(OtRecord::null(OtParameter::new(0), false));
    assert!(encode_openthings(&msg).is_empty());
}

#[test]
fn test_codec_trait() {
    let codec = OtCodec;
    assert_eq!(codec.name(), "openthings");
    assert_eq!(codec.mode(), RadioMode::Monitor);

    let ook: Message = mihome_rs::OokMessage::new(1, 1, true).unwrap().into();
    assert!(codec.encode(&ook).is_empty());

    let decoded = codec.decode(&etrv_report(), Utc::now()).unwrap();
    assert_eq!(decoded.as_openthings().map(|m| m.sensor()), Some(0x000A1B));
}

#[test]
fn test_signed_values() {
    let r = OtRecord::float(OtParameter::TEMPERATURE, true, -5.25, OtDataType::Dec8).unwrap();
    assert_eq!(r.data, vec![0x85, 0x40]);
    assert_eq!(r.float_value().unwrap(), -5.25);
    assert_eq!(r.int_value().unwrap(), -5);
    assert!(matches!(r.uint_value(), Err(MiHomeError::BadParameter(_))));
}

#[test]
fn test_serialize_message() {
    let msg: Message = decode_openthings(&etrv_report(), Utc::now()).unwrap().into();
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["protocol"], "open_things");
    assert_eq!(json["records"][0]["parameter"], "TEMPERATURE");
}

#[test]
fn test_udec8_value_survives_the_wire() {
    let msg = OtMessage::new(Manufacturer::Energenie, 0x05, 0x77).with_record(
        OtRecord::float(OtParameter::VOLTAGE, true, 12.5, OtDataType::Udec8).unwrap(),
    );
    let decoded = decode_openthings(&encode_openthings(&msg), Utc::now()).unwrap();
    let voltage = decoded.record(OtParameter::VOLTAGE).unwrap();
    assert_eq!(voltage.data, vec![0x0C, 0x80]);
    assert_eq!(voltage.float_value().unwrap(), 12.5);
}

#[test]
fn test_duplicate_depends_on_record_order() {
    let power = OtRecord::uint(OtParameter::REAL_POWER, true, 230);
    let switch = OtRecord::bool(OtParameter::SWITCH_STATE, true, true);
    let a = OtMessage::new(Manufacturer::Energenie, 0x02, 0x99)
        .with_record(power.clone())
        .with_record(switch.clone());
    let b = decode_openthings(&encode_openthings(&a), Utc::now()).unwrap();
    assert!(a.is_duplicate(&b));

    let swapped = OtMessage::new(Manufacturer::Energenie, 0x02, 0x99)
        .with_record(switch)
        .with_record(power);
    assert!(!a.is_duplicate(&swapped));
}

fn datatype() -> impl Strategy<Value = OtDataType> {
    prop_oneof![
        Just(OtDataType::Udec0),
        Just(OtDataType::Udec8),
        Just(OtDataType::Udec16),
        Just(OtDataType::String),
        Just(OtDataType::Dec0),
        Just(OtDataType::Dec8),
        Just(OtDataType::Enum),
        Just(OtDataType::Float),
    ]
}

fn record() -> impl Strategy<Value = OtRecord> {
    (
        1u8..=0x7F,
        any::<bool>(),
        datatype(),
        proptest::collection::vec(any::<u8>(), 0..=15),
    )
        .prop_map(|(id, report, datatype, data)| {
            OtRecord::new(OtParameter::new(id), report, datatype, data).unwrap()
        })
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode(
        product in any::<u8>(),
        sensor in 0u32..=0xFF_FFFF,
        records in proptest::collection::vec(record(), 0..8),
    ) {
        let mut msg = OtMessage::new(Manufacturer::Energenie, product, sensor);
        for r in records {
            msg.append(r);
        }
        let payload = encode_openthings(&msg);
        let decoded = decode_openthings(&payload, Utc::now()).unwrap();
        prop_assert!(decoded.is_duplicate(&msg));
    }

    #[test]
    fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..80)) {
        let _ = decode_openthings(&data, Utc::now());
    }
}
