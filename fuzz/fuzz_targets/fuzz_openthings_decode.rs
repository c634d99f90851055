#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use mihome_rs::openthings::{decode_openthings, encode_openthings};

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = decode_openthings(data, Utc::now()) else {
        return;
    };

    // Every decoded record must survive value extraction
    for record in msg.records() {
        let _ = record.float_value();
        let _ = record.int_value();
        let _ = record.uint_value();
        let _ = record.bool_value();
    }

    // Re-encoding a decoded message yields a decodable payload
    let payload = encode_openthings(&msg);
    if !payload.is_empty() {
        let again = decode_openthings(&payload, Utc::now()).expect("re-encoded payload decodes");
        assert!(again.is_duplicate(&msg));
    }
});
