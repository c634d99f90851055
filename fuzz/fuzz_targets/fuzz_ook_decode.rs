#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use mihome_rs::ook::{decode_ook, encode_ook};

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = decode_ook(data, Utc::now()) {
        // A frame that decodes is exactly the canonical encoding
        assert_eq!(encode_ook(&msg), data[..16].to_vec());
    }
});
