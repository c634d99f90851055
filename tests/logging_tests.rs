//! Unit tests for the logging functionality in the `mihome-rs` crate.

use mihome_rs::logging::{log_debug, log_error, log_info, log_warn, try_init_logger};
use mihome_rs::util::logging::{log_payload_hex, LogThrottle};

/// Tests that the logging helpers work once a logger is installed.
#[test]
fn test_logging() {
    try_init_logger();
    log_error("This is an error message");
    log_warn("This is a warning message");
    log_info("This is an info message");
    log_debug("This is a debug message");
    log_payload_hex("payload", &[0x80, 0x00, 0x00, 0x00, 0x8E]);
    log_payload_hex("long payload", &[0xEE; 200]);
}

/// A second install attempt reports that a logger is already present.
#[test]
fn test_try_init_logger_twice() {
    try_init_logger();
    assert!(!try_init_logger());
}

#[test]
fn test_throttled_macro() {
    try_init_logger();
    let mut throttle = LogThrottle::new(60_000, 2);
    for i in 0..5 {
        mihome_rs::log_warn_throttled!(throttle, "stray packet {}", i);
    }
    assert_eq!(throttle.suppressed(), 3);
}
