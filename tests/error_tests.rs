//! Unit tests for the `MiHomeError` enum and its associated `Display` trait implementation.

use mihome_rs::radio::HalError;
use mihome_rs::util::HexError;
use mihome_rs::MiHomeError;

/// Tests that the `BadParameter` variant is correctly formatted.
#[test]
fn test_bad_parameter_error() {
    let err = MiHomeError::BadParameter("socket 7".to_string());
    assert_eq!(err.to_string(), "Bad parameter: socket 7");
}

/// Tests that the `UnexpectedResponse` variant reports register and values in hex.
#[test]
fn test_unexpected_response_error() {
    let err = MiHomeError::UnexpectedResponse {
        register: 0x10,
        expected: 0x24,
        actual: 0x22,
    };
    assert_eq!(
        err.to_string(),
        "Unexpected response from register 0x10: wrote 0x24, read 0x22"
    );
}

#[test]
fn test_device_timeout_error() {
    let err = MiHomeError::DeviceTimeout("mode ready".to_string());
    assert_eq!(err.to_string(), "Device timeout waiting for mode ready");
    assert!(err.is_recoverable());
}

#[test]
fn test_not_modified_error() {
    assert_eq!(MiHomeError::NotModified.to_string(), "Not modified");
    assert!(!MiHomeError::NotModified.is_recoverable());
}

/// Tests that HAL errors convert through `?` and keep their message.
#[test]
fn test_hal_error_conversion() {
    fn fails() -> Result<(), MiHomeError> {
        Err(HalError::Spi("bus stuck".to_string()))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(matches!(err, MiHomeError::Hal(HalError::Spi(_))));
    assert_eq!(err.to_string(), "HAL error: SPI communication error: bus stuck");
    assert!(!err.is_recoverable());
}

#[test]
fn test_hex_error_display() {
    assert_eq!(HexError::OddLength(3).to_string(), "Odd number of hex characters: 3");
    assert_eq!(HexError::EmptyString.to_string(), "Empty hex string");
}
