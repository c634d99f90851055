//! Tests for loading `GatewayConfig` from JSON files.

use mihome_rs::codec::RadioMode;
use mihome_rs::{GatewayConfig, MiHomeError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = write_config(
        r#"{
            "spi_slave": 0,
            "reset_pin": 22,
            "tx_led_pin": null,
            "ook_tx_repeat": 12,
            "inter_packet_delay_ms": 25,
            "temperature_calibration": -4,
            "aes_key": "000102030405060708090a0b0c0d0e0f",
            "initial_mode": "control"
        }"#,
    );
    let config = GatewayConfig::from_file(file.path()).unwrap();
    assert_eq!(config.spi_slave, 0);
    assert_eq!(config.reset_pin, Some(22));
    assert_eq!(config.tx_led_pin, None);
    assert_eq!(config.ook_tx_repeat, 12);
    assert_eq!(config.openthings_tx_repeat, 4);
    assert_eq!(config.inter_packet_delay().as_millis(), 25);
    assert_eq!(config.temperature_calibration, -4);
    assert_eq!(config.initial_mode, RadioMode::Control);
    assert_eq!(config.aes_key().unwrap().unwrap()[15], 0x0F);
}

#[test]
fn test_saved_config_reloads() {
    let config = GatewayConfig {
        initial_mode: RadioMode::None,
        spi_speed_hz: 4_000_000,
        ..Default::default()
    };
    let file = write_config(&config.to_json().unwrap());
    assert_eq!(GatewayConfig::from_file(file.path()).unwrap(), config);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = GatewayConfig::from_file(dir.path().join("absent.json"));
    assert!(matches!(result, Err(MiHomeError::Config(_))));
}

#[test]
fn test_malformed_files() {
    let file = write_config("{ not json");
    assert!(matches!(
        GatewayConfig::from_file(file.path()),
        Err(MiHomeError::Config(_))
    ));

    let file = write_config(r#"{"aes_key": "zz"}"#);
    assert!(matches!(
        GatewayConfig::from_file(file.path()),
        Err(MiHomeError::Config(_))
    ));

    let file = write_config(r#"{"initial_mode": "turbo"}"#);
    assert!(GatewayConfig::from_file(file.path()).is_err());
}
