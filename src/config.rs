//! # Gateway Configuration
//!
//! Hardware wiring and transmit tuning for a [`MiHome`](crate::mihome::MiHome)
//! gateway, loaded from a JSON file. Every field has a default matching the
//! Energenie ENER314-RT board, so an empty object `{}` is a valid file.

use crate::codec::RadioMode;
use crate::error::MiHomeError;
use crate::radio::rfm69_registers::AES_KEY_SIZE;
use crate::util::hex::decode_hex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// SPI clock ceiling accepted by the Raspberry Pi HAL
const MAX_SPI_SPEED_HZ: u32 = 10_000_000;

fn default_spi_slave() -> u8 {
    1
}

fn default_spi_speed_hz() -> u32 {
    1_000_000
}

fn default_reset_pin() -> Option<u8> {
    Some(25)
}

fn default_tx_led_pin() -> Option<u8> {
    Some(27)
}

fn default_ook_tx_repeat() -> usize {
    8
}

fn default_openthings_tx_repeat() -> usize {
    4
}

fn default_initial_mode() -> RadioMode {
    RadioMode::Monitor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default)]
    pub spi_bus: u8,
    /// Chip select; CE1 on the ENER314-RT
    #[serde(default = "default_spi_slave")]
    pub spi_slave: u8,
    #[serde(default = "default_spi_speed_hz")]
    pub spi_speed_hz: u32,
    /// BCM pin wired to the RFM69 reset line
    #[serde(default = "default_reset_pin")]
    pub reset_pin: Option<u8>,
    /// BCM pin of the activity LED lit while transmitting
    #[serde(default = "default_tx_led_pin")]
    pub tx_led_pin: Option<u8>,
    #[serde(default = "default_ook_tx_repeat")]
    pub ook_tx_repeat: usize,
    #[serde(default = "default_openthings_tx_repeat")]
    pub openthings_tx_repeat: usize,
    #[serde(default)]
    pub inter_packet_delay_ms: u64,
    /// Added to the raw on-chip temperature reading, °C
    #[serde(default)]
    pub temperature_calibration: i32,
    /// 16-byte AES key as hex, applied in monitor mode
    #[serde(default)]
    pub aes_key: Option<String>,
    #[serde(default = "default_initial_mode")]
    pub initial_mode: RadioMode,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            spi_bus: 0,
            spi_slave: default_spi_slave(),
            spi_speed_hz: default_spi_speed_hz(),
            reset_pin: default_reset_pin(),
            tx_led_pin: default_tx_led_pin(),
            ook_tx_repeat: default_ook_tx_repeat(),
            openthings_tx_repeat: default_openthings_tx_repeat(),
            inter_packet_delay_ms: 0,
            temperature_calibration: 0,
            aes_key: None,
            initial_mode: default_initial_mode(),
        }
    }
}

impl GatewayConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MiHomeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MiHomeError::Config(format!("failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| MiHomeError::Config(format!("'{}': {}", path.display(), e)))
    }

    pub fn from_json(json: &str) -> Result<Self, MiHomeError> {
        let config: GatewayConfig = serde_json::from_str(json)
            .map_err(|e| MiHomeError::Config(format!("invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, MiHomeError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MiHomeError::Config(format!("failed to serialize: {}", e)))
    }

    pub fn validate(&self) -> Result<(), MiHomeError> {
        if self.spi_speed_hz == 0 || self.spi_speed_hz > MAX_SPI_SPEED_HZ {
            return Err(MiHomeError::Config(format!(
                "spi_speed_hz {} outside 1-{}",
                self.spi_speed_hz, MAX_SPI_SPEED_HZ
            )));
        }
        if self.ook_tx_repeat == 0 || self.openthings_tx_repeat == 0 {
            return Err(MiHomeError::Config("transmit repeat counts must be at least 1".into()));
        }
        if self.reset_pin.is_some() && self.reset_pin == self.tx_led_pin {
            return Err(MiHomeError::Config(
                "reset_pin and tx_led_pin share a GPIO".into(),
            ));
        }
        self.aes_key()?;
        Ok(())
    }

    /// Decoded AES key, if one is configured
    pub fn aes_key(&self) -> Result<Option<[u8; AES_KEY_SIZE]>, MiHomeError> {
        let Some(text) = &self.aes_key else {
            return Ok(None);
        };
        let bytes = decode_hex(text)
            .map_err(|e| MiHomeError::Config(format!("aes_key: {}", e)))?;
        let key: [u8; AES_KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            MiHomeError::Config(format!(
                "aes_key is {} bytes, expected {}",
                bytes.len(),
                AES_KEY_SIZE
            ))
        })?;
        Ok(Some(key))
    }

    pub fn inter_packet_delay(&self) -> Duration {
        Duration::from_millis(self.inter_packet_delay_ms)
    }
}
