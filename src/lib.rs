//! # mihome-rs - A Rust Crate for Energenie MiHome Radio Gateways
//!
//! The mihome-rs crate drives an RFM69 sub-GHz transceiver (such as the one on the
//! Energenie ENER314-RT Raspberry Pi board) and speaks the two protocols used by
//! MiHome devices: OOK frames for legacy remote sockets and OpenThings telemetry for
//! energy monitors, adaptor plugs, radiator valves and sensors.
//!
//! ## Features
//!
//! - Async RFM69 driver with verified register writes and bounded status polling
//! - OOK socket control codec (20-bit house address, sockets 0-4)
//! - OpenThings codec with fixed-point, signed and string records
//! - A gateway that switches radio personality per protocol, publishes decoded
//!   messages to subscribers and queues requests for battery powered devices
//! - An in-memory RFM69 model for host-side development and testing
//! - Support for logging and error handling
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mihome-rs = "0.1.0"
//! ```
//!
//! ```rust
//! use mihome_rs::{
//!     open_gateway, GatewayConfig, Message, MiHome, MiHomeError, Product, RadioMode,
//!     init_logger, log_info,
//! };
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod mihome;
pub mod ook;
pub mod openthings;
pub mod radio;
pub mod util;

pub use crate::error::MiHomeError;
pub use crate::logging::{init_logger, log_info};

pub use codec::{Codec, Message, RadioMode};
pub use config::GatewayConfig;
pub use mihome::{ActivityLed, MiHome, Product, ValveState};
pub use ook::{OokCodec, OokMessage};
pub use openthings::{Manufacturer, OtCodec, OtMessage, OtParameter, OtRecord};
pub use radio::{ResetPin, Rfm69, SpiBus};

/// Open the radio on `bus` and start a gateway on it.
///
/// # Arguments
/// * `bus` - SPI transport to the RFM69
/// * `reset` - Reset line, pulsed before the chip is probed
/// * `config` - Transmit and personality settings
/// * `led` - Optional activity LED lit while transmitting
///
/// # Returns
/// * `Ok(MiHome)` - Gateway running in `config.initial_mode`
/// * `Err(MiHomeError)` - Chip not found or configuration rejected
pub async fn open_gateway<B: SpiBus + 'static>(
    bus: B,
    reset: Option<ResetPin>,
    config: &GatewayConfig,
    led: Option<ActivityLed>,
) -> Result<MiHome<B>, MiHomeError> {
    let radio = Rfm69::open(bus, reset).await?;
    MiHome::open(radio, config, led).await
}
