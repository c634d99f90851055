//! # Raspberry Pi HAL Implementation
//!
//! `rppal`-backed implementations of [`SpiBus`] and [`GpioPort`] for the
//! Energenie ENER314-RT board and similar RFM69 hats.
//!
//! ## Pinout (40-pin GPIO header)
//!
//! ```text
//! Pi Pin │ BCM GPIO │ RFM69 Pin │ Function
//! ───────┼──────────┼───────────┼──────────────────
//! 19     │ GPIO 10  │ MOSI      │ SPI data out
//! 21     │ GPIO 9   │ MISO      │ SPI data in
//! 23     │ GPIO 11  │ SCK       │ SPI clock
//! 26     │ GPIO 7   │ NSS       │ Chip select (CE1)
//! 22     │ GPIO 25  │ RESET     │ Reset (active high)
//! 13     │ GPIO 27  │ -         │ Activity LED
//! ```
//!
//! SPI must be enabled in `/boot/config.txt` (`dtparam=spi=on`).

use super::{GpioPort, HalError, PinDirection, SpiBus};
use rppal::gpio::{Gpio, IoPin, Mode as GpioMode};
use rppal::spi::{BitOrder, Bus, Mode, SlaveSelect, Spi};
use std::collections::HashMap;

/// Maximum SPI clock the RFM69 accepts.
pub const MAX_SPI_SPEED: u32 = 10_000_000;

/// SPI transport for the RFM69.
pub struct RaspberryPiSpi {
    spi: Spi,
    bus_info: String,
}

impl RaspberryPiSpi {
    /// Open `/dev/spidev{bus}.{slave}` in mode 0, MSB first.
    pub fn new(bus: u8, slave: u8, speed_hz: u32) -> Result<Self, HalError> {
        let spi_bus = match bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            _ => {
                return Err(HalError::InvalidConfig(format!(
                    "Invalid SPI bus {}, only 0 and 1 are supported",
                    bus
                )))
            }
        };
        let slave_select = match slave {
            0 => SlaveSelect::Ss0,
            1 => SlaveSelect::Ss1,
            2 => SlaveSelect::Ss2,
            _ => {
                return Err(HalError::InvalidConfig(format!(
                    "Invalid slave select {}",
                    slave
                )))
            }
        };
        if speed_hz == 0 || speed_hz > MAX_SPI_SPEED {
            return Err(HalError::InvalidConfig(format!(
                "Invalid SPI speed {} Hz, must be 1-{}",
                speed_hz, MAX_SPI_SPEED
            )));
        }

        let spi = Spi::new(spi_bus, slave_select, speed_hz, Mode::Mode0)
            .map_err(|e| HalError::Spi(e.to_string()))?;
        spi.set_bit_order(BitOrder::MsbFirst)
            .map_err(|e| HalError::Spi(e.to_string()))?;

        let bus_info = format!("SPI{}.{} @ {} Hz", bus, slave, speed_hz);
        log::info!("Raspberry Pi SPI initialized: {}", bus_info);

        Ok(Self { spi, bus_info })
    }

    /// Human-readable bus description
    pub fn bus_info(&self) -> &str {
        &self.bus_info
    }
}

impl SpiBus for RaspberryPiSpi {
    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, HalError> {
        let mut read_buf = vec![0u8; data.len()];
        self.spi.transfer(&mut read_buf, data).map_err(|e| {
            log::error!("SPI transfer failed: {}", e);
            HalError::Spi(e.to_string())
        })?;
        Ok(read_buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HalError> {
        self.spi.write(data).map_err(|e| {
            log::error!("SPI write failed: {}", e);
            HalError::Spi(e.to_string())
        })?;
        Ok(())
    }
}

/// GPIO access through `rppal`; pins are claimed lazily on first use.
pub struct RaspberryPiGpio {
    gpio: Gpio,
    pins: HashMap<u8, IoPin>,
}

impl RaspberryPiGpio {
    pub fn new() -> Result<Self, HalError> {
        let gpio = Gpio::new().map_err(|e| HalError::Gpio(e.to_string()))?;
        Ok(Self {
            gpio,
            pins: HashMap::new(),
        })
    }

    fn pin(&mut self, pin: u8) -> Result<&mut IoPin, HalError> {
        if !self.pins.contains_key(&pin) {
            let io = self
                .gpio
                .get(pin)
                .map_err(|e| HalError::Gpio(e.to_string()))?
                .into_io(GpioMode::Output);
            self.pins.insert(pin, io);
        }
        self.pins
            .get_mut(&pin)
            .ok_or_else(|| HalError::Gpio(format!("GPIO {} unavailable", pin)))
    }
}

impl GpioPort for RaspberryPiGpio {
    fn set_mode(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        let io = self.pin(pin)?;
        match direction {
            PinDirection::Input => io.set_mode(GpioMode::Input),
            PinDirection::Output => io.set_mode(GpioMode::Output),
        }
        log::debug!("GPIO {} set to {:?}", pin, direction);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: bool) -> Result<(), HalError> {
        let io = self.pin(pin)?;
        if level {
            io.set_high();
        } else {
            io.set_low();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bus_rejected() {
        let result = RaspberryPiSpi::new(3, 1, 1_000_000);
        assert!(matches!(result, Err(HalError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_speed_rejected() {
        let result = RaspberryPiSpi::new(0, 1, 20_000_000);
        assert!(matches!(result, Err(HalError::InvalidConfig(_))));
    }
}
