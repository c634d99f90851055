//! # RFM69 Radio Driver
//!
//! Async driver for the HopeRF RFM69 transceiver, written against the
//! [`SpiBus`] trait so the same code drives real hardware and the in-memory
//! register model in [`crate::radio::mock`].
//!
//! ## Design
//!
//! - All operations take `&self` and are serialized by one
//!   `tokio::sync::Mutex` around the bus and the cached register state.
//! - Every write with an observable read-back is verified; a mismatch is
//!   [`MiHomeError::UnexpectedResponse`] and the cached state keeps its
//!   previous value. The driver never retries.
//! - Bounded waits check the condition, then sleep [`POLL_INTERVAL`], up to a
//!   fixed ceiling. Single register transactions never await.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mihome_rs::radio::mock::MockRfm69;
//! use mihome_rs::radio::rfm69::Rfm69;
//! use mihome_rs::radio::rfm69_registers::Mode;
//!
//! # async fn example() -> Result<(), mihome_rs::MiHomeError> {
//! let radio = Rfm69::open(MockRfm69::new(), None).await?;
//! radio.set_freq_carrier(434_300_000).await?;
//! radio.set_mode(Mode::Receive).await?;
//! if let Some(packet) = radio.read_payload(std::time::Duration::from_millis(500)).await? {
//!     println!("{} bytes", packet.data.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::MiHomeError;
use crate::radio::hal::{GpioPort, HalError, PinDirection, SpiBus};
use crate::radio::rfm69_registers::*;
use crate::util::hex::encode_hex;
use crate::util::logging::log_payload_hex;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

type Result<T> = std::result::Result<T, MiHomeError>;

/// Interval between checks of a polled status bit
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ceiling for mode, AFC, FIFO and temperature waits
pub const WAIT_LIMIT: Duration = Duration::from_secs(1);

const RESET_PULSE: Duration = Duration::from_millis(100);
const RESET_SETTLE: Duration = Duration::from_millis(5);

/// GPIO line wired to the chip's RESET input (active high).
pub struct ResetPin {
    gpio: Box<dyn GpioPort>,
    pin: u8,
}

impl ResetPin {
    pub fn new(gpio: Box<dyn GpioPort>, pin: u8) -> Self {
        Self { gpio, pin }
    }

    async fn pulse(&mut self) -> Result<()> {
        self.gpio.set_mode(self.pin, PinDirection::Output)?;
        self.gpio.write(self.pin, true)?;
        sleep(RESET_PULSE).await;
        self.gpio.write(self.pin, false)?;
        sleep(RESET_SETTLE).await;
        Ok(())
    }
}

/// A packet drained from the FIFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub data: Vec<u8>,
    /// Packet engine CRC verdict; only meaningful when CRC checking is on
    pub crc_ok: bool,
}

/// Snapshot of the chip configuration as last read or verified.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioState {
    pub version: u8,
    pub mode: Mode,
    pub data_mode: DataMode,
    pub modulation: Modulation,
    /// Bits per second
    pub bitrate: u32,
    /// Hz
    pub freq_carrier: u32,
    /// Hz
    pub freq_deviation: u32,
    /// Last AFC correction in Hz
    pub afc: i32,
    pub afc_mode: AfcMode,
    pub afc_routine: AfcRoutine,
    pub packet_format: PacketFormat,
    pub packet_coding: PacketCoding,
    pub packet_filter: PacketFilter,
    pub packet_crc: bool,
    pub preamble_size: u16,
    pub payload_size: u8,
    /// Empty when sync word detection is off
    pub sync_word: Vec<u8>,
    pub sync_tolerance: u8,
    pub node_address: u8,
    pub broadcast_address: u8,
    pub aes_enabled: bool,
    pub fifo_threshold: u8,
    pub tx_start: TxStart,
    pub lna_impedance: LnaImpedance,
    pub lna_gain: LnaGain,
    pub rx_bw_frequency: RxBwFrequency,
    pub rx_bw_cutoff: RxBwCutoff,
}

impl RadioState {
    /// Decode a full register image (index = register address).
    ///
    /// Reserved encodings fall back to the chip's reset default.
    pub fn from_registers(regs: &[u8; REGISTER_COUNT]) -> Self {
        let sync_config = regs[REG_SYNCCONFIG as usize];
        let sync_word = if sync_config & RF_SYNC_ON != 0 {
            let size = (((sync_config & RF_SYNC_SIZE_MASK) >> 3) + 1) as usize;
            let start = REG_SYNCVALUE1 as usize;
            regs[start..start + size].to_vec()
        } else {
            Vec::new()
        };

        let packet1 = regs[REG_PACKETCONFIG1 as usize];
        let afc_raw = i16::from_be_bytes([regs[REG_AFCMSB as usize], regs[REG_AFCLSB as usize]]);

        Self {
            version: regs[REG_VERSION as usize],
            mode: Mode::from_bits(regs[REG_OPMODE as usize]).unwrap_or(Mode::Standby),
            data_mode: DataMode::from_bits(regs[REG_DATAMODUL as usize])
                .unwrap_or(DataMode::Packet),
            modulation: Modulation::from_bits(regs[REG_DATAMODUL as usize])
                .unwrap_or(Modulation::Fsk),
            bitrate: bitrate_from_register(u16::from_be_bytes([
                regs[REG_BITRATEMSB as usize],
                regs[REG_BITRATELSB as usize],
            ])),
            freq_carrier: steps_to_hz(
                (u32::from(regs[REG_FRFMSB as usize]) << 16)
                    | (u32::from(regs[REG_FRFMID as usize]) << 8)
                    | u32::from(regs[REG_FRFLSB as usize]),
            ),
            freq_deviation: steps_to_hz(u32::from(u16::from_be_bytes([
                regs[REG_FDEVMSB as usize] & 0x3F,
                regs[REG_FDEVLSB as usize],
            ]))),
            afc: (f64::from(afc_raw) * FSTEP).round() as i32,
            afc_mode: AfcMode::from_bits(regs[REG_AFCFEI as usize]),
            afc_routine: AfcRoutine::from_bits(regs[REG_AFCCTRL as usize]),
            packet_format: PacketFormat::from_bits(packet1),
            packet_coding: PacketCoding::from_bits(packet1).unwrap_or(PacketCoding::None),
            packet_filter: PacketFilter::from_bits(packet1).unwrap_or(PacketFilter::None),
            packet_crc: packet1 & RF_PACKET1_CRC_ON != 0,
            preamble_size: u16::from_be_bytes([
                regs[REG_PREAMBLEMSB as usize],
                regs[REG_PREAMBLELSB as usize],
            ]),
            payload_size: regs[REG_PAYLOADLENGTH as usize],
            sync_word,
            sync_tolerance: sync_config & RF_SYNC_TOL_MASK,
            node_address: regs[REG_NODEADRS as usize],
            broadcast_address: regs[REG_BROADCASTADRS as usize],
            aes_enabled: regs[REG_PACKETCONFIG2 as usize] & RF_PACKET2_AES_ON != 0,
            fifo_threshold: regs[REG_FIFOTHRESH as usize] & RF_FIFOTHRESH_VALUE_MASK,
            tx_start: TxStart::from_bits(regs[REG_FIFOTHRESH as usize]),
            lna_impedance: LnaImpedance::from_bits(regs[REG_LNA as usize]),
            lna_gain: LnaGain::from_bits(regs[REG_LNA as usize]).unwrap_or(LnaGain::Agc),
            rx_bw_frequency: RxBwFrequency::from_bits(regs[REG_RXBW as usize]).unwrap_or(
                RxBwFrequency {
                    mantissa: RxBwMantissa::M24,
                    exponent: 5,
                },
            ),
            rx_bw_cutoff: RxBwCutoff::from_bits(regs[REG_RXBW as usize]),
        }
    }
}

fn bitrate_from_register(value: u16) -> u32 {
    if value == 0 {
        0
    } else {
        (FXOSC / f64::from(value)).round() as u32
    }
}

fn steps_to_hz(steps: u32) -> u32 {
    (f64::from(steps) * FSTEP).round() as u32
}

fn hz_to_steps(hz: u32) -> u32 {
    (f64::from(hz) / FSTEP).round() as u32
}

/// Bus plus cached state; everything behind the driver lock.
struct Inner<B> {
    bus: B,
    reset: Option<ResetPin>,
    state: RadioState,
}

impl<B: SpiBus> Inner<B> {
    fn read_register(&mut self, reg: u8) -> Result<u8> {
        let rx = self.bus.transfer(&[reg & SPI_READ_MASK, 0])?;
        rx.get(1)
            .copied()
            .ok_or_else(|| HalError::Spi(format!("short read from register 0x{:02X}", reg)).into())
    }

    fn read_registers(&mut self, reg: u8, len: usize) -> Result<Vec<u8>> {
        let mut tx = vec![0u8; len + 1];
        tx[0] = reg & SPI_READ_MASK;
        let rx = self.bus.transfer(&tx)?;
        if rx.len() != len + 1 {
            return Err(HalError::Spi(format!(
                "short burst read from register 0x{:02X}: {} of {} bytes",
                reg,
                rx.len().saturating_sub(1),
                len
            ))
            .into());
        }
        Ok(rx[1..].to_vec())
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
        debug!("RFM69 write 0x{:02X} <- 0x{:02X}", reg, value);
        self.bus.write(&[reg | SPI_WRITE, value])?;
        Ok(())
    }

    fn write_registers(&mut self, reg: u8, values: &[u8]) -> Result<()> {
        let mut tx = Vec::with_capacity(values.len() + 1);
        tx.push(reg | SPI_WRITE);
        tx.extend_from_slice(values);
        self.bus.write(&tx)?;
        Ok(())
    }

    /// Write, read back, compare the bits under `mask`.
    fn write_verify(&mut self, reg: u8, value: u8, mask: u8) -> Result<()> {
        self.write_register(reg, value)?;
        let actual = self.read_register(reg)?;
        if actual & mask != value & mask {
            warn!(
                "RFM69 register 0x{:02X} verify failed: wrote 0x{:02X}, read 0x{:02X}",
                reg, value, actual
            );
            return Err(MiHomeError::UnexpectedResponse {
                register: reg,
                expected: value & mask,
                actual: actual & mask,
            });
        }
        Ok(())
    }

    /// Read-modify-write the bits under `mask`, verifying only those bits.
    fn update_bits(&mut self, reg: u8, mask: u8, bits: u8) -> Result<()> {
        let current = self.read_register(reg)?;
        self.write_verify(reg, (current & !mask) | (bits & mask), mask)
    }

    fn irq_flags1(&mut self) -> Result<IrqFlags1> {
        Ok(IrqFlags1::from_bits_truncate(self.read_register(REG_IRQFLAGS1)?))
    }

    fn irq_flags2(&mut self) -> Result<IrqFlags2> {
        Ok(IrqFlags2::from_bits_truncate(self.read_register(REG_IRQFLAGS2)?))
    }

    /// Check `condition`, sleep, repeat until `limit` elapses.
    /// Returns `false` on deadline.
    async fn poll<F>(&mut self, limit: Duration, mut condition: F) -> Result<bool>
    where
        F: FnMut(&mut Self) -> Result<bool>,
    {
        let deadline = Instant::now() + limit;
        loop {
            if condition(&mut *self)? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for(&mut self, what: &str, condition: fn(&mut Self) -> Result<bool>) -> Result<()> {
        if self.poll(WAIT_LIMIT, condition).await? {
            Ok(())
        } else {
            Err(MiHomeError::DeviceTimeout(what.to_string()))
        }
    }

    async fn hardware_reset(&mut self) -> Result<()> {
        if let Some(reset) = self.reset.as_mut() {
            info!("Resetting RFM69 chip");
            reset.pulse().await?;
        }
        Ok(())
    }

    /// Check the version register and mirror every register into the cache.
    fn sync_state(&mut self) -> Result<()> {
        let version = self.read_register(REG_VERSION)?;
        if version != RFM69_VERSION {
            return Err(MiHomeError::UnexpectedResponse {
                register: REG_VERSION,
                expected: RFM69_VERSION,
                actual: version,
            });
        }

        // Start at OPMODE; reading REG_FIFO would pop a byte
        let mut regs = [0u8; REGISTER_COUNT];
        let image = self.read_registers(REG_OPMODE, REGISTER_COUNT - 1)?;
        regs[1..].copy_from_slice(&image);
        self.state = RadioState::from_registers(&regs);
        info!(
            "RFM69 version 0x{:02X}, mode {:?}, {} Hz",
            version, self.state.mode, self.state.freq_carrier
        );
        Ok(())
    }

    fn read_afc(&mut self) -> Result<i32> {
        let raw = self.read_registers(REG_AFCMSB, 2)?;
        let value = i16::from_be_bytes([raw[0], raw[1]]);
        Ok((f64::from(value) * FSTEP).round() as i32)
    }

    /// Pop bytes while the FIFO reports data, up to its capacity.
    fn drain_fifo(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(FIFO_SIZE);
        while data.len() < FIFO_SIZE
            && self.irq_flags2()?.contains(IrqFlags2::FIFO_NOT_EMPTY)
        {
            data.push(self.read_register(REG_FIFO)?);
        }
        Ok(data)
    }
}

/// RFM69 transceiver bound to a bus
pub struct Rfm69<B> {
    inner: Mutex<Inner<B>>,
}

impl<B: SpiBus> Rfm69<B> {
    /// Reset the chip (when a reset line is given), check its version and
    /// load the register cache.
    pub async fn open(bus: B, reset: Option<ResetPin>) -> Result<Self> {
        let regs = [0u8; REGISTER_COUNT];
        let mut inner = Inner {
            bus,
            reset,
            state: RadioState::from_registers(&regs),
        };
        inner.hardware_reset().await?;
        inner.sync_state()?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Pulse the reset line and reload the register cache.
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.hardware_reset().await?;
        inner.sync_state()
    }

    /// Cached configuration snapshot
    pub async fn state(&self) -> RadioState {
        self.inner.lock().await.state.clone()
    }

    pub async fn version(&self) -> u8 {
        self.inner.lock().await.state.version
    }

    pub async fn mode(&self) -> Mode {
        self.inner.lock().await.state.mode
    }

    /// Switch operating mode with listen off and the sequencer on.
    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.write_register(REG_OPMODE, mode.bits())?;
        inner
            .wait_for("mode ready", |i| {
                Ok(i.irq_flags1()?.contains(IrqFlags1::MODE_READY))
            })
            .await?;

        let mask = RF_OPMODE_SEQUENCER_OFF | RF_OPMODE_LISTEN_ON | RF_OPMODE_MODE_MASK;
        let actual = inner.read_register(REG_OPMODE)?;
        if actual & mask != mode.bits() {
            return Err(MiHomeError::UnexpectedResponse {
                register: REG_OPMODE,
                expected: mode.bits(),
                actual: actual & mask,
            });
        }
        inner.state.mode = mode;

        if mode == Mode::Receive {
            inner.state.afc = inner.read_afc()?;
        }
        debug!("RFM69 mode set to {:?}", mode);
        Ok(())
    }

    pub async fn set_data_mode(&self, data_mode: DataMode) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_DATAMODUL, RF_DATAMODUL_DATAMODE_MASK, data_mode.bits())?;
        inner.state.data_mode = data_mode;
        Ok(())
    }

    pub async fn set_modulation(&self, modulation: Modulation) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_DATAMODUL, RF_DATAMODUL_MODULATION_MASK, modulation.bits())?;
        inner.state.modulation = modulation;
        Ok(())
    }

    pub async fn bitrate(&self) -> u32 {
        self.inner.lock().await.state.bitrate
    }

    /// Set the bitrate in bits per second.
    pub async fn set_bitrate(&self, bps: u32) -> Result<()> {
        if bps == 0 {
            return Err(MiHomeError::BadParameter("bitrate must be non-zero".into()));
        }
        let value = (FXOSC / f64::from(bps)).round();
        if !(1.0..=f64::from(u16::MAX)).contains(&value) {
            return Err(MiHomeError::BadParameter(format!(
                "bitrate {} bps out of range",
                bps
            )));
        }
        let value = value as u16;
        let [msb, lsb] = value.to_be_bytes();

        let mut inner = self.inner.lock().await;
        inner.write_verify(REG_BITRATEMSB, msb, 0xFF)?;
        inner.write_verify(REG_BITRATELSB, lsb, 0xFF)?;
        inner.state.bitrate = bitrate_from_register(value);
        Ok(())
    }

    pub async fn freq_carrier(&self) -> u32 {
        self.inner.lock().await.state.freq_carrier
    }

    /// Set the carrier frequency in Hz (290 MHz to 1020 MHz).
    pub async fn set_freq_carrier(&self, hz: u32) -> Result<()> {
        if !(290_000_000..=1_020_000_000).contains(&hz) {
            return Err(MiHomeError::BadParameter(format!(
                "carrier frequency {} Hz out of range",
                hz
            )));
        }
        let steps = hz_to_steps(hz);

        let mut inner = self.inner.lock().await;
        // The synthesizer latches on the LSB write
        inner.write_verify(REG_FRFMSB, (steps >> 16) as u8, 0xFF)?;
        inner.write_verify(REG_FRFMID, (steps >> 8) as u8, 0xFF)?;
        inner.write_verify(REG_FRFLSB, steps as u8, 0xFF)?;
        inner.state.freq_carrier = steps_to_hz(steps);
        debug!("RFM69 carrier set to {:.3} MHz", f64::from(hz) / 1e6);
        Ok(())
    }

    pub async fn freq_deviation(&self) -> u32 {
        self.inner.lock().await.state.freq_deviation
    }

    /// Set the FSK frequency deviation in Hz.
    pub async fn set_freq_deviation(&self, hz: u32) -> Result<()> {
        let steps = hz_to_steps(hz);
        if steps > 0x3FFF {
            return Err(MiHomeError::BadParameter(format!(
                "frequency deviation {} Hz out of range",
                hz
            )));
        }
        let mut inner = self.inner.lock().await;
        inner.write_verify(REG_FDEVMSB, (steps >> 8) as u8, 0x3F)?;
        inner.write_verify(REG_FDEVLSB, steps as u8, 0xFF)?;
        inner.state.freq_deviation = steps_to_hz(steps);
        Ok(())
    }

    /// Last AFC correction in Hz
    pub async fn afc(&self) -> i32 {
        self.inner.lock().await.state.afc
    }

    pub async fn afc_mode(&self) -> AfcMode {
        self.inner.lock().await.state.afc_mode
    }

    /// Select the automatic AFC behaviour. `Off` also clears the stored
    /// correction.
    pub async fn set_afc_mode(&self, mode: AfcMode) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let current = inner.read_register(REG_AFCFEI)?;
        let mut value = (current
            & !(RF_AFCFEI_AFC_MODE_MASK | RF_AFCFEI_AFC_START | RF_AFCFEI_AFC_CLEAR))
            | mode.bits();
        if mode == AfcMode::Off {
            value |= RF_AFCFEI_AFC_CLEAR;
        }
        inner.write_verify(REG_AFCFEI, value, RF_AFCFEI_AFC_MODE_MASK)?;
        inner.state.afc_mode = mode;
        if mode == AfcMode::Off {
            inner.state.afc = 0;
        }
        Ok(())
    }

    pub async fn afc_routine(&self) -> AfcRoutine {
        self.inner.lock().await.state.afc_routine
    }

    pub async fn set_afc_routine(&self, routine: AfcRoutine) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_AFCCTRL, RF_AFCCTRL_LOWBETA_ON, routine.bits())?;
        inner.state.afc_routine = routine;
        Ok(())
    }

    /// Run the AFC routine once and return the new correction in Hz.
    pub async fn trigger_afc(&self) -> Result<i32> {
        let mut inner = self.inner.lock().await;
        let current = inner.read_register(REG_AFCFEI)?;
        inner.write_register(
            REG_AFCFEI,
            (current & RF_AFCFEI_AFC_MODE_MASK) | RF_AFCFEI_AFC_START,
        )?;
        inner
            .wait_for("AFC done", |i| {
                Ok(i.read_register(REG_AFCFEI)? & RF_AFCFEI_AFC_DONE != 0)
            })
            .await?;
        let afc = inner.read_afc()?;
        inner.state.afc = afc;
        debug!("RFM69 AFC correction {} Hz", afc);
        Ok(afc)
    }

    pub async fn set_packet_format(&self, format: PacketFormat) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_PACKETCONFIG1, RF_PACKET1_FORMAT_VARIABLE, format.bits())?;
        inner.state.packet_format = format;
        Ok(())
    }

    pub async fn set_packet_coding(&self, coding: PacketCoding) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_PACKETCONFIG1, RF_PACKET1_DCFREE_MASK, coding.bits())?;
        inner.state.packet_coding = coding;
        Ok(())
    }

    pub async fn set_packet_filter(&self, filter: PacketFilter) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_PACKETCONFIG1, RF_PACKET1_ADRSFILTERING_MASK, filter.bits())?;
        inner.state.packet_filter = filter;
        Ok(())
    }

    pub async fn set_packet_crc(&self, enabled: bool) -> Result<()> {
        let bits = if enabled { RF_PACKET1_CRC_ON } else { 0 };
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_PACKETCONFIG1, RF_PACKET1_CRC_ON, bits)?;
        inner.state.packet_crc = enabled;
        Ok(())
    }

    pub async fn set_preamble_size(&self, size: u16) -> Result<()> {
        let [msb, lsb] = size.to_be_bytes();
        let mut inner = self.inner.lock().await;
        inner.write_verify(REG_PREAMBLEMSB, msb, 0xFF)?;
        inner.write_verify(REG_PREAMBLELSB, lsb, 0xFF)?;
        inner.state.preamble_size = size;
        Ok(())
    }

    pub async fn set_payload_size(&self, size: u8) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.write_verify(REG_PAYLOADLENGTH, size, 0xFF)?;
        inner.state.payload_size = size;
        Ok(())
    }

    /// Program the sync word; an empty slice turns sync detection off.
    pub async fn set_sync_word(&self, word: &[u8]) -> Result<()> {
        if word.len() > MAX_SYNC_SIZE {
            return Err(MiHomeError::BadParameter(format!(
                "sync word of {} bytes exceeds {}",
                word.len(),
                MAX_SYNC_SIZE
            )));
        }
        if word.contains(&0) {
            return Err(MiHomeError::BadParameter(
                "sync word bytes must be non-zero".into(),
            ));
        }

        let mut inner = self.inner.lock().await;
        if word.is_empty() {
            inner.update_bits(REG_SYNCCONFIG, RF_SYNC_ON, 0)?;
        } else {
            for (i, &byte) in word.iter().enumerate() {
                inner.write_verify(REG_SYNCVALUE1 + i as u8, byte, 0xFF)?;
            }
            let size_bits = ((word.len() - 1) as u8) << 3;
            inner.update_bits(
                REG_SYNCCONFIG,
                RF_SYNC_ON | RF_SYNC_SIZE_MASK,
                RF_SYNC_ON | size_bits,
            )?;
        }
        inner.state.sync_word = word.to_vec();
        Ok(())
    }

    /// Tolerated bit errors in the sync word (0-7)
    pub async fn set_sync_tolerance(&self, tolerance: u8) -> Result<()> {
        if tolerance > RF_SYNC_TOL_MASK {
            return Err(MiHomeError::BadParameter(format!(
                "sync tolerance {} exceeds 7",
                tolerance
            )));
        }
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_SYNCCONFIG, RF_SYNC_TOL_MASK, tolerance)?;
        inner.state.sync_tolerance = tolerance;
        Ok(())
    }

    pub async fn set_node_address(&self, address: u8) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.write_verify(REG_NODEADRS, address, 0xFF)?;
        inner.state.node_address = address;
        Ok(())
    }

    pub async fn set_broadcast_address(&self, address: u8) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.write_verify(REG_BROADCASTADRS, address, 0xFF)?;
        inner.state.broadcast_address = address;
        Ok(())
    }

    /// Load an AES key and enable encryption, or disable it with `None`.
    pub async fn set_aes_key(&self, key: Option<&[u8; AES_KEY_SIZE]>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match key {
            Some(key) => {
                // Key registers read back as zero; only the enable bit is checked
                inner.write_registers(REG_AESKEY1, key)?;
                inner.update_bits(REG_PACKETCONFIG2, RF_PACKET2_AES_ON, RF_PACKET2_AES_ON)?;
                inner.state.aes_enabled = true;
            }
            None => {
                inner.update_bits(REG_PACKETCONFIG2, RF_PACKET2_AES_ON, 0)?;
                inner.state.aes_enabled = false;
            }
        }
        Ok(())
    }

    pub async fn set_fifo_threshold(&self, threshold: u8) -> Result<()> {
        if threshold > RF_FIFOTHRESH_VALUE_MASK {
            return Err(MiHomeError::BadParameter(format!(
                "FIFO threshold {} exceeds 127",
                threshold
            )));
        }
        let mut inner = self.inner.lock().await;
        inner.update_bits(REG_FIFOTHRESH, RF_FIFOTHRESH_VALUE_MASK, threshold)?;
        inner.state.fifo_threshold = threshold;
        Ok(())
    }

    pub async fn set_tx_start(&self, condition: TxStart) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(
            REG_FIFOTHRESH,
            RF_FIFOTHRESH_TXSTART_FIFONOTEMPTY,
            condition.bits(),
        )?;
        inner.state.tx_start = condition;
        Ok(())
    }

    pub async fn set_lna(&self, impedance: LnaImpedance, gain: LnaGain) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.update_bits(
            REG_LNA,
            RF_LNA_ZIN_MASK | RF_LNA_GAINSELECT_MASK,
            impedance.bits() | gain.bits(),
        )?;
        inner.state.lna_impedance = impedance;
        inner.state.lna_gain = gain;
        Ok(())
    }

    pub async fn set_rx_filter(&self, frequency: RxBwFrequency, cutoff: RxBwCutoff) -> Result<()> {
        if frequency.exponent > RF_RXBW_EXP_MASK {
            return Err(MiHomeError::BadParameter(format!(
                "channel filter exponent {} exceeds 7",
                frequency.exponent
            )));
        }
        let mut inner = self.inner.lock().await;
        inner.write_verify(REG_RXBW, cutoff.bits() | frequency.bits(), 0xFF)?;
        inner.state.rx_bw_frequency = frequency;
        inner.state.rx_bw_cutoff = cutoff;
        Ok(())
    }

    /// Discard the FIFO contents.
    pub async fn clear_fifo(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.write_register(REG_IRQFLAGS2, IrqFlags2::FIFO_OVERRUN.bits())
    }

    /// Wait up to `timeout` for any FIFO content and drain it.
    pub async fn read_fifo(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().await;
        let ready = inner
            .poll(timeout, |i| {
                Ok(i.irq_flags2()?.contains(IrqFlags2::FIFO_NOT_EMPTY))
            })
            .await?;
        if !ready {
            return Ok(None);
        }
        inner.drain_fifo().map(Some)
    }

    /// Wait up to `timeout` for a complete packet. Deadline is `Ok(None)`.
    pub async fn read_payload(&self, timeout: Duration) -> Result<Option<ReceivedPacket>> {
        let mut inner = self.inner.lock().await;
        let ready = inner
            .poll(timeout, |i| {
                Ok(i.irq_flags2()?.contains(IrqFlags2::PAYLOAD_READY))
            })
            .await?;
        if !ready {
            return Ok(None);
        }
        let crc_ok = inner.irq_flags2()?.contains(IrqFlags2::CRC_OK);
        let data = inner.drain_fifo()?;
        log_payload_hex("RFM69 received", &data);
        Ok(Some(ReceivedPacket { data, crc_ok }))
    }

    /// Transmit `data` `repeat` times, pausing `inter_packet_delay` between
    /// repetitions. The radio must already be in [`Mode::Transmit`].
    pub async fn write_payload(
        &self,
        data: &[u8],
        repeat: usize,
        inter_packet_delay: Duration,
    ) -> Result<()> {
        if data.is_empty() || data.len() > FIFO_SIZE {
            return Err(MiHomeError::BadParameter(format!(
                "payload of {} bytes does not fit the {}-byte FIFO",
                data.len(),
                FIFO_SIZE
            )));
        }
        if repeat == 0 {
            return Err(MiHomeError::BadParameter("repeat count must be at least 1".into()));
        }

        let mut inner = self.inner.lock().await;
        if inner.state.mode != Mode::Transmit {
            return Err(MiHomeError::OutOfOrder(format!(
                "write_payload in {:?} mode",
                inner.state.mode
            )));
        }

        let threshold = (data.len() - 1) as u8;
        inner.update_bits(REG_FIFOTHRESH, RF_FIFOTHRESH_VALUE_MASK, threshold)?;
        inner.state.fifo_threshold = threshold;

        for n in 0..repeat {
            if n > 0 {
                sleep(inter_packet_delay).await;
            }
            inner.write_registers(REG_FIFO, data)?;
            inner
                .wait_for("FIFO level", |i| {
                    Ok(i.irq_flags2()?.contains(IrqFlags2::FIFO_LEVEL))
                })
                .await?;
            inner
                .wait_for("FIFO empty", |i| {
                    Ok(!i.irq_flags2()?.contains(IrqFlags2::FIFO_NOT_EMPTY))
                })
                .await?;
            inner
                .wait_for("packet sent", |i| {
                    Ok(i.irq_flags2()?.contains(IrqFlags2::PACKET_SENT))
                })
                .await?;
        }
        debug!(
            "RFM69 sent {} bytes x{}: {}",
            data.len(),
            repeat,
            encode_hex(data)
        );
        Ok(())
    }

    /// Read the on-chip temperature sensor in °C.
    ///
    /// Only valid in standby or frequency synthesis mode.
    pub async fn measure_temperature(&self, calibration: i32) -> Result<i32> {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state.mode, Mode::Standby | Mode::FrequencySynthesis) {
            return Err(MiHomeError::OutOfOrder(format!(
                "temperature measurement in {:?} mode",
                inner.state.mode
            )));
        }
        inner.write_register(REG_TEMP1, RF_TEMP1_MEAS_START)?;
        inner
            .wait_for("temperature measurement", |i| {
                Ok(i.read_register(REG_TEMP1)? & RF_TEMP1_MEAS_RUNNING == 0)
            })
            .await?;
        let raw = inner.read_register(REG_TEMP2)?;
        Ok(165 - i32::from(raw) + calibration)
    }
}
