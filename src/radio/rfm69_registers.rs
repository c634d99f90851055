//! # RFM69 Register Definitions and Constants
//!
//! Register addresses, bit fields and typed field values for the HopeRF
//! RFM69 family, as used by the [`Rfm69`](super::rfm69::Rfm69) driver.
//!
//! ## Register Map
//!
//! - 0x00-0x0F: FIFO, operating mode, modulation, bitrate, frequency
//! - 0x10-0x2F: version, PA, LNA, channel filter, AFC/FEI, IRQ flags
//! - 0x2C-0x3D: preamble, sync word, packet engine
//! - 0x3E-0x4F: AES key and temperature sensor
//!
//! Every field value type offers `bits()` (its position-shifted register
//! contribution) and `from_bits()` (decode from a full register value), so
//! the driver can verify writes by comparing typed values.

use bitflags::bitflags;

// =============================================================================
// RFM69 Register Addresses
// =============================================================================

/// FIFO read/write access register
pub const REG_FIFO: u8 = 0x00;

/// Operating mode, listen and sequencer control
pub const REG_OPMODE: u8 = 0x01;

/// Data processing mode and modulation scheme
pub const REG_DATAMODUL: u8 = 0x02;

/// Bit rate setting (MSB)
pub const REG_BITRATEMSB: u8 = 0x03;

/// Bit rate setting (LSB)
pub const REG_BITRATELSB: u8 = 0x04;

/// Frequency deviation setting (MSB)
pub const REG_FDEVMSB: u8 = 0x05;

/// Frequency deviation setting (LSB)
pub const REG_FDEVLSB: u8 = 0x06;

/// RF carrier frequency setting (MSB)
pub const REG_FRFMSB: u8 = 0x07;

/// RF carrier frequency setting (MID)
pub const REG_FRFMID: u8 = 0x08;

/// RF carrier frequency setting (LSB)
pub const REG_FRFLSB: u8 = 0x09;

/// AFC control in low modulation index situations
pub const REG_AFCCTRL: u8 = 0x0B;

/// Chip version (read-only)
pub const REG_VERSION: u8 = 0x10;

/// LNA settings
pub const REG_LNA: u8 = 0x18;

/// Channel filter bandwidth control
pub const REG_RXBW: u8 = 0x19;

/// AFC and FEI control and status
pub const REG_AFCFEI: u8 = 0x1E;

/// MSB of AFC correction
pub const REG_AFCMSB: u8 = 0x1F;

/// LSB of AFC correction
pub const REG_AFCLSB: u8 = 0x20;

/// Status register: mode ready, PLL lock, RSSI
pub const REG_IRQFLAGS1: u8 = 0x27;

/// Status register: FIFO handling flags
pub const REG_IRQFLAGS2: u8 = 0x28;

/// Preamble length (MSB)
pub const REG_PREAMBLEMSB: u8 = 0x2C;

/// Preamble length (LSB)
pub const REG_PREAMBLELSB: u8 = 0x2D;

/// Sync word recognition control
pub const REG_SYNCCONFIG: u8 = 0x2E;

/// Sync word byte 1; bytes 2-8 follow consecutively
pub const REG_SYNCVALUE1: u8 = 0x2F;

/// Packet mode settings
pub const REG_PACKETCONFIG1: u8 = 0x37;

/// Payload length (fixed) or maximum length (variable)
pub const REG_PAYLOADLENGTH: u8 = 0x38;

/// Node address
pub const REG_NODEADRS: u8 = 0x39;

/// Broadcast address
pub const REG_BROADCASTADRS: u8 = 0x3A;

/// FIFO threshold, TX start condition
pub const REG_FIFOTHRESH: u8 = 0x3C;

/// Packet mode settings 2 (AES enable)
pub const REG_PACKETCONFIG2: u8 = 0x3D;

/// AES key byte 1; bytes 2-16 follow consecutively (write-only)
pub const REG_AESKEY1: u8 = 0x3E;

/// Temperature sensor control
pub const REG_TEMP1: u8 = 0x4E;

/// Temperature sensor value
pub const REG_TEMP2: u8 = 0x4F;

/// Number of registers mirrored by the driver at open
pub const REGISTER_COUNT: usize = 0x50;

// =============================================================================
// Chip Constants
// =============================================================================

/// Expected content of REG_VERSION
pub const RFM69_VERSION: u8 = 0x24;

/// Crystal oscillator frequency
pub const FXOSC: f64 = 32_000_000.0;

/// RF frequency step (FXOSC / 2^19)
pub const FSTEP: f64 = 61.03515625;

/// FIFO size in bytes
pub const FIFO_SIZE: usize = 66;

/// Maximum sync word length in bytes
pub const MAX_SYNC_SIZE: usize = 8;

/// AES key length in bytes
pub const AES_KEY_SIZE: usize = 16;

/// Bit set on the address byte of a write transaction
pub const SPI_WRITE: u8 = 0x80;

/// Mask applied to the address byte of a read transaction
pub const SPI_READ_MASK: u8 = 0x7F;

// =============================================================================
// Bit Fields
// =============================================================================

pub const RF_OPMODE_SEQUENCER_OFF: u8 = 0x80;
pub const RF_OPMODE_LISTEN_ON: u8 = 0x40;
pub const RF_OPMODE_MODE_MASK: u8 = 0x1C;

pub const RF_DATAMODUL_DATAMODE_MASK: u8 = 0x60;
pub const RF_DATAMODUL_MODULATION_MASK: u8 = 0x1F;

pub const RF_AFCCTRL_LOWBETA_ON: u8 = 0x20;

pub const RF_LNA_ZIN_MASK: u8 = 0x80;
pub const RF_LNA_GAINSELECT_MASK: u8 = 0x07;

pub const RF_RXBW_DCCFREQ_MASK: u8 = 0xE0;
pub const RF_RXBW_MANT_MASK: u8 = 0x18;
pub const RF_RXBW_EXP_MASK: u8 = 0x07;

pub const RF_AFCFEI_AFC_START: u8 = 0x01;
pub const RF_AFCFEI_AFC_CLEAR: u8 = 0x02;
pub const RF_AFCFEI_AFCAUTO_ON: u8 = 0x04;
pub const RF_AFCFEI_AFCAUTOCLEAR_ON: u8 = 0x08;
pub const RF_AFCFEI_AFC_DONE: u8 = 0x10;
pub const RF_AFCFEI_AFC_MODE_MASK: u8 = 0x0C;

pub const RF_SYNC_ON: u8 = 0x80;
pub const RF_SYNC_FIFOFILL_MANUAL: u8 = 0x40;
pub const RF_SYNC_SIZE_MASK: u8 = 0x38;
pub const RF_SYNC_TOL_MASK: u8 = 0x07;

pub const RF_PACKET1_FORMAT_VARIABLE: u8 = 0x80;
pub const RF_PACKET1_DCFREE_MASK: u8 = 0x60;
pub const RF_PACKET1_CRC_ON: u8 = 0x10;
pub const RF_PACKET1_CRCAUTOCLEAR_OFF: u8 = 0x08;
pub const RF_PACKET1_ADRSFILTERING_MASK: u8 = 0x06;

pub const RF_FIFOTHRESH_TXSTART_FIFONOTEMPTY: u8 = 0x80;
pub const RF_FIFOTHRESH_VALUE_MASK: u8 = 0x7F;

pub const RF_PACKET2_AES_ON: u8 = 0x01;

pub const RF_TEMP1_MEAS_START: u8 = 0x08;
pub const RF_TEMP1_MEAS_RUNNING: u8 = 0x04;

bitflags! {
    /// Flags in REG_IRQFLAGS1
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IrqFlags1: u8 {
        const SYNC_ADDRESS_MATCH = 0x01;
        const AUTO_MODE          = 0x02;
        const TIMEOUT            = 0x04;
        const RSSI               = 0x08;
        const PLL_LOCK           = 0x10;
        const TX_READY           = 0x20;
        const RX_READY           = 0x40;
        /// Operating mode transition complete
        const MODE_READY         = 0x80;
    }
}

bitflags! {
    /// Flags in REG_IRQFLAGS2
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct IrqFlags2: u8 {
        const LOW_BAT        = 0x01;
        const CRC_OK         = 0x02;
        /// A complete packet is waiting in the FIFO
        const PAYLOAD_READY  = 0x04;
        const PACKET_SENT    = 0x08;
        /// Writing this flag clears the FIFO
        const FIFO_OVERRUN   = 0x10;
        /// FIFO fill exceeds the configured threshold
        const FIFO_LEVEL     = 0x20;
        const FIFO_NOT_EMPTY = 0x40;
        const FIFO_FULL      = 0x80;
    }
}

// =============================================================================
// Typed Field Values
// =============================================================================

/// Operating modes (REG_OPMODE bits 4-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sleep = 0,
    Standby = 1,
    FrequencySynthesis = 2,
    Transmit = 3,
    Receive = 4,
}

impl Mode {
    pub fn bits(self) -> u8 {
        (self as u8) << 2
    }

    pub fn from_bits(value: u8) -> Option<Self> {
        match (value & RF_OPMODE_MODE_MASK) >> 2 {
            0 => Some(Mode::Sleep),
            1 => Some(Mode::Standby),
            2 => Some(Mode::FrequencySynthesis),
            3 => Some(Mode::Transmit),
            4 => Some(Mode::Receive),
            _ => None,
        }
    }
}

/// Data processing mode (REG_DATAMODUL bits 6-5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataMode {
    Packet = 0,
    ContinuousWithSync = 2,
    ContinuousWithoutSync = 3,
}

impl DataMode {
    pub fn bits(self) -> u8 {
        (self as u8) << 5
    }

    pub fn from_bits(value: u8) -> Option<Self> {
        match (value & RF_DATAMODUL_DATAMODE_MASK) >> 5 {
            0 => Some(DataMode::Packet),
            2 => Some(DataMode::ContinuousWithSync),
            3 => Some(DataMode::ContinuousWithoutSync),
            _ => None,
        }
    }
}

/// Modulation type and shaping (REG_DATAMODUL bits 4-0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Fsk = 0x00,
    FskGaussian1_0 = 0x01,
    FskGaussian0_5 = 0x02,
    FskGaussian0_3 = 0x03,
    Ook = 0x08,
    OokCutoffBitrate = 0x09,
    OokCutoff2Bitrate = 0x0A,
}

impl Modulation {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(value: u8) -> Option<Self> {
        match value & RF_DATAMODUL_MODULATION_MASK {
            0x00 => Some(Modulation::Fsk),
            0x01 => Some(Modulation::FskGaussian1_0),
            0x02 => Some(Modulation::FskGaussian0_5),
            0x03 => Some(Modulation::FskGaussian0_3),
            0x08 => Some(Modulation::Ook),
            0x09 => Some(Modulation::OokCutoffBitrate),
            0x0A => Some(Modulation::OokCutoff2Bitrate),
            _ => None,
        }
    }

    pub fn is_ook(self) -> bool {
        (self as u8) & 0x08 != 0
    }
}

/// Packet length handling (REG_PACKETCONFIG1 bit 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFormat {
    Fixed,
    Variable,
}

impl PacketFormat {
    pub fn bits(self) -> u8 {
        match self {
            PacketFormat::Fixed => 0,
            PacketFormat::Variable => RF_PACKET1_FORMAT_VARIABLE,
        }
    }

    pub fn from_bits(value: u8) -> Self {
        if value & RF_PACKET1_FORMAT_VARIABLE != 0 {
            PacketFormat::Variable
        } else {
            PacketFormat::Fixed
        }
    }
}

/// DC-free encoding (REG_PACKETCONFIG1 bits 6-5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketCoding {
    None = 0,
    Manchester = 1,
    Whitening = 2,
}

impl PacketCoding {
    pub fn bits(self) -> u8 {
        (self as u8) << 5
    }

    pub fn from_bits(value: u8) -> Option<Self> {
        match (value & RF_PACKET1_DCFREE_MASK) >> 5 {
            0 => Some(PacketCoding::None),
            1 => Some(PacketCoding::Manchester),
            2 => Some(PacketCoding::Whitening),
            _ => None,
        }
    }
}

/// Address filtering (REG_PACKETCONFIG1 bits 2-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketFilter {
    None = 0,
    Node = 1,
    NodeOrBroadcast = 2,
}

impl PacketFilter {
    pub fn bits(self) -> u8 {
        (self as u8) << 1
    }

    pub fn from_bits(value: u8) -> Option<Self> {
        match (value & RF_PACKET1_ADRSFILTERING_MASK) >> 1 {
            0 => Some(PacketFilter::None),
            1 => Some(PacketFilter::Node),
            2 => Some(PacketFilter::NodeOrBroadcast),
            _ => None,
        }
    }
}

/// Automatic frequency correction behaviour (REG_AFCFEI bits 3-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfcMode {
    /// AFC only on explicit trigger
    Off,
    /// AFC on every receiver start
    On,
    /// As `On`, clearing the previous correction first
    AutoClear,
}

impl AfcMode {
    pub fn bits(self) -> u8 {
        match self {
            AfcMode::Off => 0x00,
            AfcMode::On => RF_AFCFEI_AFCAUTO_ON,
            AfcMode::AutoClear => RF_AFCFEI_AFCAUTO_ON | RF_AFCFEI_AFCAUTOCLEAR_ON,
        }
    }

    pub fn from_bits(value: u8) -> Self {
        if value & RF_AFCFEI_AFCAUTO_ON == 0 {
            AfcMode::Off
        } else if value & RF_AFCFEI_AFCAUTOCLEAR_ON != 0 {
            AfcMode::AutoClear
        } else {
            AfcMode::On
        }
    }
}

/// AFC routine (REG_AFCCTRL bit 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfcRoutine {
    Standard,
    /// Improved routine for signals with a modulation index below 2
    Improved,
}

impl AfcRoutine {
    pub fn bits(self) -> u8 {
        match self {
            AfcRoutine::Standard => 0,
            AfcRoutine::Improved => RF_AFCCTRL_LOWBETA_ON,
        }
    }

    pub fn from_bits(value: u8) -> Self {
        if value & RF_AFCCTRL_LOWBETA_ON != 0 {
            AfcRoutine::Improved
        } else {
            AfcRoutine::Standard
        }
    }
}

/// Packet transmission start condition (REG_FIFOTHRESH bit 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStart {
    /// Start once the FIFO level exceeds the threshold
    FifoLevel,
    /// Start as soon as the FIFO holds one byte
    FifoNotEmpty,
}

impl TxStart {
    pub fn bits(self) -> u8 {
        match self {
            TxStart::FifoLevel => 0,
            TxStart::FifoNotEmpty => RF_FIFOTHRESH_TXSTART_FIFONOTEMPTY,
        }
    }

    pub fn from_bits(value: u8) -> Self {
        if value & RF_FIFOTHRESH_TXSTART_FIFONOTEMPTY != 0 {
            TxStart::FifoNotEmpty
        } else {
            TxStart::FifoLevel
        }
    }
}

/// LNA input impedance (REG_LNA bit 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LnaImpedance {
    Ohm50,
    Ohm200,
}

impl LnaImpedance {
    pub fn bits(self) -> u8 {
        match self {
            LnaImpedance::Ohm50 => 0,
            LnaImpedance::Ohm200 => RF_LNA_ZIN_MASK,
        }
    }

    pub fn from_bits(value: u8) -> Self {
        if value & RF_LNA_ZIN_MASK != 0 {
            LnaImpedance::Ohm200
        } else {
            LnaImpedance::Ohm50
        }
    }
}

/// LNA gain (REG_LNA bits 2-0); G1 is the highest gain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LnaGain {
    Agc = 0,
    G1 = 1,
    G2 = 2,
    G3 = 3,
    G4 = 4,
    G5 = 5,
    G6 = 6,
}

impl LnaGain {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(value: u8) -> Option<Self> {
        match value & RF_LNA_GAINSELECT_MASK {
            0 => Some(LnaGain::Agc),
            1 => Some(LnaGain::G1),
            2 => Some(LnaGain::G2),
            3 => Some(LnaGain::G3),
            4 => Some(LnaGain::G4),
            5 => Some(LnaGain::G5),
            6 => Some(LnaGain::G6),
            _ => None,
        }
    }
}

/// DC canceller cutoff as a fraction of the channel filter bandwidth
/// (REG_RXBW bits 7-5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxBwCutoff {
    Percent16 = 0,
    Percent8 = 1,
    Percent4 = 2,
    Percent2 = 3,
    Percent1 = 4,
    Percent0_5 = 5,
    Percent0_25 = 6,
    Percent0_125 = 7,
}

impl RxBwCutoff {
    pub fn bits(self) -> u8 {
        (self as u8) << 5
    }

    pub fn from_bits(value: u8) -> Self {
        match (value & RF_RXBW_DCCFREQ_MASK) >> 5 {
            0 => RxBwCutoff::Percent16,
            1 => RxBwCutoff::Percent8,
            2 => RxBwCutoff::Percent4,
            3 => RxBwCutoff::Percent2,
            4 => RxBwCutoff::Percent1,
            5 => RxBwCutoff::Percent0_5,
            6 => RxBwCutoff::Percent0_25,
            _ => RxBwCutoff::Percent0_125,
        }
    }
}

/// Channel filter mantissa (REG_RXBW bits 4-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxBwMantissa {
    M16 = 0,
    M20 = 1,
    M24 = 2,
}

impl RxBwMantissa {
    pub fn value(self) -> u32 {
        match self {
            RxBwMantissa::M16 => 16,
            RxBwMantissa::M20 => 20,
            RxBwMantissa::M24 => 24,
        }
    }
}

/// Channel filter bandwidth as mantissa and exponent (REG_RXBW bits 4-0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxBwFrequency {
    pub mantissa: RxBwMantissa,
    /// 0..=7
    pub exponent: u8,
}

impl RxBwFrequency {
    pub fn bits(self) -> u8 {
        ((self.mantissa as u8) << 3) | (self.exponent & RF_RXBW_EXP_MASK)
    }

    pub fn from_bits(value: u8) -> Option<Self> {
        let mantissa = match (value & RF_RXBW_MANT_MASK) >> 3 {
            0 => RxBwMantissa::M16,
            1 => RxBwMantissa::M20,
            2 => RxBwMantissa::M24,
            _ => return None,
        };
        Some(Self {
            mantissa,
            exponent: value & RF_RXBW_EXP_MASK,
        })
    }

    /// Single-sided filter bandwidth in Hz for the given modulation.
    pub fn bandwidth_hz(self, modulation: Modulation) -> f64 {
        let shift = if modulation.is_ook() { 3 } else { 2 };
        FXOSC / (self.mantissa.value() as f64 * f64::from(1u32 << (self.exponent as u32 + shift)))
    }
}
