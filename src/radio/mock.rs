//! Mock RFM69 implementation for testing
//!
//! An in-memory register model that speaks the RFM69 SPI protocol, so the
//! driver and the gateway can be exercised without hardware. Packets queued
//! with [`MockRfm69::queue_packet`] are delivered while the model is in
//! receive mode; FIFO bursts written in transmit mode are recorded as sent
//! packets.

use crate::radio::hal::{GpioPort, HalError, PinDirection, SpiBus};
use crate::radio::rfm69_registers::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

const REGISTER_SPACE: usize = 0x80;

struct MockState {
    regs: [u8; REGISTER_SPACE],
    fifo: VecDeque<u8>,
    payload_ready: bool,
    /// Set once a packet is drained; the next status read still sees an
    /// empty FIFO so back-to-back packets are not merged.
    rx_gap: bool,
    inbound: VecDeque<Vec<u8>>,
    transmitted: Vec<Vec<u8>>,
    modes: Vec<Mode>,
    aes_key: [u8; AES_KEY_SIZE],
    forced: HashMap<u8, u8>,
    stall_mode_ready: bool,
    bus_failure: bool,
    transactions: usize,
    temperature_raw: u8,
    afc_value: i16,
}

impl MockState {
    fn new() -> Self {
        let mut regs = [0u8; REGISTER_SPACE];
        // Datasheet reset defaults for the registers the driver touches
        regs[REG_OPMODE as usize] = 0x04;
        regs[REG_BITRATEMSB as usize] = 0x1A;
        regs[REG_BITRATELSB as usize] = 0x0B;
        regs[REG_FDEVLSB as usize] = 0x52;
        regs[REG_FRFMSB as usize] = 0xE4;
        regs[REG_FRFMID as usize] = 0xC0;
        regs[REG_VERSION as usize] = RFM69_VERSION;
        regs[REG_LNA as usize] = 0x88;
        regs[REG_RXBW as usize] = 0x55;
        regs[REG_PREAMBLELSB as usize] = 0x03;
        regs[REG_SYNCCONFIG as usize] = 0x98;
        for offset in 0..MAX_SYNC_SIZE {
            regs[REG_SYNCVALUE1 as usize + offset] = 0x01;
        }
        regs[REG_PACKETCONFIG1 as usize] = 0x10;
        regs[REG_PAYLOADLENGTH as usize] = 0x40;
        regs[REG_FIFOTHRESH as usize] = 0x8F;
        regs[REG_PACKETCONFIG2 as usize] = 0x02;
        regs[REG_TEMP1 as usize] = 0x01;

        Self {
            regs,
            fifo: VecDeque::new(),
            payload_ready: false,
            rx_gap: false,
            inbound: VecDeque::new(),
            transmitted: Vec::new(),
            modes: Vec::new(),
            aes_key: [0; AES_KEY_SIZE],
            forced: HashMap::new(),
            stall_mode_ready: false,
            bus_failure: false,
            transactions: 0,
            temperature_raw: 0,
            afc_value: 0,
        }
    }

    fn mode(&self) -> Option<Mode> {
        Mode::from_bits(self.regs[REG_OPMODE as usize])
    }

    fn set_afc_registers(&mut self, value: i16) {
        let [msb, lsb] = value.to_be_bytes();
        self.regs[REG_AFCMSB as usize] = msb;
        self.regs[REG_AFCLSB as usize] = lsb;
    }

    fn read(&mut self, reg: u8) -> u8 {
        if let Some(&value) = self.forced.get(&reg) {
            return value;
        }
        match reg {
            REG_FIFO => {
                let byte = self.fifo.pop_front().unwrap_or(0);
                if self.fifo.is_empty() && self.payload_ready {
                    self.payload_ready = false;
                    self.rx_gap = true;
                }
                byte
            }
            REG_IRQFLAGS1 => {
                let mut flags = IrqFlags1::empty();
                if !self.stall_mode_ready {
                    flags |= IrqFlags1::MODE_READY;
                    match self.mode() {
                        Some(Mode::Receive) => flags |= IrqFlags1::RX_READY,
                        Some(Mode::Transmit) => flags |= IrqFlags1::TX_READY,
                        _ => {}
                    }
                }
                flags.bits()
            }
            REG_IRQFLAGS2 => {
                let mut flags = IrqFlags2::empty();
                match self.mode() {
                    Some(Mode::Transmit) => {
                        flags |= IrqFlags2::FIFO_LEVEL | IrqFlags2::PACKET_SENT;
                    }
                    Some(Mode::Receive) => {
                        if self.fifo.is_empty() && !std::mem::take(&mut self.rx_gap) {
                            if let Some(packet) = self.inbound.pop_front() {
                                self.fifo.extend(packet);
                                self.payload_ready = true;
                            }
                        }
                        if self.payload_ready {
                            flags |= IrqFlags2::PAYLOAD_READY | IrqFlags2::CRC_OK;
                        }
                    }
                    _ => {}
                }
                if !self.fifo.is_empty() {
                    flags |= IrqFlags2::FIFO_NOT_EMPTY;
                }
                if self.fifo.len() >= FIFO_SIZE {
                    flags |= IrqFlags2::FIFO_FULL;
                }
                flags.bits()
            }
            REG_AFCFEI => {
                (self.regs[REG_AFCFEI as usize] & !(RF_AFCFEI_AFC_START | RF_AFCFEI_AFC_CLEAR))
                    | RF_AFCFEI_AFC_DONE
            }
            REG_TEMP1 => {
                self.regs[REG_TEMP1 as usize] & !(RF_TEMP1_MEAS_START | RF_TEMP1_MEAS_RUNNING)
            }
            REG_TEMP2 => self.temperature_raw,
            r if (REG_AESKEY1..REG_AESKEY1 + AES_KEY_SIZE as u8).contains(&r) => 0,
            r => self.regs[r as usize % REGISTER_SPACE],
        }
    }

    fn write(&mut self, reg: u8, value: u8) {
        match reg {
            REG_OPMODE => {
                self.regs[REG_OPMODE as usize] = value;
                if let Some(mode) = self.mode() {
                    self.modes.push(mode);
                    match mode {
                        Mode::Receive => {
                            let afc = self.afc_value;
                            self.set_afc_registers(afc);
                        }
                        Mode::Transmit => {
                            self.fifo.clear();
                            self.payload_ready = false;
                        }
                        _ => {}
                    }
                }
            }
            REG_IRQFLAGS2 => {
                if value & IrqFlags2::FIFO_OVERRUN.bits() != 0 {
                    self.fifo.clear();
                    self.payload_ready = false;
                }
            }
            REG_AFCFEI => {
                if value & RF_AFCFEI_AFC_CLEAR != 0 {
                    self.set_afc_registers(0);
                }
                if value & RF_AFCFEI_AFC_START != 0 {
                    let afc = self.afc_value;
                    self.set_afc_registers(afc);
                }
                self.regs[REG_AFCFEI as usize] =
                    value & !(RF_AFCFEI_AFC_START | RF_AFCFEI_AFC_CLEAR | RF_AFCFEI_AFC_DONE);
            }
            REG_VERSION | REG_IRQFLAGS1 | REG_TEMP2 => {}
            r if (REG_AESKEY1..REG_AESKEY1 + AES_KEY_SIZE as u8).contains(&r) => {
                self.aes_key[(r - REG_AESKEY1) as usize] = value;
            }
            r => self.regs[r as usize % REGISTER_SPACE] = value,
        }
    }

    fn write_burst(&mut self, addr: u8, values: &[u8]) {
        if addr == REG_FIFO {
            if self.mode() == Some(Mode::Transmit) {
                self.transmitted.push(values.to_vec());
            } else {
                self.fifo.extend(values);
            }
            return;
        }
        for (i, &value) in values.iter().enumerate() {
            self.write(addr.wrapping_add(i as u8) & SPI_READ_MASK, value);
        }
    }
}

/// In-memory RFM69 register model
#[derive(Clone)]
pub struct MockRfm69 {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockRfm69 {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRfm69 {
    pub fn new() -> Self {
        MockRfm69 {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Report a different chip version
    pub fn set_version(&self, version: u8) {
        self.lock().regs[REG_VERSION as usize] = version;
    }

    /// Queue a packet to be delivered while in receive mode
    pub fn queue_packet(&self, packet: &[u8]) {
        self.lock().inbound.push_back(packet.to_vec());
    }

    /// Packets still waiting to be received
    pub fn pending_packets(&self) -> usize {
        self.lock().inbound.len()
    }

    /// Packets written to the FIFO in transmit mode, one entry per burst
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        self.lock().transmitted.clone()
    }

    /// Every operating mode written to OPMODE, in order
    pub fn mode_history(&self) -> Vec<Mode> {
        self.lock().modes.clone()
    }

    /// Raw register content, bypassing read side effects
    pub fn register(&self, reg: u8) -> u8 {
        self.lock().regs[reg as usize % REGISTER_SPACE]
    }

    /// Overwrite a register without going through the bus
    pub fn set_register(&self, reg: u8, value: u8) {
        self.lock().regs[reg as usize % REGISTER_SPACE] = value;
    }

    /// Make every read of `reg` return `value`
    pub fn force_register(&self, reg: u8, value: u8) {
        self.lock().forced.insert(reg, value);
    }

    pub fn clear_forced(&self) {
        self.lock().forced.clear();
    }

    /// Keep MODE_READY low so mode changes time out
    pub fn stall_mode_ready(&self, stall: bool) {
        self.lock().stall_mode_ready = stall;
    }

    /// Fail every bus transaction
    pub fn set_bus_failure(&self, failing: bool) {
        self.lock().bus_failure = failing;
    }

    /// Raw value returned by REG_TEMP2
    pub fn set_temperature_raw(&self, raw: u8) {
        self.lock().temperature_raw = raw;
    }

    /// Correction (in FSTEP units) reported by the next AFC run
    pub fn set_afc_value(&self, steps: i16) {
        self.lock().afc_value = steps;
    }

    pub fn aes_key(&self) -> [u8; AES_KEY_SIZE] {
        self.lock().aes_key
    }

    /// Number of bus transactions so far
    pub fn transaction_count(&self) -> usize {
        self.lock().transactions
    }
}

impl SpiBus for MockRfm69 {
    fn transfer(&mut self, data: &[u8]) -> Result<Vec<u8>, HalError> {
        let mut state = self.lock();
        state.transactions += 1;
        if state.bus_failure {
            return Err(HalError::Spi("mock bus failure".to_string()));
        }
        let mut rx = vec![0u8; data.len()];
        let Some((&addr, payload)) = data.split_first() else {
            return Ok(rx);
        };

        if addr & SPI_WRITE != 0 {
            state.write_burst(addr & SPI_READ_MASK, payload);
        } else {
            for (i, slot) in rx.iter_mut().enumerate().skip(1) {
                // The FIFO address does not auto-increment
                let reg = if addr == REG_FIFO {
                    REG_FIFO
                } else {
                    addr.wrapping_add((i - 1) as u8) & SPI_READ_MASK
                };
                *slot = state.read(reg);
            }
        }
        Ok(rx)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), HalError> {
        self.transfer(data).map(|_| ())
    }
}

/// GPIO double that records every operation
#[derive(Clone, Default)]
pub struct MockGpio {
    writes: Arc<Mutex<Vec<(u8, bool)>>>,
    modes: Arc<Mutex<HashMap<u8, PinDirection>>>,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(pin, level)` pairs in write order
    pub fn writes(&self) -> Vec<(u8, bool)> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn direction(&self, pin: u8) -> Option<PinDirection> {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&pin)
            .copied()
    }
}

impl GpioPort for MockGpio {
    fn set_mode(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        self.modes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(pin, direction);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: bool) -> Result<(), HalError> {
        self.writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((pin, level));
        Ok(())
    }
}
