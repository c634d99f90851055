//! # MiHome Gateway
//!
//! Multiplexes the OOK and OpenThings protocols over one RFM69.
//!
//! ## Concurrency
//!
//! - A background task polls the radio in receive mode and publishes every
//!   decoded message on a broadcast channel.
//! - Transmits, mode switches and temperature reads run on the caller's task
//!   under the mode lock: they stop the receive task (oneshot signal, then
//!   await its `JoinHandle`), reconfigure, and restart it afterwards.
//! - The outgoing queue has its own lock, never held across an await and
//!   never taken while the mode lock is held. The driver lock is innermost.
//! - Queued requests released by an inbound report are handed to a
//!   dispatcher task, so the receive task never waits on the mode lock.

use super::product::Product;
use super::queue::{OutgoingQueue, QueueEntry, QueuePayload, ValveState};
use crate::codec::{Codec, Message, RadioMode};
use crate::config::GatewayConfig;
use crate::error::MiHomeError;
use crate::ook::{OokCodec, OokMessage, OOK_PAYLOAD_SIZE};
use crate::openthings::message::MAX_SENSOR_ID;
use crate::openthings::{OtCodec, OtMessage, OtParameter, OtRecord};
use crate::radio::hal::{GpioPort, PinDirection, SpiBus};
use crate::radio::rfm69::Rfm69;
use crate::radio::rfm69_registers::{
    AfcMode, AfcRoutine, DataMode, Mode, Modulation, PacketCoding, PacketFilter, PacketFormat,
    AES_KEY_SIZE,
};
use crate::util::hex::pretty_hex;
use crate::util::logging::LogThrottle;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;

type Result<T> = std::result::Result<T, MiHomeError>;

/// Deadline of one receive poll
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause after a receive failure before the radio is reset
pub const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Messages buffered per subscriber before the slowest one starts lagging
pub const EVENT_CAPACITY: usize = 64;

const MONITOR_FREQUENCY: u32 = 434_300_000;
const CONTROL_FREQUENCY: u32 = 433_920_000;
const BITRATE: u32 = 4800;
const MONITOR_DEVIATION: u32 = 30_000;
const MONITOR_SYNC_WORD: [u8; 2] = [0x2D, 0xD4];
const MONITOR_PAYLOAD_SIZE: u8 = 64;

/// eTRV setpoint range, °C
const SETPOINT_RANGE: std::ops::RangeInclusive<f64> = 4.0..=30.0;

/// GPIO-driven LED lit while transmitting.
pub struct ActivityLed {
    gpio: Box<dyn GpioPort>,
    pin: u8,
}

impl ActivityLed {
    pub fn new(mut gpio: Box<dyn GpioPort>, pin: u8) -> Result<Self> {
        gpio.set_mode(pin, PinDirection::Output)?;
        gpio.write(pin, false)?;
        Ok(Self { gpio, pin })
    }

    fn set(&mut self, on: bool) {
        if let Err(e) = self.gpio.write(self.pin, on) {
            warn!("Activity LED on pin {}: {}", self.pin, e);
        }
    }
}

struct ReceiveTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct ModeState {
    mode: RadioMode,
    receiver: Option<ReceiveTask>,
}

struct TxSettings {
    ook_repeat: usize,
    openthings_repeat: usize,
    inter_packet_delay: Duration,
    temperature_calibration: i32,
    aes_key: Option<[u8; AES_KEY_SIZE]>,
}

struct Shared<B: SpiBus> {
    radio: Rfm69<B>,
    codecs: Vec<Arc<dyn Codec>>,
    settings: TxSettings,
    control: tokio::sync::Mutex<ModeState>,
    queue: OutgoingQueue,
    led: Option<Mutex<ActivityLed>>,
    events: broadcast::Sender<Message>,
    followups: mpsc::UnboundedSender<QueueEntry>,
}

/// Energenie MiHome gateway on an RFM69
pub struct MiHome<B: SpiBus + 'static> {
    shared: Arc<Shared<B>>,
    dispatcher: JoinHandle<()>,
}

impl<B: SpiBus + 'static> MiHome<B> {
    /// Gateway with the OOK and OpenThings codecs, started in the
    /// configured initial mode.
    pub async fn open(radio: Rfm69<B>, config: &GatewayConfig, led: Option<ActivityLed>) -> Result<Self> {
        let codecs: Vec<Arc<dyn Codec>> = vec![Arc::new(OokCodec), Arc::new(OtCodec)];
        Self::with_codecs(radio, config, led, codecs).await
    }

    /// Gateway with an explicit codec list. Codecs are tried in order.
    pub async fn with_codecs(
        radio: Rfm69<B>,
        config: &GatewayConfig,
        led: Option<ActivityLed>,
        codecs: Vec<Arc<dyn Codec>>,
    ) -> Result<Self> {
        config.validate()?;
        let settings = TxSettings {
            ook_repeat: config.ook_tx_repeat,
            openthings_repeat: config.openthings_tx_repeat,
            inter_packet_delay: config.inter_packet_delay(),
            temperature_calibration: config.temperature_calibration,
            aes_key: config.aes_key()?,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (followups, followup_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            radio,
            codecs,
            settings,
            control: tokio::sync::Mutex::new(ModeState {
                mode: RadioMode::None,
                receiver: None,
            }),
            queue: OutgoingQueue::new(),
            led: led.map(Mutex::new),
            events,
            followups,
        });
        let dispatcher = tokio::spawn(dispatch_followups(Arc::downgrade(&shared), followup_rx));
        let gateway = Self { shared, dispatcher };

        let version = gateway.shared.radio.version().await;
        let names: Vec<_> = gateway.shared.codecs.iter().map(|c| c.name()).collect();
        info!("MiHome gateway on RFM69 v0x{:02X}, codecs: {}", version, names.join(", "));
        gateway.set_mode(config.initial_mode).await?;
        Ok(gateway)
    }

    /// Underlying driver, for diagnostics
    pub fn radio(&self) -> &Rfm69<B> {
        &self.shared.radio
    }

    pub async fn mode(&self) -> RadioMode {
        self.shared.control.lock().await.mode
    }

    /// Switch personality. `RadioMode::None` leaves the radio in standby
    /// with no receive task.
    pub async fn set_mode(&self, mode: RadioMode) -> Result<()> {
        let mut state = self.shared.control.lock().await;
        self.shared.stop_receiver(&mut state).await;
        state.mode = RadioMode::None;
        self.shared.configure(mode).await?;
        if mode != RadioMode::None {
            self.shared.radio.set_mode(Mode::Receive).await?;
            self.shared.start_receiver(&mut state, mode);
        }
        state.mode = mode;
        info!("MiHome radio mode {:?}", mode);
        Ok(())
    }

    /// Receiver of every decoded inbound message
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.shared.events.subscribe()
    }

    /// Encode with the first codec that accepts `message` and transmit it.
    pub async fn send(&self, message: &Message) -> Result<()> {
        self.shared.send(message).await
    }

    pub async fn request_switch_on(&self, product: Product, sensor: u32) -> Result<()> {
        self.request_switch(product, sensor, true).await
    }

    pub async fn request_switch_off(&self, product: Product, sensor: u32) -> Result<()> {
        self.request_switch(product, sensor, false).await
    }

    /// OOK sockets take `sensor` as their 20-bit house address; the adaptor
    /// plus is switched immediately over OpenThings.
    async fn request_switch(&self, product: Product, sensor: u32, on: bool) -> Result<()> {
        let message: Message = match (product.socket(), product) {
            (Some(socket), _) => OokMessage::new(sensor, socket, on)?.into(),
            (None, Product::Energy) => {
                check_sensor(sensor)?;
                let (Some(manufacturer), Some(id)) = (product.manufacturer(), product.product_id())
                else {
                    return Err(MiHomeError::BadParameter(format!("{} has no product id", product)));
                };
                OtMessage::new(manufacturer, id, sensor)
                    .with_record(OtRecord::bool(OtParameter::SWITCH_STATE, true, on))
                    .into()
            }
            (None, _) => {
                return Err(MiHomeError::BadParameter(format!("{} is not switchable", product)))
            }
        };
        info!("Switching {} 0x{:X} {}", product, sensor, if on { "on" } else { "off" });
        self.send(&message).await
    }

    fn enqueue(
        &self,
        product: Product,
        sensor: u32,
        parameter: OtParameter,
        payload: QueuePayload,
    ) -> Result<()> {
        if product.product_id().is_none() {
            return Err(MiHomeError::BadParameter(format!(
                "{} does not accept OpenThings requests",
                product
            )));
        }
        check_sensor(sensor)?;
        self.shared.queue.push(QueueEntry {
            product,
            sensor,
            parameter,
            payload,
        })
    }

    pub fn queue_diagnostics(&self, product: Product, sensor: u32) -> Result<()> {
        self.enqueue(product, sensor, OtParameter::DIAGNOSTICS, QueuePayload::None)
    }

    pub fn queue_identify(&self, product: Product, sensor: u32) -> Result<()> {
        self.enqueue(product, sensor, OtParameter::IDENTIFY, QueuePayload::None)
    }

    /// Valve exercise cycle
    pub fn queue_exercise(&self, product: Product, sensor: u32) -> Result<()> {
        self.enqueue(product, sensor, OtParameter::EXERCISE, QueuePayload::None)
    }

    pub fn queue_battery_level(&self, product: Product, sensor: u32) -> Result<()> {
        self.enqueue(product, sensor, OtParameter::BATTERY_LEVEL, QueuePayload::None)
    }

    pub fn queue_target_temperature(&self, product: Product, sensor: u32, celsius: f64) -> Result<()> {
        if !SETPOINT_RANGE.contains(&celsius) {
            return Err(MiHomeError::BadParameter(format!(
                "setpoint {} °C outside {}-{}",
                celsius,
                SETPOINT_RANGE.start(),
                SETPOINT_RANGE.end()
            )));
        }
        self.enqueue(product, sensor, OtParameter::TEMPERATURE, QueuePayload::Temperature(celsius))
    }

    pub fn queue_report_interval(&self, product: Product, sensor: u32, seconds: u16) -> Result<()> {
        if seconds == 0 {
            return Err(MiHomeError::BadParameter("report interval must be non-zero".into()));
        }
        self.enqueue(product, sensor, OtParameter::REPORT_PERIOD, QueuePayload::Interval(seconds))
    }

    pub fn queue_valve_state(&self, product: Product, sensor: u32, state: ValveState) -> Result<()> {
        self.enqueue(product, sensor, OtParameter::VALVE_STATE, QueuePayload::ValveState(state))
    }

    pub fn queue_low_power_mode(&self, product: Product, sensor: u32, enabled: bool) -> Result<()> {
        self.enqueue(product, sensor, OtParameter::LOW_POWER, QueuePayload::LowPower(enabled))
    }

    /// Requests waiting for their device to report
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn queued(&self) -> Vec<QueueEntry> {
        self.shared.queue.snapshot()
    }

    /// On-chip temperature in °C with the configured calibration applied.
    pub async fn measure_temperature(&self) -> Result<i32> {
        let mut state = self.shared.control.lock().await;
        let previous = state.mode;
        self.shared.stop_receiver(&mut state).await;

        let result = match self.shared.radio.set_mode(Mode::Standby).await {
            Ok(()) => {
                self.shared
                    .radio
                    .measure_temperature(self.shared.settings.temperature_calibration)
                    .await
            }
            Err(e) => Err(e),
        };
        let restored = self.shared.resume(&mut state, previous, false).await;
        let celsius = result?;
        restored?;
        Ok(celsius)
    }

    /// Hardware reset, then restore the current personality.
    pub async fn reset_radio(&self) -> Result<()> {
        let mut state = self.shared.control.lock().await;
        let previous = state.mode;
        self.shared.stop_receiver(&mut state).await;
        warn!("Resetting RFM69");
        self.shared.radio.reset().await?;
        self.shared.resume(&mut state, previous, true).await
    }

    /// Stop the receive task and put the radio in standby.
    pub async fn close(&self) -> Result<()> {
        self.set_mode(RadioMode::None).await
    }
}

impl<B: SpiBus + 'static> Drop for MiHome<B> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.control.try_lock() {
            if let Some(task) = state.receiver.take() {
                let _ = task.shutdown.send(());
                task.handle.abort();
            }
        }
        self.dispatcher.abort();
    }
}

fn check_sensor(sensor: u32) -> Result<()> {
    if sensor > MAX_SENSOR_ID {
        return Err(MiHomeError::BadParameter(format!(
            "sensor id 0x{:X} exceeds 24 bits",
            sensor
        )));
    }
    Ok(())
}

impl<B: SpiBus + 'static> Shared<B> {
    async fn stop_receiver(&self, state: &mut ModeState) {
        if let Some(task) = state.receiver.take() {
            let _ = task.shutdown.send(());
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    error!("Receive task ended abnormally: {}", e);
                }
            }
            debug!("Receive task stopped");
        }
    }

    fn start_receiver(self: &Arc<Self>, state: &mut ModeState, mode: RadioMode) {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(receive_loop(Arc::clone(self), mode, shutdown_rx));
        state.receiver = Some(ReceiveTask { shutdown, handle });
        debug!("Receive task started in {:?} mode", mode);
    }

    /// Load a personality; the radio is left in standby.
    async fn configure(&self, mode: RadioMode) -> Result<()> {
        let radio = &self.radio;
        radio.set_mode(Mode::Standby).await?;
        match mode {
            RadioMode::None => {}
            RadioMode::Monitor => {
                radio.set_data_mode(DataMode::Packet).await?;
                radio.set_modulation(Modulation::Fsk).await?;
                radio.set_bitrate(BITRATE).await?;
                radio.set_freq_carrier(MONITOR_FREQUENCY).await?;
                radio.set_freq_deviation(MONITOR_DEVIATION).await?;
                radio.set_afc_routine(AfcRoutine::Standard).await?;
                radio.set_afc_mode(AfcMode::On).await?;
                radio.set_packet_format(PacketFormat::Variable).await?;
                radio.set_packet_coding(PacketCoding::Manchester).await?;
                radio.set_packet_filter(PacketFilter::None).await?;
                radio.set_packet_crc(false).await?;
                radio.set_preamble_size(3).await?;
                radio.set_sync_word(&MONITOR_SYNC_WORD).await?;
                radio.set_sync_tolerance(3).await?;
                radio.set_payload_size(MONITOR_PAYLOAD_SIZE).await?;
                radio.set_fifo_threshold(1).await?;
                radio.set_aes_key(self.settings.aes_key.as_ref()).await?;
            }
            RadioMode::Control => {
                radio.set_data_mode(DataMode::Packet).await?;
                radio.set_modulation(Modulation::Ook).await?;
                radio.set_bitrate(BITRATE).await?;
                radio.set_freq_carrier(CONTROL_FREQUENCY).await?;
                radio.set_freq_deviation(0).await?;
                radio.set_afc_mode(AfcMode::Off).await?;
                radio.set_packet_format(PacketFormat::Fixed).await?;
                radio.set_packet_coding(PacketCoding::None).await?;
                radio.set_packet_filter(PacketFilter::None).await?;
                radio.set_packet_crc(false).await?;
                radio.set_preamble_size(0).await?;
                radio.set_sync_word(&[]).await?;
                radio.set_payload_size(OOK_PAYLOAD_SIZE as u8).await?;
                radio.set_aes_key(None).await?;
            }
        }
        debug!("RFM69 configured for {:?}", mode);
        Ok(())
    }

    /// Return to `mode` after the receive task was stopped.
    async fn resume(self: &Arc<Self>, state: &mut ModeState, mode: RadioMode, reconfigure: bool) -> Result<()> {
        state.mode = mode;
        if reconfigure {
            self.configure(mode).await?;
        }
        if mode == RadioMode::None {
            return self.radio.set_mode(Mode::Standby).await;
        }
        self.radio.set_mode(Mode::Receive).await?;
        self.start_receiver(state, mode);
        Ok(())
    }

    async fn send(self: &Arc<Self>, message: &Message) -> Result<()> {
        let (codec, payload) = self
            .codecs
            .iter()
            .find_map(|c| {
                let payload = c.encode(message);
                (!payload.is_empty()).then(|| (Arc::clone(c), payload))
            })
            .ok_or_else(|| MiHomeError::MessageCorruption("no codec encodes the message".into()))?;

        let mut state = self.control.lock().await;
        let previous = state.mode;
        self.stop_receiver(&mut state).await;

        let target = match codec.mode() {
            RadioMode::None => previous,
            mode => mode,
        };
        let switch = target != previous;
        let result = self.transmit(codec.as_ref(), target, switch, &payload).await;

        // Restore even after a failed transmit
        let restored = self.resume(&mut state, previous, switch).await;
        if let Err(e) = &restored {
            error!("Failed to restore {:?} mode after transmit: {}", previous, e);
        }
        result?;
        restored
    }

    async fn transmit(&self, codec: &dyn Codec, target: RadioMode, switch: bool, payload: &[u8]) -> Result<()> {
        if switch {
            self.configure(target).await?;
        }
        let repeat = match codec.mode() {
            RadioMode::Control => self.settings.ook_repeat,
            _ => self.settings.openthings_repeat,
        };

        self.set_led(true);
        let result = async {
            self.radio.set_mode(Mode::Transmit).await?;
            self.radio
                .write_payload(payload, repeat, self.settings.inter_packet_delay)
                .await
        }
        .await;
        self.set_led(false);

        match &result {
            Ok(()) => info!("Sent {} payload ({} bytes x{})", codec.name(), payload.len(), repeat),
            Err(e) => warn!("Failed to send {} payload: {}", codec.name(), e),
        }
        result
    }

    fn set_led(&self, on: bool) {
        if let Some(led) = &self.led {
            led.lock().unwrap_or_else(|e| e.into_inner()).set(on);
        }
    }

    /// Decode with every codec valid in `mode`; publish the first success.
    fn handle_packet(&self, mode: RadioMode, data: &[u8], throttle: &mut LogThrottle) {
        let timestamp = Utc::now();
        let mut last_error = None;
        for codec in self
            .codecs
            .iter()
            .filter(|c| c.mode() == mode || c.mode() == RadioMode::None)
        {
            match codec.decode(data, timestamp) {
                Ok(message) => {
                    debug!("Decoded {} message: {:?}", codec.name(), message);
                    if let Message::OpenThings(ot) = &message {
                        self.release_queued(ot);
                    }
                    // No subscribers is not an error
                    let _ = self.events.send(message);
                    return;
                }
                Err(e) => last_error = Some(e),
            }
        }

        let reason = match last_error {
            Some(e) => e.to_string(),
            None => format!("no codec for {:?} mode", mode),
        };
        crate::log_warn_throttled!(
            throttle,
            "Discarding {}-byte payload: {}",
            data.len(),
            reason
        );
        if log::log_enabled!(log::Level::Debug) {
            debug!("Undecoded payload:\n{}", pretty_hex(data, 16));
        }
    }

    fn release_queued(&self, message: &OtMessage) {
        let Some(product) = Product::from_product_id(message.product()) else {
            return;
        };
        for entry in self.queue.take_for(product, message.sensor()) {
            debug!(
                "Releasing queued {} for {} 0x{:06X}",
                entry.parameter, entry.product, entry.sensor
            );
            if self.followups.send(entry).is_err() {
                warn!("Follow-up dispatcher is gone, dropping queued request");
            }
        }
    }

    /// Ride out a timeout; anything else backs off, then resets and
    /// reconfigures the radio. Returns `false` once shutdown is signalled.
    async fn receive_failed(
        &self,
        mode: RadioMode,
        e: MiHomeError,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> bool {
        if e.is_recoverable() {
            warn!("Receive in {:?} mode: {}", mode, e);
            return true;
        }
        error!("Receive failed in {:?} mode: {}", mode, e);
        tokio::select! {
            _ = shutdown => return false,
            _ = sleep(ERROR_BACKOFF) => {}
        }
        if let Err(e) = self.recover(mode).await {
            error!("Radio recovery failed: {}", e);
        }
        true
    }

    /// Radio reset and personality reload after a receive failure
    async fn recover(&self, mode: RadioMode) -> Result<()> {
        self.radio.reset().await?;
        self.configure(mode).await?;
        self.radio.set_mode(Mode::Receive).await
    }
}

async fn receive_loop<B: SpiBus + 'static>(
    shared: Arc<Shared<B>>,
    mode: RadioMode,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut throttle = LogThrottle::new(10_000, 5);
    loop {
        match shutdown.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => break,
        }

        match shared.radio.read_payload(RECEIVE_TIMEOUT).await {
            Ok(None) => {}
            Ok(Some(packet)) => shared.handle_packet(mode, &packet.data, &mut throttle),
            Err(e) => {
                if !shared.receive_failed(mode, e, &mut shutdown).await {
                    break;
                }
            }
        }
    }
}

/// Sends queued requests released by inbound reports.
async fn dispatch_followups<B: SpiBus + 'static>(
    shared: Weak<Shared<B>>,
    mut followups: mpsc::UnboundedReceiver<QueueEntry>,
) {
    while let Some(entry) = followups.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let result = match entry.to_message() {
            Ok(message) => shared.send(&message.into()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(
                "Queued {} for {} 0x{:06X} not sent: {}",
                entry.parameter, entry.product, entry.sensor, e
            );
        }
    }
}
