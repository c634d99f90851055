//! # Gateway Tests
//!
//! Drives [`MiHome`] end to end over the mock RFM69: personality switching,
//! transmit scheduling, subscriber delivery and queued eTRV requests.

use mihome_rs::codec::{Message, RadioMode};
use mihome_rs::mihome::{ActivityLed, MiHome, Product, ValveState};
use mihome_rs::ook::{decode_ook, encode_ook, OokMessage};
use mihome_rs::openthings::{
    decode_openthings, encode_openthings, Manufacturer, OtDataType, OtMessage, OtParameter, OtRecord,
};
use mihome_rs::radio::mock::{MockGpio, MockRfm69};
use mihome_rs::radio::rfm69_registers::{Mode, Modulation, FSTEP};
use mihome_rs::radio::Rfm69;
use mihome_rs::{GatewayConfig, MiHomeError};
use std::time::Duration;
use tokio::time::timeout;

async fn gateway(mode: RadioMode) -> (MockRfm69, MiHome<MockRfm69>) {
    let mock = MockRfm69::new();
    let radio = Rfm69::open(mock.clone(), None).await.unwrap();
    let config = GatewayConfig {
        initial_mode: mode,
        ..Default::default()
    };
    let gateway = MiHome::open(radio, &config, None).await.unwrap();
    (mock, gateway)
}

fn near(actual: u32, expected: u32) -> bool {
    (i64::from(actual) - i64::from(expected)).abs() < FSTEP as i64
}

fn etrv_report(sensor: u32) -> Vec<u8> {
    let msg = OtMessage::new(Manufacturer::Energenie, 0x03, sensor).with_record(
        OtRecord::float(OtParameter::TEMPERATURE, true, 19.5, OtDataType::Dec8).unwrap(),
    );
    encode_openthings(&msg)
}

async fn wait_for_transmissions(mock: &MockRfm69, count: usize) -> Vec<Vec<u8>> {
    timeout(Duration::from_secs(5), async {
        loop {
            let sent = mock.transmitted();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("transmission did not happen")
}

#[tokio::test]
async fn test_monitor_personality() {
    let (_, gateway) = gateway(RadioMode::Monitor).await;
    assert_eq!(gateway.mode().await, RadioMode::Monitor);

    let state = gateway.radio().state().await;
    assert_eq!(state.mode, Mode::Receive);
    assert_eq!(state.modulation, Modulation::Fsk);
    assert!(near(state.freq_carrier, 434_300_000));
    assert_eq!(state.bitrate, 4800);
    assert_eq!(state.sync_word, vec![0x2D, 0xD4]);
    assert_eq!(state.sync_tolerance, 3);
    assert_eq!(state.payload_size, 64);
    assert!(!state.packet_crc);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_control_personality() {
    let (_, gateway) = gateway(RadioMode::Control).await;
    let state = gateway.radio().state().await;
    assert_eq!(state.modulation, Modulation::Ook);
    assert!(near(state.freq_carrier, 433_920_000));
    assert!(state.sync_word.is_empty());
    assert_eq!(state.preamble_size, 0);
    assert_eq!(state.payload_size, 16);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_mode_none_is_standby() {
    let (_, gateway) = gateway(RadioMode::Monitor).await;
    gateway.set_mode(RadioMode::None).await.unwrap();
    assert_eq!(gateway.mode().await, RadioMode::None);
    assert_eq!(gateway.radio().mode().await, Mode::Standby);
}

#[tokio::test]
async fn test_switch_ook_socket_and_restore() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    gateway.request_switch_on(Product::ControlOne, 0x6C6C6).await.unwrap();

    let sent = mock.transmitted();
    assert_eq!(sent.len(), 8);
    let expected = encode_ook(&OokMessage::new(0x6C6C6, 1, true).unwrap());
    assert!(sent.iter().all(|frame| *frame == expected));
    let decoded = decode_ook(&sent[0], chrono::Utc::now()).unwrap();
    assert!(decoded.state());

    // Back in monitor receive
    let state = gateway.radio().state().await;
    assert_eq!(state.mode, Mode::Receive);
    assert_eq!(state.modulation, Modulation::Fsk);
    assert!(near(state.freq_carrier, 434_300_000));
    assert_eq!(gateway.mode().await, RadioMode::Monitor);
    assert!(mock.mode_history().contains(&Mode::Transmit));
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_switch_from_idle_returns_to_standby() {
    let (mock, gateway) = gateway(RadioMode::None).await;
    gateway.request_switch_off(Product::ControlFour, 0xABCDE).await.unwrap();

    let sent = mock.transmitted();
    assert_eq!(sent.len(), 8);
    assert_eq!(sent[0].len(), 16);
    let decoded = decode_ook(&sent[0], chrono::Utc::now()).unwrap();
    assert_eq!(decoded, OokMessage::new(0xABCDE, 4, false).unwrap());

    assert_eq!(gateway.mode().await, RadioMode::None);
    assert_eq!(gateway.radio().mode().await, Mode::Standby);
    assert_eq!(gateway.radio().state().await.modulation, Modulation::Ook);
}

#[tokio::test]
async fn test_switch_adaptor_plus_over_openthings() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    gateway.request_switch_off(Product::Energy, 0x1234).await.unwrap();

    let sent = mock.transmitted();
    assert_eq!(sent.len(), 4);
    let msg = decode_openthings(&sent[0], chrono::Utc::now()).unwrap();
    assert_eq!(msg.product(), 0x02);
    assert_eq!(msg.sensor(), 0x1234);
    let switch = msg.record(OtParameter::SWITCH_STATE).unwrap();
    assert!(!switch.bool_value().unwrap());
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_switch_rejects_unswitchable_products() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    assert!(matches!(
        gateway.request_switch_on(Product::Motion, 1).await,
        Err(MiHomeError::BadParameter(_))
    ));
    assert!(matches!(
        gateway.request_switch_on(Product::ControlTwo, 0x10_0000).await,
        Err(MiHomeError::BadParameter(_))
    ));
    assert!(mock.transmitted().is_empty());
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_subscribers_receive_decoded_messages_only() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    let mut events = gateway.subscribe();

    mock.queue_packet(&[0xDE, 0xAD, 0xBE, 0xEF]);
    mock.queue_packet(&etrv_report(0x00BEEF));

    let message = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no message published")
        .unwrap();
    match message {
        Message::OpenThings(msg) => {
            assert_eq!(msg.sensor(), 0x00BEEF);
            assert_eq!(
                msg.record(OtParameter::TEMPERATURE).unwrap().float_value().unwrap(),
                19.5
            );
        }
        other => panic!("unexpected message {:?}", other),
    }
    assert!(events.try_recv().is_err());
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_queue_dedup() {
    let (_, gateway) = gateway(RadioMode::None).await;
    gateway.queue_target_temperature(Product::Etrv, 0x42, 21.0).unwrap();
    assert!(matches!(
        gateway.queue_target_temperature(Product::Etrv, 0x42, 21.0),
        Err(MiHomeError::NotModified)
    ));
    gateway.queue_target_temperature(Product::Etrv, 0x42, 18.0).unwrap();
    assert_eq!(gateway.queue_len(), 1);

    gateway.queue_identify(Product::Etrv, 0x42).unwrap();
    gateway.queue_valve_state(Product::Etrv, 0x42, ValveState::Auto).unwrap();
    gateway.queue_low_power_mode(Product::Etrv, 0x42, true).unwrap();
    gateway.queue_report_interval(Product::Etrv, 0x42, 300).unwrap();
    gateway.queue_exercise(Product::Etrv, 0x42).unwrap();
    gateway.queue_battery_level(Product::Etrv, 0x42).unwrap();
    gateway.queue_diagnostics(Product::Etrv, 0x42).unwrap();
    assert_eq!(gateway.queue_len(), 8);
}

#[tokio::test]
async fn test_queue_validation() {
    let (_, gateway) = gateway(RadioMode::None).await;
    assert!(matches!(
        gateway.queue_identify(Product::ControlOne, 1),
        Err(MiHomeError::BadParameter(_))
    ));
    assert!(matches!(
        gateway.queue_target_temperature(Product::Etrv, 1, 45.0),
        Err(MiHomeError::BadParameter(_))
    ));
    assert!(matches!(
        gateway.queue_report_interval(Product::Etrv, 1, 0),
        Err(MiHomeError::BadParameter(_))
    ));
    assert!(matches!(
        gateway.queue_identify(Product::Etrv, 0x0100_0000),
        Err(MiHomeError::BadParameter(_))
    ));
    assert_eq!(gateway.queue_len(), 0);
}

#[tokio::test]
async fn test_inbound_report_releases_queued_requests() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    let mut events = gateway.subscribe();
    gateway.queue_identify(Product::Etrv, 0x0A1B).unwrap();
    gateway.queue_identify(Product::Etrv, 0x0C0D).unwrap();

    mock.queue_packet(&etrv_report(0x0A1B));
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("report not published")
        .unwrap();

    let sent = wait_for_transmissions(&mock, 4).await;
    let reply = decode_openthings(&sent[0], chrono::Utc::now()).unwrap();
    assert_eq!(reply.sensor(), 0x0A1B);
    let identify = reply.record(OtParameter::IDENTIFY).unwrap();
    assert!(identify.is_report);
    assert!(identify.data.is_empty());

    // The other device's request stays queued
    assert_eq!(gateway.queue_len(), 1);
    assert_eq!(gateway.queued()[0].sensor, 0x0C0D);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_measure_temperature_restores_receive() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    mock.set_temperature_raw(145);
    assert_eq!(gateway.measure_temperature().await.unwrap(), 20);
    assert_eq!(gateway.radio().mode().await, Mode::Receive);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_temperature_calibration_from_config() {
    let mock = MockRfm69::new();
    mock.set_temperature_raw(145);
    let radio = Rfm69::open(mock.clone(), None).await.unwrap();
    let config = GatewayConfig {
        initial_mode: RadioMode::None,
        temperature_calibration: -2,
        ..Default::default()
    };
    let gateway = MiHome::open(radio, &config, None).await.unwrap();
    assert_eq!(gateway.measure_temperature().await.unwrap(), 18);
    assert_eq!(gateway.radio().mode().await, Mode::Standby);
}

#[tokio::test]
async fn test_activity_led_lit_during_transmit() {
    let mock = MockRfm69::new();
    let gpio = MockGpio::new();
    let radio = Rfm69::open(mock.clone(), None).await.unwrap();
    let led = ActivityLed::new(Box::new(gpio.clone()), 27).unwrap();
    let config = GatewayConfig {
        initial_mode: RadioMode::None,
        ..Default::default()
    };
    let gateway = MiHome::open(radio, &config, Some(led)).await.unwrap();

    gateway.request_switch_on(Product::ControlAll, 0x5).await.unwrap();
    assert_eq!(gpio.writes(), vec![(27, false), (27, true), (27, false)]);
    assert_eq!(gateway.radio().mode().await, Mode::Standby);
}

#[tokio::test]
async fn test_reset_radio_restores_personality() {
    let (_, gateway) = gateway(RadioMode::Control).await;
    gateway.reset_radio().await.unwrap();
    let state = gateway.radio().state().await;
    assert_eq!(state.mode, Mode::Receive);
    assert_eq!(state.modulation, Modulation::Ook);
    gateway.close().await.unwrap();
}

#[tokio::test]
async fn test_receive_resumes_after_bus_failure() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    let mut events = gateway.subscribe();

    mock.set_bus_failure(true);
    tokio::time::sleep(Duration::from_millis(300)).await;
    mock.set_bus_failure(false);
    mock.queue_packet(&etrv_report(0x0123));

    let message = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("nothing published after recovery")
        .unwrap();
    assert_eq!(message.as_openthings().map(|m| m.sensor()), Some(0x0123));

    let state = gateway.radio().state().await;
    assert_eq!(state.mode, Mode::Receive);
    assert_eq!(state.modulation, Modulation::Fsk);
    assert_eq!(gateway.mode().await, RadioMode::Monitor);
    gateway.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_transmits_do_not_interleave() {
    let (mock, gateway) = gateway(RadioMode::Monitor).await;
    let (a, b) = tokio::join!(
        gateway.request_switch_on(Product::ControlOne, 0x11111),
        gateway.request_switch_off(Product::ControlTwo, 0x22222),
    );
    a.unwrap();
    b.unwrap();

    let sent = mock.transmitted();
    assert_eq!(sent.len(), 16);
    let (first, second) = sent.split_at(8);
    assert!(first.iter().all(|frame| *frame == first[0]));
    assert!(second.iter().all(|frame| *frame == second[0]));
    assert_ne!(first[0], second[0]);

    let on = encode_ook(&OokMessage::new(0x11111, 1, true).unwrap());
    let off = encode_ook(&OokMessage::new(0x22222, 2, false).unwrap());
    assert!(
        (first[0] == on && second[0] == off) || (first[0] == off && second[0] == on)
    );
    gateway.close().await.unwrap();
}
