//! Link lifecycle and paced register access.

mod mock_support;

use std::sync::Arc;
use std::time::Duration;

use mock_support::*;
use pqmeter_rs::modbus::serial_mock::{MockConnector, MockDevice, MockOp, MockReply};
use pqmeter_rs::{read_snapshot, DeviceConfig, ModbusLink, Pacing, PqError};

#[tokio::test]
async fn test_connect_uses_device_parameters() {
    let device = MockDevice::new();
    let mut link = fast_link(&device);
    assert!(!link.is_open());

    let other = DeviceConfig {
        baud_rate: 19200,
        slave_id: 7,
    };
    link.connect(&other).await.unwrap();

    assert!(link.is_open());
    assert_eq!(device.open_count(), 1);
    assert_eq!(device.last_device(), Some(other));
}

#[tokio::test]
async fn test_reconnect_closes_previous_session() {
    let device = MockDevice::new();
    let mut link = fast_link(&device);

    link.connect(&DEVICE).await.unwrap();
    link.connect(&DEVICE).await.unwrap();

    assert_eq!(device.open_count(), 2);
    assert_eq!(device.close_count(), 1);
    assert!(link.is_open());
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let device = MockDevice::new();
    let mut link = fast_link(&device);

    link.disconnect().await;
    link.connect(&DEVICE).await.unwrap();
    link.disconnect().await;
    link.disconnect().await;

    assert!(!link.is_open());
    assert_eq!(device.close_count(), 1);
}

#[tokio::test]
async fn test_open_failure_leaves_link_closed() {
    let connector = MockConnector::new(MockDevice::new());
    connector.fail_opens("permission denied");
    let mut link = ModbusLink::new(Arc::new(connector), Pacing::none());

    let result = link.connect(&DEVICE).await;

    assert!(matches!(result, Err(PqError::Link(_))));
    assert!(!link.is_open());
    link.disconnect().await;
}

#[tokio::test]
async fn test_protocol_requires_open_link() {
    let mut link = fast_link(&MockDevice::new());
    assert!(matches!(link.protocol(), Err(PqError::NotConnected)));
}

#[tokio::test]
async fn test_short_reply_is_data_shape_error() {
    let device = MockDevice::new();
    device.script_input(4, MockReply::Registers(vec![1; 10]));
    let mut link = fast_link(&device);
    link.connect(&DEVICE).await.unwrap();

    let mut protocol = link.protocol().unwrap();
    let result = protocol.read_input_registers(4, 34).await;

    assert!(matches!(
        result,
        Err(PqError::DataShape {
            expected: 34,
            actual: 10
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_delay_follows_failed_exchange() {
    let device = MockDevice::new();
    device.script_input(4, MockReply::Exception(4));
    let mut link = paced_link(&device);
    link.connect(&DEVICE).await.unwrap();

    let started = tokio::time::Instant::now();
    let mut protocol = link.protocol().unwrap();
    let result = protocol.read_input_registers(4, 34).await;

    assert!(matches!(result, Err(PqError::Read { address: 4, .. })));
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn test_read_snapshot_over_link() {
    let device = loaded_device(0);
    let mut link = fast_link(&device);
    link.connect(&DEVICE).await.unwrap();

    let snapshot = read_snapshot(&mut link).await.unwrap();

    assert_eq!(snapshot.frequency, 50.0);
    assert_eq!(snapshot.phase_voltage_a, 230.1);
    assert_eq!(snapshot.reactive_power, snapshot.total_reactive_power);
    assert_eq!(
        device.ops(),
        vec![
            MockOp::ReadInput {
                address: 4,
                count: 34
            },
            MockOp::ReadInput {
                address: 106,
                count: 12
            },
            MockOp::ReadInput {
                address: 134,
                count: 18
            },
        ]
    );
}

#[tokio::test]
async fn test_empty_snapshot_range_fails_block_length() {
    let device = loaded_device(0);
    device.script_input(134, MockReply::Empty);
    let mut link = fast_link(&device);
    link.connect(&DEVICE).await.unwrap();

    let result = read_snapshot(&mut link).await;

    assert!(matches!(
        result,
        Err(PqError::DataShape {
            expected: 64,
            actual: 46
        })
    ));
}
