// Shared fixtures for the integration tests: register images for the
// simulated meter and a link wired to it.
#![allow(dead_code)]

use std::sync::Arc;

use pqmeter_rs::constants::{
    EVENT_BUFFER_ADDRESS, SNAPSHOT_BLOCK_LEN, SNAPSHOT_READS, WAVEFORM_FIRST_ADDRESS,
    WAVEFORM_SAMPLES, WAVEFORM_STRIDE,
};
use pqmeter_rs::modbus::serial_mock::{MockConnector, MockDevice, MockReply};
use pqmeter_rs::payload::{decimal_to_bcd, encode_status_word, f32_to_registers, StatusWord};
use pqmeter_rs::{DeviceConfig, ModbusLink, Pacing};

pub const DEVICE: DeviceConfig = DeviceConfig {
    baud_rate: 9600,
    slave_id: 1,
};

/// A 15-register event record dated 2024-03-15 09:30:45.250.
pub fn event_record(flash_start: u32, event_type: u8, event_channel: u8) -> Vec<u16> {
    let status = encode_status_word(StatusWord {
        event_type,
        event_channel,
        record_status: 1,
    });
    let (max_h, max_l) = f32_to_registers(253.5);
    let (min_h, min_l) = f32_to_registers(180.25);
    let flash_end = flash_start + 0x0E00;
    let bcd = |high: u8, low: u8| u16::from_be_bytes([decimal_to_bcd(high), decimal_to_bcd(low)]);
    vec![
        status,
        (flash_start >> 16) as u16,
        flash_start as u16,
        (flash_end >> 16) as u16,
        flash_end as u16,
        0,
        3840,
        max_h,
        max_l,
        min_h,
        min_l,
        bcd(24, 3),
        bcd(15, 9),
        bcd(30, 45),
        250,
    ]
}

/// A snapshot block with plausible mains values.
pub fn snapshot_block() -> Vec<u16> {
    let mut block = vec![0u16; SNAPSHOT_BLOCK_LEN];
    let mut put = |index: usize, value: f32| {
        let (high, low) = f32_to_registers(value);
        block[index] = high;
        block[index + 1] = low;
    };
    put(0, 12.5);
    put(6, 230.1);
    put(8, 229.8);
    put(10, 231.0);
    put(22, -3.25);
    put(26, 50.0);
    put(52, 2.5);
    block
}

/// Lays `block` out over the three snapshot input ranges.
pub fn load_snapshot(device: &MockDevice, block: &[u16]) {
    let mut offset = 0;
    for (address, count) in SNAPSHOT_READS {
        let end = (offset + usize::from(count)).min(block.len());
        device.set_input_registers(address, &block[offset..end]);
        offset = end;
    }
}

/// Puts one set of samples at the waveform addresses.
pub fn load_waveform(device: &MockDevice, samples: &[u16; WAVEFORM_SAMPLES]) {
    for (index, sample) in samples.iter().enumerate() {
        let address = WAVEFORM_FIRST_ADDRESS + WAVEFORM_STRIDE * index as u16;
        device.set_holding_registers(address, &[*sample]);
    }
}

pub fn ramp_waveform() -> [u16; WAVEFORM_SAMPLES] {
    let mut samples = [0u16; WAVEFORM_SAMPLES];
    for (index, sample) in samples.iter_mut().enumerate() {
        *sample = 1000 + index as u16;
    }
    samples
}

/// Queues `count` event records, then an empty buffer for good.
pub fn queue_events(device: &MockDevice, count: usize) {
    for n in 0..count {
        device.script_holding(
            EVENT_BUFFER_ADDRESS,
            MockReply::Registers(event_record(0x1000 + n as u32 * 0x1000, 2, 1)),
        );
    }
    device.set_holding_fallback(EVENT_BUFFER_ADDRESS, MockReply::Empty);
}

/// A meter with a snapshot, a waveform and `events` pending events.
pub fn loaded_device(events: usize) -> MockDevice {
    let device = MockDevice::new();
    load_snapshot(&device, &snapshot_block());
    load_waveform(&device, &ramp_waveform());
    queue_events(&device, events);
    device
}

/// Closed link to `device` without pacing delays.
pub fn fast_link(device: &MockDevice) -> ModbusLink {
    ModbusLink::new(Arc::new(MockConnector::new(device.clone())), Pacing::none())
}

/// Closed link to `device` with the meter's real pacing.
pub fn paced_link(device: &MockDevice) -> ModbusLink {
    ModbusLink::new(Arc::new(MockConnector::new(device.clone())), Pacing::default())
}
