//! One link session: open, read the snapshot, drain events, close.

use log::{debug, info};

use crate::acquisition::event_capture::{EventCapture, Termination};
use crate::acquisition::AcquisitionCycle;
use crate::config::DeviceConfig;
use crate::constants::{SNAPSHOT_BLOCK_LEN, SNAPSHOT_READS};
use crate::error::PqError;
use crate::modbus::protocol::RegisterProtocol;
use crate::modbus::serial::ModbusLink;
use crate::payload::PowerSnapshot;

/// Reads the three snapshot ranges and builds the snapshot from their
/// concatenation.
pub async fn read_snapshot(protocol: &mut RegisterProtocol<'_>) -> Result<PowerSnapshot, PqError> {
    let mut block = Vec::with_capacity(SNAPSHOT_BLOCK_LEN);
    for (address, count) in SNAPSHOT_READS {
        let values = protocol.read_input_registers(address, count).await?;
        debug!("Read {} input registers at {address}", values.len());
        block.extend(values);
    }
    let snapshot = PowerSnapshot::from_registers(&block)?;
    info!(
        "Snapshot: {:.1} Hz, {:.1} V / {:.1} V / {:.1} V",
        snapshot.frequency,
        snapshot.phase_voltage_a,
        snapshot.phase_voltage_b,
        snapshot.phase_voltage_c
    );
    Ok(snapshot)
}

/// Runs one session against `device` and always leaves the link closed.
///
/// A failure to open the link or to read the snapshot fails the session.
/// Drain problems do not: the events captured so far are returned with
/// the drain's termination.
pub async fn run_session(
    link: &mut ModbusLink,
    device: &DeviceConfig,
    capture: &EventCapture,
) -> Result<(AcquisitionCycle, Termination), PqError> {
    let result = acquire(link, device, capture).await;
    link.disconnect().await;
    result
}

async fn acquire(
    link: &mut ModbusLink,
    device: &DeviceConfig,
    capture: &EventCapture,
) -> Result<(AcquisitionCycle, Termination), PqError> {
    link.connect(device).await?;
    let mut protocol = link.protocol()?;
    let snapshot = read_snapshot(&mut protocol).await?;
    let report = capture.run(&mut protocol).await;

    let cycle = AcquisitionCycle {
        snapshot: Some(snapshot),
        events: report.events,
    };
    Ok((cycle, report.termination))
}
