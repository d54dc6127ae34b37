//! # pqmeter-rs - Power-Quality Telemetry over Modbus RTU
//!
//! The pqmeter-rs crate acquires measurements from a three-phase
//! power-quality meter on an RS-485 Modbus RTU link, decodes the meter's
//! register encodings and forwards the results to a time-series store and
//! a relational store.
//!
//! ## Features
//!
//! - Open and close the RTU serial link with the configured baud rate and slave id
//! - Paced register reads and writes that respect the meter's turnaround time
//! - Decode the 64-register snapshot block into named float measurements
//! - Drain the meter's event buffer, including each event's waveform samples
//! - Run acquisition cycles on a fixed interval with a single-flight guard on the link
//! - Write snapshots to InfluxDB and events to SQLite with bounded retry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pqmeter_rs::{connect, disconnect, drain_events, read_snapshot, DeviceConfig, SerialConfig};
//!
//! # async fn demo() -> Result<(), pqmeter_rs::PqError> {
//! let device = DeviceConfig { baud_rate: 9600, slave_id: 1 };
//! let mut link = connect(SerialConfig::default(), &device).await?;
//! let snapshot = read_snapshot(&mut link).await?;
//! let report = drain_events(&mut link, 64).await?;
//! disconnect(&mut link).await;
//! println!("{} Hz, {} events", snapshot.frequency, report.events.len());
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod modbus;
pub mod payload;
pub mod pq_device_manager;
pub mod sink;

use std::sync::Arc;

pub use crate::error::{ExchangeFault, PqError};
pub use crate::logging::{init_logger, log_info};

pub use acquisition::{
    AcquisitionCycle, CaptureReport, CycleOutcome, DrainReason, EventCapture, Scheduler,
    SkipReason, Termination,
};
pub use config::{AppConfig, DeviceConfig};
pub use modbus::{ModbusLink, Pacing, RtuConnector, SerialConfig};
pub use payload::{BcdDateTime, FlashPointer, PowerSnapshot, PqEvent};
pub use pq_device_manager::{CycleStats, PqDeviceManager};
pub use sink::{SinkError, SqliteStore};

/// Opens an RTU link to `device` on the configured serial port.
///
/// # Returns
/// * `Ok(ModbusLink)` - Open link with the default device pacing
/// * `Err(PqError::Link)` - The port could not be opened
pub async fn connect(serial: SerialConfig, device: &DeviceConfig) -> Result<ModbusLink, PqError> {
    let mut link = ModbusLink::new(Arc::new(RtuConnector::new(serial)), Pacing::default());
    link.connect(device).await?;
    Ok(link)
}

/// Closes the link. Safe to call on a link that is already closed.
pub async fn disconnect(link: &mut ModbusLink) {
    link.disconnect().await
}

/// Reads and decodes one snapshot over an open link.
pub async fn read_snapshot(link: &mut ModbusLink) -> Result<PowerSnapshot, PqError> {
    let mut protocol = link.protocol()?;
    acquisition::read_snapshot(&mut protocol).await
}

/// Drains up to `max_events` events over an open link.
///
/// # Returns
/// * `Ok(CaptureReport)` - Captured events and how the drain ended
/// * `Err(PqError::NotConnected)` - The link is not open
pub async fn drain_events(
    link: &mut ModbusLink,
    max_events: usize,
) -> Result<CaptureReport, PqError> {
    let mut protocol = link.protocol()?;
    Ok(EventCapture::new(max_events).run(&mut protocol).await)
}
