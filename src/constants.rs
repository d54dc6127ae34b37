//! Meter Register Map and Timing Constants
//!
//! This module defines the fixed register addresses, record layouts and
//! device timing used when talking to the three-phase power-quality meter.

use std::time::Duration;

/// Serial device the meter is attached to.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyS0";

// ----------------------------------------------------------------------------
// Snapshot block (input registers)
// ----------------------------------------------------------------------------

/// (start address, register count) of the three input-register reads that
/// make up one snapshot block, in the order they are concatenated.
pub const SNAPSHOT_READS: [(u16, u16); 3] = [(4, 34), (106, 12), (134, 18)];

/// Total length of the concatenated snapshot block.
pub const SNAPSHOT_BLOCK_LEN: usize = 64;

// ----------------------------------------------------------------------------
// Event buffer (holding registers)
// ----------------------------------------------------------------------------

/// Holding register where the device exposes the next pending event record.
pub const EVENT_BUFFER_ADDRESS: u16 = 4100;

/// Number of registers in one event record.
pub const EVENT_RECORD_LEN: u16 = 15;

/// Raw duration ticks per second.
pub const DURATION_TICKS_PER_SECOND: f64 = 1920.0;

/// Control register pair used to position the waveform cursor.
pub const WAVEFORM_CONTROL_ADDRESS: u16 = 6014;

/// Command word written ahead of the flash pointer to seek the waveform cursor.
pub const WAVEFORM_SEEK_COMMAND: u16 = 0x1400;

/// Address of the first waveform sample.
pub const WAVEFORM_FIRST_ADDRESS: u16 = 6016;

/// Register distance between consecutive waveform samples.
pub const WAVEFORM_STRIDE: u16 = 6;

/// Samples captured per event.
pub const WAVEFORM_SAMPLES: usize = 20;

// ----------------------------------------------------------------------------
// Status word bit layout
// ----------------------------------------------------------------------------

pub const STATUS_EVENT_TYPE_SHIFT: u16 = 5;
pub const STATUS_EVENT_TYPE_MASK: u16 = 0b111;
pub const STATUS_EVENT_CHANNEL_SHIFT: u16 = 3;
pub const STATUS_EVENT_CHANNEL_MASK: u16 = 0b11;
pub const STATUS_RECORD_STATUS_MASK: u16 = 0b111;

/// BCD years are offsets from this century.
pub const BCD_YEAR_BASE: u16 = 2000;

// ----------------------------------------------------------------------------
// Modbus exception codes treated as "device busy"
// ----------------------------------------------------------------------------

/// Standard "server device busy" exception.
pub const MODBUS_EXCEPTION_DEVICE_BUSY: u8 = 0x06;

/// Meter-specific exception raised when no event record is ready.
pub const MODBUS_EXCEPTION_NO_RECORD_READY: u8 = 16;

// ----------------------------------------------------------------------------
// Timing
// ----------------------------------------------------------------------------

/// Minimum spacing after every register exchange.
pub const INTER_REQUEST_DELAY: Duration = Duration::from_millis(50);

/// Extra settle time after seeking the waveform cursor, on top of the
/// inter-request delay.
pub const WAVEFORM_SEEK_DELAY: Duration = Duration::from_millis(50);

/// Pacing between two logical events in the drain loop.
pub const EVENT_PACING_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on events drained in one cycle.
pub const MAX_EVENTS_PER_CYCLE: usize = 64;

/// Scheduler period.
pub const CYCLE_INTERVAL: Duration = Duration::from_secs(10);

/// Per-exchange transport timeout.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection acquisition attempts against the relational store.
pub const POOL_ACQUIRE_ATTEMPTS: u32 = 3;

/// Delay between connection acquisition attempts.
pub const POOL_ACQUIRE_DELAY: Duration = Duration::from_millis(1000);
