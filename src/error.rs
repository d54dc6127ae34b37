//! # Power-Quality Meter Error Handling
//!
//! This module defines the PqError enum, which represents the different error
//! types that can occur while talking to the meter and forwarding its data.

use thiserror::Error;

use crate::constants::{MODBUS_EXCEPTION_DEVICE_BUSY, MODBUS_EXCEPTION_NO_RECORD_READY};
use crate::payload::FlashPointer;
use crate::sink::SinkError;

/// Why a single register exchange failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeFault {
    /// The device answered with a Modbus exception reply.
    #[error("Modbus exception {0}")]
    Exception(u8),

    /// The exchange never completed (I/O error, timeout, bad framing).
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ExchangeFault {
    /// Returns true when the device is signalling "not ready" rather than failing.
    pub fn is_device_busy(&self) -> bool {
        matches!(
            self,
            ExchangeFault::Exception(
                MODBUS_EXCEPTION_DEVICE_BUSY | MODBUS_EXCEPTION_NO_RECORD_READY
            )
        )
    }
}

/// Represents the different error types that can occur in the crate.
#[derive(Debug, Error)]
pub enum PqError {
    /// The serial link could not be opened or closed.
    #[error("Link error: {0}")]
    Link(String),

    /// An exchange was attempted while no link was open.
    #[error("Link is not open")]
    NotConnected,

    /// A read request failed.
    #[error("Read of {count} registers at {address} failed: {fault}")]
    Read {
        address: u16,
        count: u16,
        fault: ExchangeFault,
    },

    /// A write request failed.
    #[error("Write at {address} failed: {fault}")]
    Write { address: u16, fault: ExchangeFault },

    /// A register block did not have the expected number of values.
    #[error("Unexpected register block length: expected {expected}, got {actual}")]
    DataShape { expected: usize, actual: usize },

    /// A flash pointer does not fit the 16-bit waveform seek register.
    #[error("Flash pointer {0} does not fit the waveform seek register")]
    SeekOutOfRange(FlashPointer),

    /// A waveform sample address falls outside the register space.
    #[error("Waveform sample {index} is outside the register space")]
    SampleAddress { index: usize },

    /// A downstream store failed.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// The configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PqError {
    /// Returns true when the error is the device's busy signal on a read or write.
    pub fn is_device_busy(&self) -> bool {
        match self {
            PqError::Read { fault, .. } | PqError::Write { fault, .. } => fault.is_device_busy(),
            _ => false,
        }
    }
}
