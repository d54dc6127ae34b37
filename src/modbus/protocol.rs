//! # Register Read Protocol
//!
//! Paced register exchanges over an open link. The meter needs a quiet
//! period after every request to turn its RS-485 transceiver around, so
//! every read and write here is followed by the inter-request delay,
//! whether it succeeded or not.

use std::time::Duration;

use async_trait::async_trait;

use crate::constants::{EVENT_PACING_DELAY, INTER_REQUEST_DELAY, WAVEFORM_SEEK_DELAY};
use crate::error::{ExchangeFault, PqError};

/// One request-response exchange with the device.
#[async_trait]
pub trait RegisterTransport: Send {
    async fn read_input_registers(&mut self, address: u16, count: u16)
        -> Result<Vec<u16>, ExchangeFault>;

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExchangeFault>;

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), ExchangeFault>;

    /// Releases the underlying port.
    async fn close(&mut self) -> Result<(), ExchangeFault>;
}

/// Device timing applied by the protocol and the event drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// Quiet period after every exchange.
    pub inter_request: Duration,
    /// Extra settle time after seeking the waveform cursor.
    pub waveform_seek: Duration,
    /// Pause between two drained events.
    pub between_events: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            inter_request: INTER_REQUEST_DELAY,
            waveform_seek: WAVEFORM_SEEK_DELAY,
            between_events: EVENT_PACING_DELAY,
        }
    }
}

impl Pacing {
    /// No delays at all. Only useful against simulated devices.
    pub fn none() -> Self {
        Pacing {
            inter_request: Duration::ZERO,
            waveform_seek: Duration::ZERO,
            between_events: Duration::ZERO,
        }
    }
}

/// Paced access to an open transport.
pub struct RegisterProtocol<'a> {
    transport: &'a mut Box<dyn RegisterTransport>,
    pacing: Pacing,
}

impl<'a> RegisterProtocol<'a> {
    pub fn new(transport: &'a mut Box<dyn RegisterTransport>, pacing: Pacing) -> Self {
        RegisterProtocol { transport, pacing }
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    /// Reads `count` input registers.
    ///
    /// An empty reply is passed through as an empty block; any other
    /// length that differs from `count` is a `DataShape` error.
    pub async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, PqError> {
        let reply = self.transport.read_input_registers(address, count).await;
        pause(self.pacing.inter_request).await;
        let values = reply.map_err(|fault| PqError::Read {
            address,
            count,
            fault,
        })?;
        check_block_len(values, count)
    }

    /// Reads `count` holding registers. Same length rules as input reads.
    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, PqError> {
        let reply = self.transport.read_holding_registers(address, count).await;
        pause(self.pacing.inter_request).await;
        let values = reply.map_err(|fault| PqError::Read {
            address,
            count,
            fault,
        })?;
        check_block_len(values, count)
    }

    /// Writes consecutive holding registers starting at `address`.
    pub async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<(), PqError> {
        let reply = self.transport.write_multiple_registers(address, values).await;
        pause(self.pacing.inter_request).await;
        reply.map_err(|fault| PqError::Write { address, fault })
    }
}

/// Suspends for `delay`; zero delays return immediately.
pub async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn check_block_len(values: Vec<u16>, count: u16) -> Result<Vec<u16>, PqError> {
    if values.is_empty() || values.len() == usize::from(count) {
        Ok(values)
    } else {
        Err(PqError::DataShape {
            expected: usize::from(count),
            actual: values.len(),
        })
    }
}
