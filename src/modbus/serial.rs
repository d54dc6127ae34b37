//! # Modbus RTU Serial Link
//!
//! This module owns the serial connection to the meter: opening the port
//! with RTU framing, addressing the configured slave, and closing it again.
//! A `ModbusLink` is either closed or holds exactly one open transport.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio_modbus::client::{rtu, Client, Context};
use tokio_modbus::{Request, Response, Slave};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};

use crate::config::DeviceConfig;
use crate::constants::{DEFAULT_SERIAL_PORT, EXCHANGE_TIMEOUT};
use crate::error::{ExchangeFault, PqError};
use crate::modbus::protocol::{Pacing, RegisterProtocol, RegisterTransport};

/// Configuration for the serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    /// Bound on a single register exchange.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: DEFAULT_SERIAL_PORT.to_string(),
            timeout: EXCHANGE_TIMEOUT,
        }
    }
}

/// Opens transports for a device. The link manager calls this on connect.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn RegisterTransport>, PqError>;
}

/// Opens the real serial port: 8 data bits, 1 stop bit, no parity.
#[derive(Debug, Clone, Default)]
pub struct RtuConnector {
    config: SerialConfig,
}

impl RtuConnector {
    pub fn new(config: SerialConfig) -> Self {
        RtuConnector { config }
    }
}

#[async_trait]
impl LinkConnector for RtuConnector {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn RegisterTransport>, PqError> {
        let port = tokio_serial::new(self.config.port.as_str(), device.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .timeout(self.config.timeout)
            .open_native_async()
            .map_err(|e| PqError::Link(format!("{}: {e}", self.config.port)))?;

        let ctx = rtu::attach_slave(port, Slave(device.slave_id));
        Ok(Box::new(RtuTransport {
            ctx,
            timeout: self.config.timeout,
        }))
    }
}

/// tokio-modbus RTU client context with a per-exchange timeout.
///
/// Requests go through `Client::call` so that short and empty replies come
/// back as data for the protocol layer to judge.
pub struct RtuTransport {
    ctx: Context,
    timeout: Duration,
}

#[async_trait]
impl RegisterTransport for RtuTransport {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExchangeFault> {
        let request = Request::ReadInputRegisters(address, count);
        match self.exchange(request).await? {
            Response::ReadInputRegisters(words) => Ok(words),
            other => Err(unexpected(other)),
        }
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExchangeFault> {
        let request = Request::ReadHoldingRegisters(address, count);
        match self.exchange(request).await? {
            Response::ReadHoldingRegisters(words) => Ok(words),
            other => Err(unexpected(other)),
        }
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), ExchangeFault> {
        let request = Request::WriteMultipleRegisters(address, Cow::Borrowed(values));
        match self.exchange(request).await? {
            Response::WriteMultipleRegisters(echo_address, echo_count)
                if echo_address == address && usize::from(echo_count) == values.len() =>
            {
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    async fn close(&mut self) -> Result<(), ExchangeFault> {
        self.ctx
            .disconnect()
            .await
            .map_err(|e| ExchangeFault::Transport(e.to_string()))?;
        Ok(())
    }
}

impl RtuTransport {
    async fn exchange(&mut self, request: Request<'_>) -> Result<Response, ExchangeFault> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.ctx.call(request)).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(exception))) => Err(ExchangeFault::Exception(u8::from(exception))),
            Ok(Err(e)) => Err(ExchangeFault::Transport(e.to_string())),
            Err(_) => Err(ExchangeFault::Transport(format!("no reply within {timeout:?}"))),
        }
    }
}

fn unexpected(response: Response) -> ExchangeFault {
    ExchangeFault::Transport(format!("unexpected response {response:?}"))
}

/// Lifecycle of the serial connection: Closed -> Open -> Closed.
pub struct ModbusLink {
    connector: Arc<dyn LinkConnector>,
    transport: Option<Box<dyn RegisterTransport>>,
    pacing: Pacing,
}

impl ModbusLink {
    pub fn new(connector: Arc<dyn LinkConnector>, pacing: Pacing) -> Self {
        ModbusLink {
            connector,
            transport: None,
            pacing,
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Opens the link for `device`, closing any previous session first.
    pub async fn connect(&mut self, device: &DeviceConfig) -> Result<(), PqError> {
        if self.is_open() {
            debug!("Closing existing link before reconnecting");
            self.disconnect().await;
        }
        let transport = self.connector.open(device).await?;
        self.transport = Some(transport);
        info!(
            "Modbus link open at {} baud, slave {}",
            device.baud_rate, device.slave_id
        );
        Ok(())
    }

    /// Closes the link if it is open. Safe to call in any state.
    pub async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!("Error while closing Modbus link: {e}");
            }
            info!("Modbus link closed");
        }
    }

    /// Paced register access over the open transport.
    pub fn protocol(&mut self) -> Result<RegisterProtocol<'_>, PqError> {
        let pacing = self.pacing;
        self.transport
            .as_mut()
            .map(|transport| RegisterProtocol::new(transport, pacing))
            .ok_or(PqError::NotConnected)
    }
}
