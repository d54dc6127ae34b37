//! Simulated meter for testing
//!
//! This module provides a scripted register device that can be used to
//! exercise the link, protocol and event drain without real hardware.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::DeviceConfig;
use crate::error::{ExchangeFault, PqError};
use crate::modbus::protocol::RegisterTransport;
use crate::modbus::serial::LinkConnector;

/// A scripted reply to one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Registers(Vec<u16>),
    Empty,
    Exception(u8),
    TransportError(String),
}

/// One exchange as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    ReadInput { address: u16, count: u16 },
    ReadHolding { address: u16, count: u16 },
    Write { address: u16, values: Vec<u16> },
    Close,
}

/// Holds the next exchange open until released.
#[derive(Clone, Default)]
pub struct MockGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl MockGate {
    /// Resolves once an exchange is parked on the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the parked exchange continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct MockState {
    input: HashMap<u16, u16>,
    holding: HashMap<u16, u16>,
    input_script: HashMap<u16, VecDeque<MockReply>>,
    holding_script: HashMap<u16, VecDeque<MockReply>>,
    holding_fallback: HashMap<u16, MockReply>,
    write_errors: HashMap<u16, ExchangeFault>,
    ops: Vec<MockOp>,
    gate: Option<MockGate>,
    last_device: Option<DeviceConfig>,
}

/// Simulated meter shared between the test and the link under test.
#[derive(Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets consecutive input registers starting at `address`.
    pub fn set_input_registers(&self, address: u16, values: &[u16]) {
        let mut state = self.state.lock().unwrap();
        for (offset, value) in values.iter().enumerate() {
            state.input.insert(address + offset as u16, *value);
        }
    }

    /// Sets consecutive holding registers starting at `address`.
    pub fn set_holding_registers(&self, address: u16, values: &[u16]) {
        let mut state = self.state.lock().unwrap();
        for (offset, value) in values.iter().enumerate() {
            state.holding.insert(address + offset as u16, *value);
        }
    }

    /// Queues a reply for the next input read at `address`.
    pub fn script_input(&self, address: u16, reply: MockReply) {
        let mut state = self.state.lock().unwrap();
        state.input_script.entry(address).or_default().push_back(reply);
    }

    /// Queues a reply for the next holding read at `address`.
    pub fn script_holding(&self, address: u16, reply: MockReply) {
        let mut state = self.state.lock().unwrap();
        state.holding_script.entry(address).or_default().push_back(reply);
    }

    /// Reply used for holding reads at `address` once its script runs out.
    pub fn set_holding_fallback(&self, address: u16, reply: MockReply) {
        let mut state = self.state.lock().unwrap();
        state.holding_fallback.insert(address, reply);
    }

    /// Makes writes at `address` fail.
    pub fn fail_writes_at(&self, address: u16, fault: ExchangeFault) {
        let mut state = self.state.lock().unwrap();
        state.write_errors.insert(address, fault);
    }

    /// Parks the next exchange until the returned gate is released.
    pub fn hold_next_exchange(&self) -> MockGate {
        let gate = MockGate::default();
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    /// Every exchange so far, in order.
    pub fn ops(&self) -> Vec<MockOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Device parameters of the most recent open.
    pub fn last_device(&self) -> Option<DeviceConfig> {
        self.state.lock().unwrap().last_device
    }

    async fn pass_gate(&self) {
        let gate = self.state.lock().unwrap().gate.take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }

    fn read_map(map: &HashMap<u16, u16>, address: u16, count: u16) -> Vec<u16> {
        (0..count)
            .map(|offset| map.get(&(address + offset)).copied().unwrap_or(0))
            .collect()
    }
}

fn resolve(reply: MockReply) -> Result<Vec<u16>, ExchangeFault> {
    match reply {
        MockReply::Registers(values) => Ok(values),
        MockReply::Empty => Ok(Vec::new()),
        MockReply::Exception(code) => Err(ExchangeFault::Exception(code)),
        MockReply::TransportError(text) => Err(ExchangeFault::Transport(text)),
    }
}

#[async_trait]
impl RegisterTransport for MockDevice {
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExchangeFault> {
        self.pass_gate().await;
        let mut state = self.state.lock().unwrap();
        state.ops.push(MockOp::ReadInput { address, count });
        let scripted = state
            .input_script
            .get_mut(&address)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(reply) => resolve(reply),
            None => Ok(Self::read_map(&state.input, address, count)),
        }
    }

    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExchangeFault> {
        self.pass_gate().await;
        let mut state = self.state.lock().unwrap();
        state.ops.push(MockOp::ReadHolding { address, count });
        let mut scripted = state
            .holding_script
            .get_mut(&address)
            .and_then(|queue| queue.pop_front());
        if scripted.is_none() {
            scripted = state.holding_fallback.get(&address).cloned();
        }
        match scripted {
            Some(reply) => resolve(reply),
            None => Ok(Self::read_map(&state.holding, address, count)),
        }
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), ExchangeFault> {
        self.pass_gate().await;
        let mut state = self.state.lock().unwrap();
        state.ops.push(MockOp::Write {
            address,
            values: values.to_vec(),
        });
        if let Some(fault) = state.write_errors.get(&address) {
            return Err(fault.clone());
        }
        for (offset, value) in values.iter().enumerate() {
            state.holding.insert(address + offset as u16, *value);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ExchangeFault> {
        self.state.lock().unwrap().ops.push(MockOp::Close);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out the shared `MockDevice` as the link's transport.
#[derive(Clone, Default)]
pub struct MockConnector {
    device: MockDevice,
    open_error: Arc<Mutex<Option<String>>>,
}

impl MockConnector {
    pub fn new(device: MockDevice) -> Self {
        MockConnector {
            device,
            open_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes every following open fail with a link error.
    pub fn fail_opens(&self, reason: &str) {
        *self.open_error.lock().unwrap() = Some(reason.to_string());
    }

    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

#[async_trait]
impl LinkConnector for MockConnector {
    async fn open(&self, device: &DeviceConfig) -> Result<Box<dyn RegisterTransport>, PqError> {
        if let Some(reason) = self.open_error.lock().unwrap().clone() {
            return Err(PqError::Link(reason));
        }
        self.device.opens.fetch_add(1, Ordering::SeqCst);
        self.device.state.lock().unwrap().last_device = Some(*device);
        Ok(Box::new(self.device.clone()))
    }
}
