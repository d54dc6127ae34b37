//! The modbus module owns everything that talks to the meter: the RTU
//! serial link, the paced register protocol on top of it and a simulated
//! device for tests.

pub mod protocol;
pub mod serial;
pub mod serial_mock;

pub use protocol::{Pacing, RegisterProtocol, RegisterTransport};
pub use serial::{LinkConnector, ModbusLink, RtuConnector, SerialConfig};
