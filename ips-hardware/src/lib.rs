//! ips-hardware
//!
//! Hardware crate for IPS superconducting magnet power supplies: the serial
//! driver, the reconnecting instrument session, the safety interlock and the
//! ramp/mode controller built on top of them.
//
//! Public API:
//! - `magnet_controller::MagnetController`: high-level, shareable controller
//! - `serial_driver::SerialDriver`: low-level serial I/O driver
//! - `serial_driver::list_ports`: enumerate serial devices
//! - `simulator::SimulatedIps`: in-memory instrument for tests and mock mode

pub mod guard;
pub mod interlock;
pub mod magnet_controller;
pub mod ramp;
pub mod serial_driver;
pub mod session;
pub mod simulator;

pub use magnet_controller::MagnetController;
pub use serial_driver::{list_ports, Connector, SerialConnector, SerialDriver, SerialTransport};
pub use session::InstrumentSession;
pub use simulator::{SimulatedConnector, SimulatedIps};
