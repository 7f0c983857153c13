//! Device discovery and I/O.
//!
//! The capture subsystem only talks to devices through [`DeviceProvider`]
//! and [`DevicePort`]; [`SerialDeviceProvider`] is the production
//! implementation over USB serial ports.

pub mod provider;
pub mod serial;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use provider::{DevicePort, DeviceProvider};
pub use serial::{SerialDeviceProvider, DEFAULT_BAUD_RATE};
pub use types::{DeviceIdentity, DeviceInfo};
