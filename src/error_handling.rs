//! Error taxonomy shared by every subsystem.
//!
//! Failures are contained at the smallest enclosing unit: one line, one
//! file, one device's capture loop or one reconciliation pass.

pub mod types;

pub use types::{CaptureError, ConfigError, ControllerError, DeviceError, StorageError};
