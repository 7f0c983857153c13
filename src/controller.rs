//! Facade over configuration, capture and queries, used by the binary.

pub mod controller_handler;

pub use controller_handler::{Controller, NEW_DEVICE_NAME};
