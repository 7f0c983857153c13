//! Configuration subsystem
//!
//! - `config`: runtime [`Settings`] from the command line and `settings.toml`.
//! - `connections`: the persisted per-device capture configuration.
//! - `types`: [`CaptureDescriptor`] and the [`Connections`] map.

pub mod config;
pub mod connections;
pub mod types;

pub use config::{Settings, SettingsArgs};
pub use connections::ConnectionsConfig;
pub use types::{CaptureDescriptor, Connections};
