//! Persistent per-device capture configuration (`connections.json`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};
use tokio::sync::broadcast;

use crate::device::DeviceIdentity;
use crate::error_handling::types::ConfigError;
use crate::storage::fs_check::ensure_file_usable;

use super::types::{CaptureDescriptor, Connections};

pub const CONNECTIONS_FILE: &str = "connections.json";

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// JSON backed map of [`CaptureDescriptor`]s.
///
/// Every successful [`update`](Self::update) is broadcast to subscribers
/// with the saved map. Access is serialized within the process; concurrent
/// edits from other processes are not detected.
pub struct ConnectionsConfig {
    path: PathBuf,
    lock: Mutex<()>,
    changes: broadcast::Sender<Connections>,
}

impl ConnectionsConfig {
    /// Opens the config under `base_dir`, creating an empty one if missing.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, ConfigError> {
        let path = base_dir.as_ref().join(CONNECTIONS_FILE);
        ensure_file_usable(&path, b"{}").map_err(|e| ConfigError::DirectoryUnusable(e.to_string()))?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            lock: Mutex::new(()),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current entries with their live state cleared.
    pub fn list(&self) -> Result<Connections, ConfigError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.load()
    }

    /// Replaces the stored entries and notifies subscribers.
    pub fn update(&self, connections: &Connections) -> Result<(), ConfigError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.save(connections)
    }

    /// Receives the saved map after each successful update.
    pub fn subscribe(&self) -> broadcast::Receiver<Connections> {
        self.changes.subscribe()
    }

    pub fn set_baud_rate(&self, identity: &DeviceIdentity, baud_rate: u32) -> Result<bool, ConfigError> {
        self.modify(identity, |d| d.baud_rate = baud_rate)
    }

    pub fn set_data_capture(&self, identity: &DeviceIdentity, on: bool) -> Result<bool, ConfigError> {
        self.modify(identity, |d| d.data_capture_on = on)
    }

    pub fn set_name(&self, identity: &DeviceIdentity, name: &str) -> Result<bool, ConfigError> {
        self.modify(identity, |d| d.name = name.to_string())
    }

    /// Applies `change` to the entry of `identity` and saves. Returns
    /// `false`, without saving, when no such entry exists.
    fn modify<F>(&self, identity: &DeviceIdentity, change: F) -> Result<bool, ConfigError>
    where
        F: FnOnce(&mut CaptureDescriptor),
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut connections = self.load()?;
        let Some(descriptor) = connections.get_mut(identity) else {
            warn!("No configuration entry for device {}, nothing changed", identity);
            return Ok(false);
        };
        change(descriptor);
        self.save(&connections)?;
        Ok(true)
    }

    fn load(&self) -> Result<Connections, ConfigError> {
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(Connections::new());
        }
        let mut connections: Connections = serde_json::from_str::<Option<Connections>>(&text)?.unwrap_or_default();
        for descriptor in connections.values_mut() {
            descriptor.clear_live();
        }
        debug!("Loaded {} connection(s) from {}", connections.len(), self.path.display());
        Ok(connections)
    }

    fn save(&self, connections: &Connections) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(connections)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        info!("Saved {} connection(s) to {}", connections.len(), self.path.display());
        // no receivers is fine
        let _ = self.changes.send(connections.clone());
        Ok(())
    }
}
