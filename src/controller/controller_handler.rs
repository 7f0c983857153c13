use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture_management::{spawn_scheduler, CaptureSupervisor};
use crate::configuration::{CaptureDescriptor, Connections, ConnectionsConfig, Settings};
use crate::data_capture::{Record, RecordReader};
use crate::device::{DeviceIdentity, DeviceProvider};
use crate::error_handling::types::*;
use crate::storage::fs_check::ensure_directory_usable;

/// Display name given to devices seen for the first time.
pub const NEW_DEVICE_NAME: &str = "New Device";

/// Entry point of the capture service: owns the configuration, the
/// supervisor with its scheduler, and the query side.
pub struct Controller {
    settings: Settings,
    devices: Arc<dyn DeviceProvider>,
    config: Arc<ConnectionsConfig>,
    supervisor: Arc<CaptureSupervisor>,
    reader: RecordReader,
    scheduler: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Controller {
    /// Prepares the base directory, its data directory and the connection
    /// config. Nothing is captured until [`start`](Self::start).
    pub fn new(settings: Settings, devices: Arc<dyn DeviceProvider>) -> Result<Self, ControllerError> {
        info!("Initializing controller in {}", settings.base_dir.display());
        ensure_directory_usable(&settings.base_dir)?;
        let storage = settings.storage();
        ensure_directory_usable(storage.data_dir())?;
        let config = Arc::new(ConnectionsConfig::new(&settings.base_dir)?);

        let supervisor = CaptureSupervisor::new(Arc::clone(&devices), storage.clone())
            .with_poll_interval(settings.poll_interval)
            .with_read_buffer_size(settings.read_buffer_size);

        Ok(Self {
            settings,
            devices,
            config,
            supervisor: Arc::new(supervisor),
            reader: RecordReader::new(storage),
            scheduler: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Known devices merged with the currently attached ones, sorted by name.
    ///
    /// Attached devices missing from the config are added with capture
    /// turned off; the config is only saved when that happened. An
    /// unreadable config is logged and treated as empty.
    pub fn list_connections(&self) -> Vec<CaptureDescriptor> {
        let mut configured = self.config.list().unwrap_or_else(|e| {
            warn!("Failed to read connections config: {}", e);
            Connections::new()
        });

        let mut added = false;
        for device in self.devices.list_available() {
            match configured.get_mut(&device.identity) {
                Some(descriptor) => descriptor.refresh_live(&device),
                None => {
                    info!("Added new connection to configuration: {}", device.identity);
                    configured.insert(
                        device.identity.clone(),
                        CaptureDescriptor::discovered(&device, NEW_DEVICE_NAME),
                    );
                    added = true;
                }
            }
        }
        if added {
            if let Err(e) = self.config.update(&configured) {
                warn!("Failed to save connections config: {}", e);
            }
        }

        let mut result: Vec<CaptureDescriptor> = configured.into_values().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Returns `false` when `identity` has no configuration entry.
    pub fn set_baud_rate(&self, identity: &DeviceIdentity, baud_rate: u32) -> Result<bool, ControllerError> {
        Ok(self.config.set_baud_rate(identity, baud_rate)?)
    }

    /// Returns `false` when `identity` has no configuration entry.
    pub fn set_data_capture(&self, identity: &DeviceIdentity, on: bool) -> Result<bool, ControllerError> {
        Ok(self.config.set_data_capture(identity, on)?)
    }

    /// Returns `false` when `identity` has no configuration entry.
    pub fn set_name(&self, identity: &DeviceIdentity, name: &str) -> Result<bool, ControllerError> {
        Ok(self.config.set_name(identity, name)?)
    }

    pub fn read_events(&self, identity: &DeviceIdentity, start_ms: i64, end_ms: i64) -> Vec<Record> {
        self.reader.read_events(identity, start_ms, end_ms)
    }

    pub fn scan<F>(&self, identity: &DeviceIdentity, start_ms: i64, end_ms: i64, visit: F)
    where
        F: FnMut(Record) -> ControlFlow<()>,
    {
        self.reader.scan(identity, start_ms, end_ms, visit)
    }

    pub fn is_capturing(&self, identity: &DeviceIdentity) -> bool {
        self.supervisor.is_capturing(identity)
    }

    /// Starts the reconciliation scheduler; the first pass runs right away.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), ControllerError> {
        let mut scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
        if scheduler.is_some() {
            return Err(ControllerError::InitializationFailed(
                "capture is already running".to_string(),
            ));
        }
        let cancel = CancellationToken::new();
        let handle = spawn_scheduler(
            Arc::clone(&self.supervisor),
            Arc::clone(&self.config),
            self.settings.sync_interval,
            cancel.clone(),
        );
        *scheduler = Some((cancel, handle));
        info!("Capture started");
        Ok(())
    }

    /// Stops the scheduler, then every capture loop, and waits for them.
    pub async fn shutdown(&self) {
        let scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some((cancel, handle)) = scheduler {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!("Capture scheduler failed: {}", e);
            }
        }
        self.supervisor.shutdown().await;
        info!("Capture stopped");
    }
}
