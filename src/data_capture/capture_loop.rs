//! Per-device capture worker: connects to one device at one baud rate and
//! streams its output into the line codec writer until cancelled or the
//! device goes away.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::{DeviceIdentity, DevicePort, DeviceProvider};
use crate::error_handling::types::{CaptureError, DeviceError};
use crate::storage::FileStorage;

use super::writer::RecordWriter;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
pub const DEFAULT_READ_BUFFER_SIZE: usize = 32 * 1024;

/// Why a capture loop terminated. None of these are retried by the loop
/// itself; restarting is up to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    DeviceNotFound,
    OpenFailed,
    Disconnected,
    StorageFailed,
    Cancelled,
}

pub struct CaptureLoop {
    identity: DeviceIdentity,
    baud_rate: u32,
    devices: Arc<dyn DeviceProvider>,
    storage: FileStorage,
    poll_interval: Duration,
    read_buffer_size: usize,
}

impl CaptureLoop {
    pub fn new(
        identity: DeviceIdentity,
        baud_rate: u32,
        devices: Arc<dyn DeviceProvider>,
        storage: FileStorage,
    ) -> Self {
        Self {
            identity,
            baud_rate,
            devices,
            storage,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size.max(1);
        self
    }

    /// Runs the loop on the blocking thread pool.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<CaptureOutcome> {
        tokio::task::spawn_blocking(move || self.run(&cancel))
    }

    /// Connects, streams and cleans up. Blocks the calling thread.
    pub fn run(self, cancel: &CancellationToken) -> CaptureOutcome {
        let Some(device) = self
            .devices
            .list_available()
            .into_iter()
            .find(|d| d.identity == self.identity)
        else {
            warn!("{}", DeviceError::NotFound(self.identity.to_string()));
            return CaptureOutcome::DeviceNotFound;
        };

        let mut port = match self.devices.open(&device, self.baud_rate) {
            Ok(port) => port,
            Err(e) => {
                warn!("[{}] {}", self.identity, e);
                return CaptureOutcome::OpenFailed;
            }
        };
        info!(
            "[{}] capturing from {} at {} baud",
            self.identity, device.system_path, self.baud_rate
        );

        let mut writer = RecordWriter::new(self.storage.clone(), self.identity.clone());
        let outcome = match self.stream(port.as_mut(), &mut writer, cancel) {
            Ok(()) => CaptureOutcome::Cancelled,
            Err(CaptureError::Device(e)) => {
                info!("[{}] {}", self.identity, e);
                CaptureOutcome::Disconnected
            }
            Err(CaptureError::Storage(e)) => {
                error!("[{}] {}", self.identity, e);
                CaptureOutcome::StorageFailed
            }
        };

        // device first, then the writer, whatever happened
        if let Err(e) = port.close() {
            warn!("[{}] {}", self.identity, e);
        }
        if let Err(e) = writer.close() {
            error!("[{}] {}", self.identity, e);
        }
        info!("[{}] capture stopped: {:?}", self.identity, outcome);
        outcome
    }

    /// Returns once cancelled, or with the first device or storage error.
    fn stream(
        &self,
        port: &mut dyn DevicePort,
        writer: &mut RecordWriter,
        cancel: &CancellationToken,
    ) -> Result<(), CaptureError> {
        let mut buf = vec![0u8; self.read_buffer_size];
        while !cancel.is_cancelled() {
            match port.read_available(&mut buf)? {
                0 => thread::sleep(self.poll_interval),
                n => {
                    debug!("[{}] read {} byte(s)", self.identity, n);
                    writer.write(&buf[..n])?;
                }
            }
        }
        Ok(())
    }
}
