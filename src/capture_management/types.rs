//! Core types used by the capture management subsystem.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::data_capture::CaptureOutcome;
use crate::device::DeviceIdentity;

/// Registry entry of one started capture loop.
#[derive(Debug)]
pub struct RunningCapture {
    pub identity: DeviceIdentity,
    /// Baud rate the loop was started with; it never changes afterwards.
    pub baud_rate: u32,
    cancel: CancellationToken,
    handle: JoinHandle<CaptureOutcome>,
}

impl RunningCapture {
    pub fn new(
        identity: DeviceIdentity,
        baud_rate: u32,
        cancel: CancellationToken,
        handle: JoinHandle<CaptureOutcome>,
    ) -> Self {
        Self {
            identity,
            baud_rate,
            cancel,
            handle,
        }
    }

    /// The loop has terminated, whatever the reason.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Requests the loop to stop without keeping track of it.
    pub fn cancel(self) {
        self.cancel.cancel();
    }

    /// Requests the loop to stop. Does not wait; the returned handle resolves
    /// once the loop has released the device and its data file.
    pub fn stop(self) -> JoinHandle<CaptureOutcome> {
        self.cancel.cancel();
        self.handle
    }
}

/// What one reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Terminated loops removed from the registry.
    pub collected: Vec<DeviceIdentity>,
    pub stopped: Vec<DeviceIdentity>,
    /// Stopped and started again at a new baud rate.
    pub restarted: Vec<DeviceIdentity>,
    pub started: Vec<DeviceIdentity>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.collected.is_empty() && self.stopped.is_empty() && self.restarted.is_empty() && self.started.is_empty()
    }
}
