use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::capture_management::types::{ReconcileReport, RunningCapture};
use crate::configuration::types::{CaptureDescriptor, Connections};
use crate::data_capture::capture_loop::{CaptureLoop, DEFAULT_POLL_INTERVAL, DEFAULT_READ_BUFFER_SIZE};
use crate::data_capture::CaptureOutcome;
use crate::device::{DeviceIdentity, DeviceProvider};
use crate::storage::FileStorage;

/// Keeps the set of running capture loops consistent with the desired
/// configuration and with the devices currently attached.
///
/// The registry is only mutated by [`reconcile`](Self::reconcile) and the
/// stop helpers. Capture loops never touch it: a loop that ends just leaves
/// a finished handle behind, which the next pass collects. That pass also
/// restarts the loop if its device is still (or again) desired and present,
/// so reconciliation doubles as the retry policy.
///
/// Starting loops spawns blocking tasks, so the supervisor must be used
/// from within a tokio runtime.
pub struct CaptureSupervisor {
    devices: Arc<dyn DeviceProvider>,
    storage: FileStorage,
    poll_interval: Duration,
    read_buffer_size: usize,
    registry: RwLock<HashMap<DeviceIdentity, RunningCapture>>,
}

impl CaptureSupervisor {
    pub fn new(devices: Arc<dyn DeviceProvider>, storage: FileStorage) -> Self {
        Self {
            devices,
            storage,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            registry: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size;
        self
    }

    /// Whether a capture loop for `identity` is registered and still running.
    pub fn is_capturing(&self, identity: &DeviceIdentity) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .is_some_and(|running| !running.is_finished())
    }

    /// Identities and baud rates of the registered loops, sorted by identity.
    pub fn running(&self) -> Vec<(DeviceIdentity, u32)> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        let mut running: Vec<_> = registry
            .values()
            .map(|r| (r.identity.clone(), r.baud_rate))
            .collect();
        running.sort();
        running
    }

    /// One reconciliation pass against `desired`.
    ///
    /// 1. Drops registry entries whose loop has terminated.
    /// 2. Stops loops whose device is no longer desired or has capture
    ///    turned off, and restarts those whose baud rate changed.
    /// 3. Starts loops for attached, desired and enabled devices that have
    ///    none.
    ///
    /// A restart does not wait for the old loop to release the device; if
    /// the new one cannot open it yet, it terminates and a later pass
    /// retries.
    pub fn reconcile(&self, desired: &Connections) -> ReconcileReport {
        let available = self.devices.list_available();
        let mut report = ReconcileReport::default();
        let mut registry = self.registry_mut();

        registry.retain(|identity, running| {
            let finished = running.is_finished();
            if finished {
                debug!("[{}] capture loop has terminated, removing it", identity);
                report.collected.push(identity.clone());
            }
            !finished
        });

        let mut registered: Vec<DeviceIdentity> = registry.keys().cloned().collect();
        registered.sort();
        for identity in registered {
            let Some(running) = registry.remove(&identity) else { continue };
            match enabled(desired, &identity) {
                None => {
                    info!("[{}] capture no longer desired, stopping", identity);
                    running.cancel();
                    report.stopped.push(identity);
                }
                Some(descriptor) if descriptor.baud_rate != running.baud_rate => {
                    info!(
                        "[{}] baud rate changed from {} to {}, restarting capture",
                        identity, running.baud_rate, descriptor.baud_rate
                    );
                    running.cancel();
                    let restarted = self.start(identity.clone(), descriptor.baud_rate);
                    registry.insert(identity.clone(), restarted);
                    report.restarted.push(identity);
                }
                Some(_) => {
                    registry.insert(identity, running);
                }
            }
        }

        for device in available {
            if registry.contains_key(&device.identity) {
                continue;
            }
            let Some(descriptor) = enabled(desired, &device.identity) else {
                continue;
            };
            info!(
                "[{}] starting capture on {} at {} baud",
                device.identity, device.system_path, descriptor.baud_rate
            );
            let running = self.start(device.identity.clone(), descriptor.baud_rate);
            registry.insert(device.identity.clone(), running);
            report.started.push(device.identity);
        }

        if !report.is_empty() {
            debug!("Reconciliation pass: {:?}", report);
        }
        report
    }

    /// Requests every loop to stop and empties the registry. The returned
    /// handles resolve once each loop has cleaned up.
    pub fn stop_all(&self) -> Vec<tokio::task::JoinHandle<CaptureOutcome>> {
        let mut registry = self.registry_mut();
        if !registry.is_empty() {
            info!("Stopping {} capture loop(s)", registry.len());
        }
        registry.drain().map(|(_, running)| running.stop()).collect()
    }

    /// Stops every loop and waits for all of them to finish.
    pub async fn shutdown(&self) {
        for handle in self.stop_all() {
            match handle.await {
                Ok(outcome) => debug!("Capture loop ended: {:?}", outcome),
                Err(e) => warn!("Capture loop task failed: {}", e),
            }
        }
    }

    fn start(&self, identity: DeviceIdentity, baud_rate: u32) -> RunningCapture {
        let cancel = CancellationToken::new();
        let handle = CaptureLoop::new(identity.clone(), baud_rate, Arc::clone(&self.devices), self.storage.clone())
            .with_poll_interval(self.poll_interval)
            .with_read_buffer_size(self.read_buffer_size)
            .spawn(cancel.clone());
        RunningCapture::new(identity, baud_rate, cancel, handle)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, HashMap<DeviceIdentity, RunningCapture>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn enabled<'a>(desired: &'a Connections, identity: &DeviceIdentity) -> Option<&'a CaptureDescriptor> {
    desired.get(identity).filter(|d| d.data_capture_on)
}
