//! In-memory device provider for tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error_handling::types::DeviceError;

use super::provider::{DevicePort, DeviceProvider};
use super::types::{DeviceIdentity, DeviceInfo};

#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    Idle,
    Fail,
}

pub fn device(serial: &str) -> DeviceInfo {
    DeviceInfo {
        identity: DeviceIdentity::sanitize(serial).unwrap(),
        vendor_id: 0x2341,
        product_id: 0x0043,
        descriptive_name: format!("Test board {}", serial),
        system_path: format!("/dev/test/{}", serial),
        port_location: Some(format!("usb-1-{}", serial)),
        baud_rate: 9600,
    }
}

#[derive(Default)]
pub struct ScriptedDevices {
    present: Mutex<Vec<DeviceInfo>>,
    scripts: Mutex<HashMap<DeviceIdentity, VecDeque<Step>>>,
    refuse_open: Mutex<HashSet<DeviceIdentity>>,
    opened: Mutex<Vec<(DeviceIdentity, u32)>>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plug(&self, info: DeviceInfo) {
        let mut present = self.present.lock().unwrap();
        present.retain(|d| d.identity != info.identity);
        present.push(info);
    }

    pub fn unplug(&self, serial: &str) {
        self.present.lock().unwrap().retain(|d| d.identity.as_str() != serial);
    }

    /// Steps returned by the next opened port of `serial`; once drained the
    /// port idles until cancelled.
    pub fn script(&self, serial: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(DeviceIdentity::sanitize(serial).unwrap(), steps.into());
    }

    pub fn refuse_open(&self, serial: &str) {
        self.refuse_open
            .lock()
            .unwrap()
            .insert(DeviceIdentity::sanitize(serial).unwrap());
    }

    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(id, baud)| (id.to_string(), *baud))
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl DeviceProvider for ScriptedDevices {
    fn list_available(&self) -> Vec<DeviceInfo> {
        self.present.lock().unwrap().clone()
    }

    fn open(&self, device: &DeviceInfo, baud_rate: u32) -> Result<Box<dyn DevicePort>, DeviceError> {
        if self.refuse_open.lock().unwrap().contains(&device.identity) {
            return Err(DeviceError::OpenFailed(device.identity.to_string(), "refused".into()));
        }
        self.opened
            .lock()
            .unwrap()
            .push((device.identity.clone(), baud_rate));
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .remove(&device.identity)
            .unwrap_or_default();
        Ok(Box::new(ScriptedPort {
            identity: device.identity.to_string(),
            steps,
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct ScriptedPort {
    identity: String,
    steps: VecDeque<Step>,
    closes: Arc<AtomicUsize>,
}

impl DevicePort for ScriptedPort {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match self.steps.pop_front() {
            Some(Step::Data(bytes)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(Step::Idle) | None => Ok(0),
            Some(Step::Fail) => Err(DeviceError::ReadFailed(self.identity.clone(), "unplugged".into())),
        }
    }

    // always fails; cleanup must still release the writer
    fn close(&mut self) -> Result<(), DeviceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Err(DeviceError::CloseFailed(self.identity.clone(), "already gone".into()))
    }
}
