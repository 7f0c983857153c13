//! `serialport`-backed device discovery and I/O.

use std::io::Read;
use std::time::Duration;

use log::{debug, trace, warn};
use serialport::{SerialPort, SerialPortType};

use crate::error_handling::types::DeviceError;

use super::provider::{DevicePort, DeviceProvider};
use super::types::{DeviceIdentity, DeviceInfo};

/// Baud rate reported for live ports; the OS does not expose the current one
/// without opening the port.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// Discovers USB serial devices that report a serial number.
#[derive(Debug, Default, Clone)]
pub struct SerialDeviceProvider;

impl SerialDeviceProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceProvider for SerialDeviceProvider {
    fn list_available(&self) -> Vec<DeviceInfo> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("{}", DeviceError::EnumerationFailed(e.to_string()));
                return Vec::new();
            }
        };

        let mut devices = Vec::new();
        for port in ports {
            let SerialPortType::UsbPort(usb) = port.port_type else {
                trace!("Skipping non-USB port {}", port.port_name);
                continue;
            };
            let Some(identity) = usb.serial_number.as_deref().and_then(DeviceIdentity::sanitize) else {
                debug!("Skipping port {} without a usable serial number", port.port_name);
                continue;
            };
            let descriptive_name = match (usb.manufacturer.as_deref(), usb.product.as_deref()) {
                (Some(m), Some(p)) => format!("{} {}", m, p),
                (None, Some(p)) => p.to_string(),
                (Some(m), None) => m.to_string(),
                (None, None) => port.port_name.clone(),
            };
            devices.push(DeviceInfo {
                identity,
                vendor_id: usb.vid,
                product_id: usb.pid,
                descriptive_name,
                // serialport exposes no physical location for USB ports
                port_location: None,
                system_path: port.port_name,
                baud_rate: DEFAULT_BAUD_RATE,
            });
        }
        devices
    }

    fn open(&self, device: &DeviceInfo, baud_rate: u32) -> Result<Box<dyn DevicePort>, DeviceError> {
        let port = serialport::new(&device.system_path, baud_rate)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|e| DeviceError::OpenFailed(device.identity.to_string(), e.to_string()))?;
        Ok(Box::new(SerialDevicePort {
            identity: device.identity.to_string(),
            port: Some(port),
        }))
    }
}

struct SerialDevicePort {
    identity: String,
    port: Option<Box<dyn SerialPort>>,
}

impl DevicePort for SerialDevicePort {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let Some(port) = self.port.as_mut() else {
            return Err(DeviceError::ReadFailed(self.identity.clone(), "port closed".into()));
        };
        let pending = port
            .bytes_to_read()
            .map_err(|e| DeviceError::ReadFailed(self.identity.clone(), e.to_string()))?;
        if pending == 0 {
            return Ok(0);
        }
        let n = (pending as usize).min(buf.len());
        port.read(&mut buf[..n])
            .map_err(|e| DeviceError::ReadFailed(self.identity.clone(), e.to_string()))
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        // dropping the handle releases the OS descriptor
        if self.port.take().is_some() {
            debug!("Closed serial port of {}", self.identity);
        }
        Ok(())
    }
}
