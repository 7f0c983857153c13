use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceIdentity, DeviceInfo};

/// Desired capture configuration of all known devices, keyed by identity.
pub type Connections = BTreeMap<DeviceIdentity, CaptureDescriptor>;

/// Persisted settings of one known device.
///
/// Hardware fields describe where the device was seen last and are
/// refreshed from discovery; `baud_rate`, `data_capture_on` and `name` are
/// user settings. `port_location` and `connected` only describe the live
/// state and are never trusted when loaded from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureDescriptor {
    pub serial_number: DeviceIdentity,
    #[serde(rename = "vendorID", default)]
    pub vendor_id: u16,
    #[serde(rename = "productID", default)]
    pub product_id: u16,

    #[serde(default)]
    pub descriptive_port_name: String,
    #[serde(default)]
    pub system_port_path: String,
    #[serde(default)]
    pub port_location: Option<String>,
    #[serde(default)]
    pub connected: bool,

    pub baud_rate: u32,
    #[serde(default)]
    pub data_capture_on: bool,
    #[serde(default)]
    pub name: String,
}

impl CaptureDescriptor {
    /// Entry for a device seen for the first time: capture stays off until a
    /// user turns it on.
    pub fn discovered(device: &DeviceInfo, name: &str) -> Self {
        let mut descriptor = Self {
            serial_number: device.identity.clone(),
            vendor_id: device.vendor_id,
            product_id: device.product_id,
            descriptive_port_name: String::new(),
            system_port_path: String::new(),
            port_location: None,
            connected: false,
            baud_rate: device.baud_rate,
            data_capture_on: false,
            name: name.to_string(),
        };
        descriptor.refresh_live(device);
        descriptor
    }

    /// Copies where and how the device is currently attached.
    pub fn refresh_live(&mut self, device: &DeviceInfo) {
        self.descriptive_port_name = device.descriptive_name.clone();
        self.system_port_path = device.system_path.clone();
        self.port_location = device.port_location.clone();
        self.connected = true;
    }

    pub fn clear_live(&mut self) {
        self.port_location = None;
        self.connected = false;
    }
}
