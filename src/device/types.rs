//! Identity and discovery types for physically attached devices.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Serial number reported by ports that do not expose a real one.
const UNKNOWN_SERIAL: &str = "Unknown";

/// Stable, filesystem-safe key of a device, derived from its hardware serial
/// number. Used for config entries, storage paths and the capture registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Replaces every non-alphanumeric character with `_`.
    ///
    /// Returns `None` for serial numbers that cannot act as an identity:
    /// empty ones and the `Unknown` placeholder.
    pub fn sanitize(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if cleaned.is_empty() || cleaned == UNKNOWN_SERIAL {
            return None;
        }
        Some(DeviceIdentity(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceIdentity {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        DeviceIdentity::sanitize(&raw).ok_or_else(|| format!("unusable device identity {:?}", raw))
    }
}

impl From<DeviceIdentity> for String {
    fn from(identity: DeviceIdentity) -> Self {
        identity.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A currently present device as reported by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub identity: DeviceIdentity,
    pub vendor_id: u16,
    pub product_id: u16,
    pub descriptive_name: String,
    /// OS path used to open the device, e.g. `/dev/ttyUSB0`.
    pub system_path: String,
    pub port_location: Option<String>,
    pub baud_rate: u32,
}
