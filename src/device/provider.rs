//! Device-I/O seams used by the capture loop and the supervisor.

use crate::error_handling::types::DeviceError;

use super::types::DeviceInfo;

/// Lists and opens physically attached devices.
pub trait DeviceProvider: Send + Sync {
    /// Currently present devices. Entries without a usable identity are
    /// already filtered out.
    fn list_available(&self) -> Vec<DeviceInfo>;

    /// Opens `device` configured at `baud_rate`.
    fn open(&self, device: &DeviceInfo, baud_rate: u32) -> Result<Box<dyn DevicePort>, DeviceError>;
}

/// An open connection to one device.
pub trait DevicePort: Send {
    /// Non-blocking read of whatever bytes are available.
    ///
    /// `Ok(0)` means nothing is available right now. An error means the
    /// device failed or went away.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    fn close(&mut self) -> Result<(), DeviceError>;
}
