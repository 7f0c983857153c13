use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    JsonError(String),
    TomlError(String),
    DirectoryUnusable(String),
    InvalidSetting(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::JsonError(e) => write!(f, "JSON parsing error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryUnusable(e) => write!(f, "Directory error: {}", e),
            ConfigError::InvalidSetting(e) => write!(f, "Invalid setting: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlError(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::JsonError(err.to_string())
    }
}

/// Failures of the time-partitioned store. Fatal to the operation that hit
/// them, never to the process.
#[derive(Debug)]
pub enum StorageError {
    CreateFailed(PathBuf, std::io::Error),
    NotADirectory(PathBuf),
    Unusable(PathBuf, &'static str),
    WriteFailed(PathBuf, std::io::Error),
    ReadFailed(PathBuf, std::io::Error),
    InvalidTimestamp(i64),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateFailed(p, e) => {
                write!(f, "Failed to create {}: {}", p.display(), e)
            }
            StorageError::NotADirectory(p) => write!(f, "Path is not a directory: {}", p.display()),
            StorageError::Unusable(p, why) => write!(f, "Directory {} {}", p.display(), why),
            StorageError::WriteFailed(p, e) => write!(f, "Storage write failed {}: {}", p.display(), e),
            StorageError::ReadFailed(p, e) => write!(f, "Storage read failed {}: {}", p.display(), e),
            StorageError::InvalidTimestamp(ms) => write!(f, "Timestamp out of range: {}", ms),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum DeviceError {
    NotFound(String),
    OpenFailed(String, String),
    ReadFailed(String, String),
    CloseFailed(String, String),
    EnumerationFailed(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound(id) => write!(f, "Device {} not found among available ports", id),
            DeviceError::OpenFailed(id, e) => write!(f, "Failed to open device {}: {}", id, e),
            DeviceError::ReadFailed(id, e) => write!(f, "Failed to read from device {}: {}", id, e),
            DeviceError::CloseFailed(id, e) => write!(f, "Failed to close device {}: {}", id, e),
            DeviceError::EnumerationFailed(e) => write!(f, "Device enumeration failed: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {}

#[derive(Debug)]
pub enum CaptureError {
    Device(DeviceError),
    Storage(StorageError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Device(e) => write!(f, "Capture device error: {}", e),
            CaptureError::Storage(e) => write!(f, "Capture storage error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<DeviceError> for CaptureError {
    fn from(err: DeviceError) -> Self {
        CaptureError::Device(err)
    }
}

impl From<StorageError> for CaptureError {
    fn from(err: StorageError) -> Self {
        CaptureError::Storage(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}
