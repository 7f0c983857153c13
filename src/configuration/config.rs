use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use log::info;
use serde::Deserialize;

use crate::data_capture::capture_loop::{DEFAULT_POLL_INTERVAL, DEFAULT_READ_BUFFER_SIZE};
use crate::error_handling::types::ConfigError;
use crate::storage::fs_check::ensure_directory_usable;
use crate::storage::FileStorage;

pub const SETTINGS_FILE: &str = "settings.toml";
pub const DEFAULT_LOG_FILE: &str = "application.log";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 2;

/// Runtime settings given on the command line.
///
/// Every optional value may also come from `<base_dir>/settings.toml`;
/// command-line (and environment) values win over the file, and built-in
/// defaults fill whatever neither provides.
///
/// # Examples
///
/// ```text
/// sercap run /var/lib/sercap --sync-interval-secs 5 --log-to-file
/// SERCAP_BASE_DIR=/var/lib/sercap sercap run
/// ```
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Directory holding the connection config, settings file and captured data
    ///
    /// Created if it does not exist yet.
    #[arg(env = "SERCAP_BASE_DIR")]
    pub base_dir: PathBuf,

    /// Seconds between two periodic reconciliation passes
    ///
    /// Passes also run on every configuration change; the periodic one picks
    /// up devices being plugged in or out.
    #[arg(long, env = "SERCAP_SYNC_INTERVAL_SECS")]
    pub sync_interval_secs: Option<u64>,

    /// Milliseconds a capture loop sleeps when its device has no data
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Size in bytes of each capture loop's read buffer
    #[arg(long)]
    pub read_buffer_size: Option<usize>,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Also write logs to `<base_dir>/application.log`
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub log_to_file: bool,
}

/// Optional content of `settings.toml`.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    sync_interval_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
    read_buffer_size: Option<usize>,
    log_file: Option<PathBuf>,
}

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub sync_interval: Duration,
    pub poll_interval: Duration,
    pub read_buffer_size: usize,
    pub log_file: Option<PathBuf>,
}

impl Settings {
    /// Defaults for `base_dir`, without reading any file.
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            log_file: None,
        }
    }

    /// Merges the command line with `settings.toml`, making sure the base
    /// directory is usable first.
    pub fn resolve(args: &SettingsArgs) -> Result<Self, ConfigError> {
        ensure_directory_usable(&args.base_dir).map_err(|e| ConfigError::DirectoryUnusable(e.to_string()))?;

        let file_path = args.base_dir.join(SETTINGS_FILE);
        let file = if file_path.is_file() {
            info!("Reading settings from {}", file_path.display());
            toml::from_str::<SettingsFile>(&fs::read_to_string(&file_path)?)?
        } else {
            SettingsFile::default()
        };

        let mut settings = Settings::new(&args.base_dir);
        if let Some(secs) = args.sync_interval_secs.or(file.sync_interval_secs) {
            if secs == 0 {
                return Err(ConfigError::InvalidSetting(
                    "sync_interval_secs must be at least 1".to_string(),
                ));
            }
            settings.sync_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = args.poll_interval_ms.or(file.poll_interval_ms) {
            settings.poll_interval = Duration::from_millis(ms);
        }
        if let Some(size) = args.read_buffer_size.or(file.read_buffer_size) {
            if size == 0 {
                return Err(ConfigError::InvalidSetting(
                    "read_buffer_size must be at least 1".to_string(),
                ));
            }
            settings.read_buffer_size = size;
        }
        settings.log_file = args.log_file.clone().or(file.log_file).or_else(|| {
            args.log_to_file
                .then(|| args.base_dir.join(DEFAULT_LOG_FILE))
        });
        Ok(settings)
    }

    pub fn storage(&self) -> FileStorage {
        FileStorage::new(&self.base_dir)
    }
}
