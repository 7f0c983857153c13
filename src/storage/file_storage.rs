//! Time-partitioned data file layout.
//!
//! ```text
//! <base_dir>/data
//!  └── yyyy_MM_dd
//!      └── <device identity>
//!           ├── yyyy_MM_dd_HHmmss.txt
//!           └── yyyy_MM_dd_HHmmss.txt
//! ```
//!
//! All names are fixed-width and zero-padded UTC timestamps, so comparing
//! names as strings orders them chronologically. Range pruning relies on
//! that and never parses a timestamp back out of a name.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::device::DeviceIdentity;
use crate::error_handling::types::StorageError;

use super::fs_check::ensure_directory_usable;

/// Name of the directory under the base directory holding all data files.
pub const DATA_DIR: &str = "data";
/// Extension of data files written by the line codec.
pub const DATA_FILE_EXTENSION: &str = "txt";
/// A file nominally covers one interval. Its content may run up to one more
/// interval past that, since rotation is only checked on the next write.
pub const ROTATION_INTERVAL_MS: i64 = 10 * 60 * 1000;

/// Last millisecond of 9999-12-31 UTC. Past it `%Y` stops being four
/// digits wide and names no longer sort chronologically.
const MAX_NAMED_MS: i64 = 253_402_300_799_999;

const DIR_DATE_FORMAT: &str = "%Y_%m_%d";
const FILE_PREFIX_DATE_FORMAT: &str = "%Y_%m_%d_%H%M%S";

/// Maps (device, time) to data file paths under one base directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            data_dir: base_dir.as_ref().join(DATA_DIR),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of a new data file for `identity` created at `created_ms`.
    ///
    /// Ensures the `(day, device)` directory exists and is usable; the file
    /// itself is left for the caller to open.
    pub fn new_data_file(&self, created_ms: i64, identity: &DeviceIdentity) -> Result<PathBuf, StorageError> {
        let created = to_utc(created_ms)?;
        let dir = self
            .data_dir
            .join(created.format(DIR_DATE_FORMAT).to_string())
            .join(identity.as_str());
        ensure_directory_usable(&dir)?;
        let name = format!("{}.{}", created.format(FILE_PREFIX_DATE_FORMAT), DATA_FILE_EXTENSION);
        Ok(dir.join(name))
    }

    /// Data files of `identity` that may hold records in `[start_ms, end_ms)`,
    /// ordered by day and then by file name.
    ///
    /// Over-selects on purpose: callers filter records by their own
    /// timestamps. Bounds are clamped to the years file names can express,
    /// so open-ended ranges like `[0, i64::MAX)` work. Missing day or device
    /// directories are simply skipped.
    pub fn find_data_files(&self, identity: &DeviceIdentity, start_ms: i64, end_ms: i64) -> Vec<PathBuf> {
        let start = start_ms.clamp(0, MAX_NAMED_MS);
        let end = end_ms.clamp(0, MAX_NAMED_MS);
        let lower_anchor = start.div_euclid(ROTATION_INTERVAL_MS) * ROTATION_INTERVAL_MS;
        let upper_anchor = (end.div_euclid(ROTATION_INTERVAL_MS) * ROTATION_INTERVAL_MS)
            .saturating_add(ROTATION_INTERVAL_MS - 1)
            .min(MAX_NAMED_MS);
        let (Ok(lower), Ok(upper)) = (to_utc(lower_anchor), to_utc(upper_anchor)) else {
            warn!("Ignoring out of range query [{}, {})", start_ms, end_ms);
            return Vec::new();
        };
        let lower_day = lower.format(DIR_DATE_FORMAT).to_string();
        let upper_day = upper.format(DIR_DATE_FORMAT).to_string();
        let lower_prefix = lower.format(FILE_PREFIX_DATE_FORMAT).to_string();
        let upper_prefix = upper.format(FILE_PREFIX_DATE_FORMAT).to_string();

        let mut result = Vec::new();
        for day_dir in sorted_entries(&self.data_dir, |p| p.is_dir()) {
            let Some(day) = file_name(&day_dir) else { continue };
            if day.as_str() < lower_day.as_str() || day.as_str() > upper_day.as_str() {
                continue;
            }
            let device_dir = day_dir.join(identity.as_str());
            if !device_dir.is_dir() {
                continue;
            }
            let files = sorted_entries(&device_dir, |p| {
                p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(DATA_FILE_EXTENSION)
            });
            for file in files {
                let Some(name) = file_name(&file) else { continue };
                let prefix = name.split('.').next().unwrap_or_default();
                if prefix >= lower_prefix.as_str() && prefix <= upper_prefix.as_str() {
                    result.push(file);
                }
            }
        }
        debug!(
            "Found {} candidate file(s) for {} in [{}, {}]",
            result.len(),
            identity,
            lower_prefix,
            upper_prefix
        );
        result
    }
}

fn to_utc(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms).ok_or(StorageError::InvalidTimestamp(ms))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_owned)
}

fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if dir.exists() {
                warn!("Failed to list {}: {}", dir.display(), e);
            }
            return Vec::new();
        }
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| keep(p))
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    paths
}
