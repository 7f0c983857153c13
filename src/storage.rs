//! Storage subsystem
//!
//! On-disk layout of captured data and the filesystem checks it relies on.
//!
//! Components:
//! - `file_storage`: the time-partitioned file layout and range pruning.
//! - `fs_check`: helpers ensuring directories and files exist and are usable.

pub mod file_storage;
pub mod fs_check;

pub use file_storage::{FileStorage, DATA_FILE_EXTENSION, ROTATION_INTERVAL_MS};
