//! Write side of the line codec: timestamps raw device bytes line by line
//! and appends them to the device's current data file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::Utc;
use log::{debug, info, trace};

use crate::device::DeviceIdentity;
use crate::error_handling::types::StorageError;
use crate::storage::{FileStorage, ROTATION_INTERVAL_MS};

/// Appends timestamped lines for one device.
///
/// Each line is prefixed with the receipt time of the chunk in which its
/// first byte arrived. Files rotate lazily: only a `write` call may switch to
/// a new file and a pending line is finished in the old file first, so a file
/// can hold somewhat more than one rotation interval of data.
pub struct RecordWriter {
    storage: FileStorage,
    identity: DeviceIdentity,
    current_interval_start_ms: i64,
    at_line_start: bool,
    output: Option<(PathBuf, BufWriter<File>)>,
}

impl RecordWriter {
    pub fn new(storage: FileStorage, identity: DeviceIdentity) -> Self {
        Self {
            storage,
            identity,
            current_interval_start_ms: 0,
            at_line_start: true,
            output: None,
        }
    }

    /// Path of the file currently appended to, if any.
    pub fn current_file(&self) -> Option<&PathBuf> {
        self.output.as_ref().map(|(path, _)| path)
    }

    /// Writes `data` stamped with the current wall-clock time.
    pub fn write(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.write_at(data, Utc::now().timestamp_millis())
    }

    /// Writes `data` received at `now_ms`.
    ///
    /// Every line starting in this chunk gets the same timestamp, so lines
    /// that arrived together never look as if produced at different times.
    pub fn write_at(&mut self, data: &[u8], now_ms: i64) -> Result<(), StorageError> {
        let mut rest = data;
        if self.output.is_none() {
            self.rotate(now_ms)?;
        } else if now_ms - self.current_interval_start_ms > ROTATION_INTERVAL_MS {
            if !self.at_line_start {
                // finish the pending line in the current file first
                let Some(end) = rest.iter().position(|&b| b == b'\n') else {
                    return self.append(rest, now_ms);
                };
                self.append(&rest[..=end], now_ms)?;
                rest = &rest[end + 1..];
            }
            self.rotate(now_ms)?;
        }
        self.append(rest, now_ms)
    }

    /// Flushes and releases the current file. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), StorageError> {
        if let Some((path, mut out)) = self.output.take() {
            out.flush().map_err(|e| StorageError::WriteFailed(path.clone(), e))?;
            debug!("[{}] closed {}", self.identity, path.display());
        }
        Ok(())
    }

    fn append(&mut self, data: &[u8], now_ms: i64) -> Result<(), StorageError> {
        let Some((path, out)) = self.output.as_mut() else {
            return Ok(());
        };
        let stamp = format!("{},", now_ms);
        let mut encoded = Vec::with_capacity(data.len() + stamp.len());
        for &byte in data {
            if byte == b'\n' {
                self.at_line_start = true;
            } else if self.at_line_start {
                encoded.extend_from_slice(stamp.as_bytes());
                self.at_line_start = false;
            }
            encoded.push(byte);
        }
        out.write_all(&encoded)
            .and_then(|_| out.flush())
            .map_err(|e| StorageError::WriteFailed(path.clone(), e))?;
        trace!("[{}] appended {} byte(s) to {}", self.identity, encoded.len(), path.display());
        Ok(())
    }

    fn rotate(&mut self, now_ms: i64) -> Result<(), StorageError> {
        self.close()?;
        let path = self.storage.new_data_file(now_ms, &self.identity)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::CreateFailed(path.clone(), e))?;
        self.current_interval_start_ms = now_ms.div_euclid(ROTATION_INTERVAL_MS) * ROTATION_INTERVAL_MS;
        self.at_line_start = true;
        info!("[{}] writing to {}", self.identity, path.display());
        self.output = Some((path, BufWriter::new(file)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const T0: i64 = 1_702_228_305_000; // 2023-12-10T17:11:45Z

    fn writer(dir: &TempDir) -> RecordWriter {
        RecordWriter::new(
            FileStorage::new(dir.path()),
            DeviceIdentity::sanitize("DEV1").unwrap(),
        )
    }

    fn lines_of(path: &PathBuf) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn stamps_every_line_of_a_chunk_with_one_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir);
        w.write_at(b"a,1\nb,2\nc,3\n", T0).unwrap();
        let path = w.current_file().unwrap().clone();
        w.close().unwrap();

        assert_eq!(
            lines_of(&path),
            vec![
                format!("{},a,1", T0),
                format!("{},b,2", T0),
                format!("{},c,3", T0)
            ]
        );
    }

    #[test]
    fn split_chunks_produce_the_same_lines() {
        let input: &[u8] = b"first line\nsecond line\nthird";

        let whole_dir = TempDir::new().unwrap();
        let mut whole = writer(&whole_dir);
        whole.write_at(input, T0).unwrap();
        let whole_path = whole.current_file().unwrap().clone();
        whole.close().unwrap();

        for split in 1..input.len() {
            let dir = TempDir::new().unwrap();
            let mut w = writer(&dir);
            w.write_at(&input[..split], T0).unwrap();
            w.write_at(&input[split..], T0).unwrap();
            let path = w.current_file().unwrap().clone();
            w.close().unwrap();
            assert_eq!(lines_of(&path), lines_of(&whole_path), "split at {}", split);
        }
    }

    #[test]
    fn line_continued_in_a_later_chunk_keeps_its_first_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir);
        w.write_at(b"hel", T0).unwrap();
        w.write_at(b"lo\nworld\n", T0 + 5).unwrap();
        let path = w.current_file().unwrap().clone();
        w.close().unwrap();

        assert_eq!(
            lines_of(&path),
            vec![format!("{},hello", T0), format!("{},world", T0 + 5)]
        );
    }

    #[test]
    fn rotates_only_after_a_full_interval() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir);
        w.write_at(b"one\n", T0).unwrap();
        let first = w.current_file().unwrap().clone();

        let interval_start = T0.div_euclid(ROTATION_INTERVAL_MS) * ROTATION_INTERVAL_MS;
        w.write_at(b"two\n", interval_start + ROTATION_INTERVAL_MS).unwrap();
        assert_eq!(w.current_file().unwrap(), &first);

        w.write_at(b"three\n", interval_start + ROTATION_INTERVAL_MS + 1).unwrap();
        let second = w.current_file().unwrap().clone();
        assert_ne!(second, first);
        w.close().unwrap();

        assert_eq!(lines_of(&first).len(), 2);
        assert_eq!(lines_of(&second).len(), 1);
    }

    #[test]
    fn rotation_waits_for_the_pending_line_to_end() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir);
        w.write_at(b"abc", T0).unwrap();
        let first = w.current_file().unwrap().clone();

        let late = T0 + 2 * ROTATION_INTERVAL_MS;
        w.write_at(b"de", late).unwrap();
        assert_eq!(w.current_file().unwrap(), &first);

        w.write_at(b"f\nghi\n", late + 1).unwrap();
        let second = w.current_file().unwrap().clone();
        assert_ne!(second, first);
        w.close().unwrap();

        assert_eq!(lines_of(&first), vec![format!("{},abcdef", T0)]);
        assert_eq!(lines_of(&second), vec![format!("{},ghi", late + 1)]);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut w = writer(&dir);
        w.close().unwrap();
        w.write_at(b"x\n", T0).unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert!(w.current_file().is_none());
    }

    #[test]
    fn fails_when_storage_is_unusable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data"), b"not a directory").unwrap();
        let mut w = writer(&dir);
        assert!(w.write_at(b"x\n", T0).is_err());
    }
}
