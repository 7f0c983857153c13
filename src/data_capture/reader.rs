//! Read side of the line codec: decodes data file lines back into records
//! and scans a device's files for a time range.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::device::DeviceIdentity;
use crate::storage::FileStorage;

use super::types::{Event, Reading, Record};

/// Minimum number of comma separated fields of a structured event line:
/// epoch, program id, program version, device config, time delta, log
/// message and the length check.
const MIN_EVENT_FIELDS: usize = 7;

/// Decodes one data file line (without its terminator).
///
/// Returns `None` when the line has no comma or its leading receipt
/// timestamp is unreadable. A line whose remainder is not a well formed
/// event, or whose length check does not match, comes back as raw text.
/// Integer fields are parsed as written, without trimming.
pub fn parse_line(line: &str) -> Option<Record> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let (epoch, rest) = line.split_once(',')?;
    let epoch_ms: i64 = epoch.parse().ok()?;
    Some(match parse_event(line) {
        Some(event) => Record::event(epoch_ms, event),
        None => Record::raw(epoch_ms, rest),
    })
}

fn parse_event(line: &str) -> Option<Event> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < MIN_EVENT_FIELDS {
        return None;
    }
    let last = parts.len() - 1;

    let length_check: usize = parts[last].parse().ok()?;
    let body_start = line.find(',')? + 1;
    let body_end = line.rfind(',')?;
    if line[body_start..body_end].chars().count() != length_check {
        return None;
    }

    let time_delta = match parts[4] {
        "" => 0,
        delta => delta.parse().ok()?,
    };
    let readings = parts[6..last]
        .iter()
        .map(|part| {
            let (id, value) = part.split_once(':')?;
            Some(Reading {
                id: id.to_string(),
                value: value.trim().parse().ok()?,
            })
        })
        .collect::<Option<Vec<_>>>()?;

    Some(Event {
        program_id: parts[1].to_string(),
        program_version: parts[2].to_string(),
        device_config: parts[3].to_string(),
        time_delta,
        log_message: parts[5].to_string(),
        readings,
    })
}

/// Reads back records of one base directory.
#[derive(Debug, Clone)]
pub struct RecordReader {
    storage: FileStorage,
}

impl RecordReader {
    pub fn new(storage: FileStorage) -> Self {
        Self { storage }
    }

    /// Candidate files of `identity` for `[start_ms, end_ms)`.
    pub fn find_files(&self, identity: &DeviceIdentity, start_ms: i64, end_ms: i64) -> Vec<PathBuf> {
        self.storage.find_data_files(identity, start_ms, end_ms)
    }

    /// Visits every record of `identity` received in `[start_ms, end_ms)`,
    /// in file order, until `visit` breaks.
    ///
    /// Unreadable files are logged and skipped, as are lines without a
    /// readable receipt timestamp. An unterminated last line is visited like
    /// any other: it is what a loop that stopped mid-line left behind.
    pub fn scan<F>(&self, identity: &DeviceIdentity, start_ms: i64, end_ms: i64, mut visit: F)
    where
        F: FnMut(Record) -> ControlFlow<()>,
    {
        if start_ms >= end_ms {
            return;
        }
        let files = self.find_files(identity, start_ms, end_ms);
        let mut visited = 0usize;
        for file in &files {
            let flow = scan_file(file, |record| {
                if record.epoch_ms < start_ms || record.epoch_ms >= end_ms {
                    return ControlFlow::Continue(());
                }
                visited += 1;
                visit(record)
            });
            if flow.is_break() {
                debug!("Scan of {} stopped early in {}", identity, file.display());
                break;
            }
        }
        debug!(
            "Scanned {} file(s) of {} for [{}, {}): {} record(s)",
            files.len(),
            identity,
            start_ms,
            end_ms,
            visited
        );
    }

    /// All records of `identity` received in `[start_ms, end_ms)`.
    pub fn read_events(&self, identity: &DeviceIdentity, start_ms: i64, end_ms: i64) -> Vec<Record> {
        let mut records = Vec::new();
        self.scan(identity, start_ms, end_ms, |record| {
            records.push(record);
            ControlFlow::Continue(())
        });
        records
    }
}

fn scan_file<F>(path: &Path, mut visit: F) -> ControlFlow<()>
where
    F: FnMut(Record) -> ControlFlow<()>,
{
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            info!("Skipping unreadable data file {}: {}", path.display(), e);
            return ControlFlow::Continue(());
        }
    };
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    let mut skipped = 0usize;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Stopped reading {}: {}", path.display(), e);
                break;
            }
        }
        let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
        match parse_line(&decode(line)) {
            Some(record) => visit(record)?,
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("Skipped {} line(s) without timestamp in {}", skipped, path.display());
    }
    ControlFlow::Continue(())
}

/// Decodes a line, dropping byte sequences that are not valid UTF-8.
fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.utf8_chunks().map(|chunk| chunk.valid()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::writer::RecordWriter;
    use crate::storage::ROTATION_INTERVAL_MS;
    use std::fs;
    use tempfile::TempDir;

    const T0: i64 = 1_702_228_305_000;

    fn id(s: &str) -> DeviceIdentity {
        DeviceIdentity::sanitize(s).unwrap()
    }

    fn sample_event() -> Event {
        Event {
            program_id: "thermo".into(),
            program_version: "1.2".into(),
            device_config: "cfgA".into(),
            time_delta: 250,
            log_message: "sample".into(),
            readings: vec![
                Reading { id: "t".into(), value: 21.5 },
                Reading { id: "h".into(), value: 40.0 },
            ],
        }
    }

    #[test]
    fn encoded_event_decodes_to_the_same_record() {
        let record = Record::event(T0, sample_event());
        let line = record.to_line();
        assert_eq!(line, format!("{},thermo,1.2,cfgA,250,sample,t:21.5,h:40,38", T0));
        assert_eq!(parse_line(&line), Some(record));
    }

    #[test]
    fn varied_events_decode_to_the_same_record() {
        let events = vec![
            Event {
                program_id: "p".into(),
                program_version: "2".into(),
                device_config: "c".into(),
                time_delta: -1500,
                log_message: "late".into(),
                readings: vec![Reading { id: "v".into(), value: -3.25 }],
            },
            Event {
                program_id: "p".into(),
                program_version: "2".into(),
                device_config: "c".into(),
                time_delta: 0,
                log_message: String::new(),
                readings: vec![
                    Reading { id: "big".into(), value: 1.5e300 },
                    Reading { id: "tiny".into(), value: -2.5e-12 },
                ],
            },
            Event {
                program_id: "p".into(),
                program_version: "2".into(),
                device_config: "c".into(),
                time_delta: 42,
                log_message: "boot".into(),
                readings: Vec::new(),
            },
        ];
        for event in events {
            let record = Record::event(T0, event);
            let line = record.to_line();
            assert_eq!(parse_line(&line), Some(record), "line {:?}", line);
        }
    }

    #[test]
    fn event_without_readings_and_empty_delta() {
        let parsed = parse_line("1000,p,1,c,,hello,12").unwrap();
        let event = parsed.as_event().unwrap();
        assert_eq!(event.time_delta, 0);
        assert_eq!(event.log_message, "hello");
        assert!(event.readings.is_empty());
    }

    #[test]
    fn wrong_length_check_yields_raw_text() {
        let parsed = parse_line("1000,p,1,c,0,hello,99").unwrap();
        assert_eq!(parsed.epoch_ms, 1000);
        assert_eq!(parsed.raw_text(), Some("p,1,c,0,hello,99"));
    }

    #[test]
    fn short_or_malformed_lines_yield_raw_text() {
        assert_eq!(parse_line("1000,hello world").unwrap().raw_text(), Some("hello world"));
        assert_eq!(parse_line("1000,p,1,c,x,msg,11").unwrap().raw_text(), Some("p,1,c,x,msg,11"));
        assert_eq!(
            parse_line("1000,p,1,c,0,msg,bad,15").unwrap().raw_text(),
            Some("p,1,c,0,msg,bad,15")
        );
        assert_eq!(parse_line("1000,").unwrap().raw_text(), Some(""));
    }

    #[test]
    fn unreadable_timestamp_is_skipped() {
        assert_eq!(parse_line("garbage,p,1,c,0,msg,9"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("1000"), None);
        assert_eq!(parse_line(" 1000,hello"), None);
    }

    #[test]
    fn padded_integer_fields_yield_raw_text() {
        assert_eq!(parse_line("1000,p,1,c, 5,hi,11").unwrap().raw_text(), Some("p,1,c, 5,hi,11"));
        assert_eq!(parse_line("1000,p,1,c,5,hi, 9").unwrap().raw_text(), Some("p,1,c,5,hi, 9"));
    }

    #[test]
    fn carriage_return_is_ignored() {
        let parsed = parse_line("1000,p,1,c,0,hi,10\r").unwrap();
        assert_eq!(parsed.as_event().unwrap().log_message, "hi");
    }

    #[test]
    fn scan_filters_by_half_open_range() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let mut writer = RecordWriter::new(storage.clone(), id("DEV1"));
        writer.write_at(b"a\n", 999).unwrap();
        writer.write_at(b"b\n", 1000).unwrap();
        writer.write_at(b"c\n", 2000).unwrap();
        writer.close().unwrap();

        let reader = RecordReader::new(storage);
        let records = reader.read_events(&id("DEV1"), 1000, 2000);
        assert_eq!(records, vec![Record::raw(1000, "b")]);
        assert!(reader.read_events(&id("DEV1"), 2000, 1000).is_empty());
        assert!(reader.read_events(&id("DEV2"), 0, 3000).is_empty());
    }

    #[test]
    fn open_ended_ranges_return_stored_records() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let mut writer = RecordWriter::new(storage.clone(), id("DEV1"));
        writer.write_at(b"kept\n", T0).unwrap();
        writer.close().unwrap();

        let reader = RecordReader::new(storage);
        let expected = vec![Record::raw(T0, "kept")];
        assert_eq!(reader.read_events(&id("DEV1"), 0, i64::MAX), expected);
        assert_eq!(reader.read_events(&id("DEV1"), i64::MIN, i64::MAX), expected);
        assert_eq!(reader.read_events(&id("DEV1"), 0, 300_000_000_000_000), expected);
    }

    #[test]
    fn scan_excludes_the_end_bound() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let path = storage.new_data_file(1000, &id("DEV1")).unwrap();
        fs::write(&path, "1000,p,1,cfg,0,hello:0,17\n2000,p,1,cfg,0,world:0,17\n").unwrap();

        let records = RecordReader::new(storage).read_events(&id("DEV1"), 1000, 2000);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].epoch_ms, 1000);
        assert_eq!(records[0].as_event().unwrap().log_message, "hello:0");
    }

    #[test]
    fn scan_stops_when_visitor_breaks() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let mut writer = RecordWriter::new(storage.clone(), id("DEV1"));
        writer.write_at(b"one\ntwo\n", T0).unwrap();
        writer.write_at(b"three\n", T0 + 2 * ROTATION_INTERVAL_MS).unwrap();
        writer.close().unwrap();

        let reader = RecordReader::new(storage);
        let mut seen = Vec::new();
        reader.scan(&id("DEV1"), T0, T0 + 3 * ROTATION_INTERVAL_MS, |record| {
            seen.push(record.raw_text().unwrap_or_default().to_string());
            if seen.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[test]
    fn scan_skips_corrupt_lines_and_keeps_unterminated_tail() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let path = storage.new_data_file(T0, &id("DEV1")).unwrap();
        let mut content = Vec::new();
        content.extend_from_slice(format!("{},first\n", T0).as_bytes());
        content.extend_from_slice(b"not-a-number,junk\n");
        content.extend_from_slice(format!("{},bad", T0 + 1).as_bytes());
        content.extend_from_slice(&[0xff, 0xfe]);
        content.extend_from_slice(b" bytes\n");
        content.extend_from_slice(format!("{},partial", T0 + 2).as_bytes());
        fs::write(&path, &content).unwrap();

        let reader = RecordReader::new(storage);
        assert_eq!(
            reader.read_events(&id("DEV1"), T0, T0 + 10),
            vec![
                Record::raw(T0, "first"),
                Record::raw(T0 + 1, "bad bytes"),
                Record::raw(T0 + 2, "partial"),
            ]
        );
    }

    #[test]
    fn fragment_left_by_a_closed_writer_is_readable() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path());
        let mut writer = RecordWriter::new(storage.clone(), id("DEV1"));
        writer.write_at(b"first\nsecond-cut-by-unplug", T0).unwrap();
        writer.close().unwrap();

        let records = RecordReader::new(storage).read_events(&id("DEV1"), T0, T0 + 1);
        assert_eq!(
            records,
            vec![Record::raw(T0, "first"), Record::raw(T0, "second-cut-by-unplug")]
        );
    }
}
