//! Capture path of one device: the line codec (writer and reader) and the
//! capture loop that feeds the writer from a device port.

pub mod capture_loop;
pub mod reader;
pub mod types;
pub mod writer;

pub use capture_loop::{CaptureLoop, CaptureOutcome};
pub use reader::{parse_line, RecordReader};
pub use types::{Event, Reading, Record, RecordPayload};
pub use writer::RecordWriter;
