//! Decoded record types of the line codec.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// One named numeric value of a structured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub value: f64,
}

/// Structured payload emitted by an instrumented device program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub program_id: String,
    pub program_version: String,
    pub device_config: String,
    /// Device-relative time since its previous line, as reported by the device.
    pub time_delta: i64,
    pub log_message: String,
    pub readings: Vec<Reading>,
}

/// Either a structured event or the raw text of a line that could not be
/// decoded (or failed its length check).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordPayload {
    Event(Event),
    RawText(String),
}

/// One line of captured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Receipt time in epoch milliseconds, assigned when the line arrived.
    pub epoch_ms: i64,
    pub payload: RecordPayload,
}

impl Record {
    pub fn event(epoch_ms: i64, event: Event) -> Self {
        Self {
            epoch_ms,
            payload: RecordPayload::Event(event),
        }
    }

    pub fn raw(epoch_ms: i64, text: impl Into<String>) -> Self {
        Self {
            epoch_ms,
            payload: RecordPayload::RawText(text.into()),
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match &self.payload {
            RecordPayload::Event(e) => Some(e),
            RecordPayload::RawText(_) => None,
        }
    }

    pub fn raw_text(&self) -> Option<&str> {
        match &self.payload {
            RecordPayload::RawText(t) => Some(t),
            RecordPayload::Event(_) => None,
        }
    }

    /// Encodes the record as one data file line, without the terminator.
    ///
    /// Events end with the length check: the number of characters strictly
    /// between the first and the last comma of the line.
    pub fn to_line(&self) -> String {
        match &self.payload {
            RecordPayload::RawText(text) => format!("{},{}", self.epoch_ms, text),
            RecordPayload::Event(e) => {
                let mut body = format!(
                    "{},{},{},{},{}",
                    e.program_id, e.program_version, e.device_config, e.time_delta, e.log_message
                );
                for r in &e.readings {
                    let _ = write!(body, ",{}:{}", r.id, r.value);
                }
                format!("{},{},{}", self.epoch_ms, body, body.chars().count())
            }
        }
    }
}
