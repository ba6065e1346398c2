// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use serde::Serialize;
use tracing::info;

/// Error types for event export.
#[derive(Debug, thiserror::Error)]
pub enum EventExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One timed bus operation against the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEvent {
    /// Absolute native sample index at which the event fires. Not a delta.
    pub sample_time: u32,
    /// The register being written.
    pub address: u8,
    /// The register payload.
    pub data: u8,
    /// False for the address-bus phase, true for the data-bus phase.
    pub is_data_phase: bool,
}

impl RegisterEvent {
    /// A logical register write, as produced by the first compiler pass.
    pub fn write(sample_time: u32, address: u8, data: u8) -> RegisterEvent {
        RegisterEvent {
            sample_time,
            address,
            data,
            is_data_phase: false,
        }
    }
}

impl fmt::Display for RegisterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@{} {} 0x{:02X}=0x{:02X}",
            self.sample_time,
            if self.is_data_phase { "data" } else { "addr" },
            self.address,
            self.data
        )
    }
}

/// An ordered list of register events. Insertion order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStream {
    events: Vec<RegisterEvent>,
}

impl EventStream {
    /// Creates an empty stream.
    pub fn new() -> EventStream {
        EventStream { events: Vec::new() }
    }

    /// Creates an empty stream with room for the given number of events.
    pub fn with_capacity(capacity: usize) -> EventStream {
        EventStream {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Appends an event to the end of the stream.
    pub fn push(&mut self, event: RegisterEvent) {
        self.events.push(event);
    }

    /// Appends a logical register write.
    pub fn push_write(&mut self, sample_time: u32, address: u8, data: u8) {
        self.push(RegisterEvent::write(sample_time, address, data));
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&RegisterEvent> {
        self.events.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisterEvent> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[RegisterEvent] {
        &self.events
    }

    /// The time of the latest event in the stream, if any.
    pub fn last_sample_time(&self) -> Option<u32> {
        self.events.iter().map(|event| event.sample_time).max()
    }

    /// Returns true if sample times never decrease across the stream.
    pub fn is_time_ordered(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].sample_time <= pair[1].sample_time)
    }

    /// Stable sort by sample time. Events sharing a time keep their relative order.
    pub(crate) fn sort_by_time(&mut self) {
        self.events.sort_by_key(|event| event.sample_time);
    }

    /// Renders the stream in the diagnostic JSON format.
    pub fn to_json(&self) -> Result<String, EventExportError> {
        Ok(serde_json::to_string_pretty(&EventDocument::from(self))?)
    }

    /// Writes the stream as JSON to the given path.
    pub fn write_json(&self, path: &Path) -> Result<(), EventExportError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &EventDocument::from(self))?;
        writeln!(writer)?;
        writer.flush()?;

        info!(
            path = path.display().to_string(),
            events = self.len(),
            "Saved events."
        );
        Ok(())
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = &'a RegisterEvent;
    type IntoIter = std::slice::Iter<'a, RegisterEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl FromIterator<RegisterEvent> for EventStream {
    fn from_iter<T: IntoIterator<Item = RegisterEvent>>(iter: T) -> Self {
        EventStream {
            events: iter.into_iter().collect(),
        }
    }
}

/// The JSON representation of an event stream.
#[derive(Serialize)]
struct EventDocument {
    event_count: usize,
    events: Vec<EventRecord>,
}

/// The JSON representation of a single event. Address and data are rendered
/// as two-digit upper-case hex strings.
#[derive(Serialize)]
struct EventRecord {
    time: u32,
    addr: String,
    data: String,
    is_data: u8,
}

impl From<&EventStream> for EventDocument {
    fn from(stream: &EventStream) -> Self {
        EventDocument {
            event_count: stream.len(),
            events: stream
                .iter()
                .map(|event| EventRecord {
                    time: event.sample_time,
                    addr: format!("0x{:02X}", event.address),
                    data: format!("0x{:02X}", event.data),
                    is_data: u8::from(event.is_data_phase),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_ordering() {
        let mut stream = EventStream::new();
        stream.push_write(0, 0x08, 0x00);
        stream.push_write(0, 0x20, 0xC7);
        stream.push_write(10, 0x28, 0x4A);
        assert!(stream.is_time_ordered());
        assert_eq!(stream.last_sample_time(), Some(10));

        stream.push_write(5, 0x08, 0x78);
        assert!(!stream.is_time_ordered());
        assert_eq!(stream.last_sample_time(), Some(10));

        stream.sort_by_time();
        assert!(stream.is_time_ordered());
        assert_eq!(stream.get(2).unwrap().address, 0x08);
        assert_eq!(stream.get(3).unwrap().address, 0x28);
    }

    #[test]
    fn test_empty_stream() {
        let stream = EventStream::new();
        assert!(stream.is_empty());
        assert!(stream.is_time_ordered());
        assert_eq!(stream.last_sample_time(), None);
    }

    #[test]
    fn test_json_format() {
        let stream: EventStream = vec![
            RegisterEvent::write(0, 0x28, 0x4A),
            RegisterEvent {
                sample_time: 2,
                address: 0x08,
                data: 0x7F,
                is_data_phase: true,
            },
        ]
        .into_iter()
        .collect();

        let json: serde_json::Value = serde_json::from_str(&stream.to_json().unwrap()).unwrap();
        assert_eq!(json["event_count"], 2);
        assert_eq!(json["events"][0]["time"], 0);
        assert_eq!(json["events"][0]["addr"], "0x28");
        assert_eq!(json["events"][0]["data"], "0x4A");
        assert_eq!(json["events"][0]["is_data"], 0);
        assert_eq!(json["events"][1]["time"], 2);
        assert_eq!(json["events"][1]["addr"], "0x08");
        assert_eq!(json["events"][1]["data"], "0x7F");
        assert_eq!(json["events"][1]["is_data"], 1);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let mut stream = EventStream::new();
        stream.push_write(27965, 0x08, 0x00);
        stream.write_json(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"event_count\": 1"));
        assert!(contents.contains("\"time\": 27965"));
        assert!(contents.contains("\"addr\": \"0x08\""));
    }
}
