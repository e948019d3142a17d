//! Append-only JSONL event log plus the load/validate half of the replay
//! substrate.
//!
//! Writes are synchronous: each record is serialized, written with a
//! trailing newline, and flushed before the caller proceeds. Events are
//! never rewritten.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use aeonisk_domain::events::EventRecord;
use aeonisk_domain::SessionId;

/// Error type for event log operations.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("Failed to write event: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Malformed log line {line}: {message}")]
    MalformedLine { line: usize, message: String },

    #[error("Log validation failed: {0}")]
    Validation(String),
}

enum Sink {
    File(BufWriter<File>),
    Memory(Vec<u8>),
}

/// The append-only event stream for one session.
pub struct EventLog {
    sink: Sink,
    path: Option<PathBuf>,
    events_written: u64,
}

impl EventLog {
    /// Open `session_<uuid>.jsonl` in the output directory.
    pub fn create_in(dir: &Path, session_id: SessionId) -> Result<Self, EventLogError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("session_{session_id}.jsonl"));
        let file = File::options().create_new(true).append(true).open(&path)?;
        Ok(Self {
            sink: Sink::File(BufWriter::new(file)),
            path: Some(path),
            events_written: 0,
        })
    }

    /// In-memory log for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Vec::new()),
            path: None,
            events_written: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Append one record and flush.
    pub fn append(&mut self, record: &EventRecord) -> Result<(), EventLogError> {
        let line = serde_json::to_string(record)?;
        match &mut self.sink {
            Sink::File(writer) => {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
                writer.flush()?;
            }
            Sink::Memory(buffer) => {
                buffer.extend_from_slice(line.as_bytes());
                buffer.push(b'\n');
            }
        }
        self.events_written += 1;
        debug!(event_type = record.event.event_type(), "event appended");
        Ok(())
    }

    /// Raw bytes of an in-memory log.
    pub fn memory_contents(&self) -> Option<&[u8]> {
        match &self.sink {
            Sink::Memory(buffer) => Some(buffer),
            Sink::File(_) => None,
        }
    }
}

/// Load every record from a log file.
pub fn load_events(path: &Path) -> Result<Vec<EventRecord>, EventLogError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    parse_lines(reader.lines().collect::<Result<Vec<_>, _>>()?)
}

/// Parse records from raw JSONL lines.
pub fn parse_lines(lines: Vec<String>) -> Result<Vec<EventRecord>, EventLogError> {
    let mut events = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: EventRecord =
            serde_json::from_str(line).map_err(|e| EventLogError::MalformedLine {
                line: index + 1,
                message: e.to_string(),
            })?;
        events.push(record);
    }
    Ok(events)
}

/// Per-event-type counts for a loaded log.
pub fn histogram(events: &[EventRecord]) -> BTreeMap<&'static str, u64> {
    let mut counts = BTreeMap::new();
    for record in events {
        *counts.entry(record.event.event_type()).or_insert(0) += 1;
    }
    counts
}

/// Validate a loaded log: the mandatory lifecycle records must be present.
pub fn validate(events: &[EventRecord]) -> Result<BTreeMap<&'static str, u64>, EventLogError> {
    let counts = histogram(events);
    for mandatory in ["session_start", "scenario", "session_end"] {
        if !counts.contains_key(mandatory) {
            return Err(EventLogError::Validation(format!(
                "missing mandatory '{mandatory}' event"
            )));
        }
    }
    Ok(counts)
}

/// Re-serialize loaded events; used by the round-trip law tests.
pub fn reserialize(events: &[EventRecord]) -> Result<String, EventLogError> {
    let mut out = String::new();
    for record in events {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeonisk_domain::events::SessionEvent;
    use chrono::{TimeZone, Utc};

    fn record(round: u32, event: SessionEvent) -> EventRecord {
        EventRecord::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap(),
            SessionId::from_uuid(uuid::Uuid::nil()),
            round,
            event,
        )
    }

    fn start_event() -> SessionEvent {
        SessionEvent::SessionStart {
            session_name: "test".to_string(),
            seed: 42,
            players: vec!["Nyx".to_string()],
            free_targeting_mode: false,
        }
    }

    #[test]
    fn append_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let session_id = SessionId::new();
        let mut log = EventLog::create_in(dir.path(), session_id).unwrap();
        let rec = EventRecord::new(Utc::now(), session_id, 0, start_event());
        log.append(&rec).unwrap();
        let path = log.path().unwrap().to_path_buf();
        drop(log);

        let events = load_events(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.event_type(), "session_start");
    }

    #[test]
    fn reserialize_is_byte_identical() {
        let mut log = EventLog::in_memory();
        log.append(&record(0, start_event())).unwrap();
        log.append(&record(
            1,
            SessionEvent::RoundSynthesis {
                text: "Quiet round.".to_string(),
            },
        ))
        .unwrap();
        let raw = String::from_utf8(log.memory_contents().unwrap().to_vec()).unwrap();
        let events = parse_lines(raw.lines().map(String::from).collect()).unwrap();
        assert_eq!(reserialize(&events).unwrap(), raw);
    }

    #[test]
    fn validation_requires_lifecycle_events() {
        let events = vec![record(0, start_event())];
        assert!(validate(&events).is_err());

        let full = vec![
            record(0, start_event()),
            record(
                0,
                SessionEvent::Scenario {
                    theme: "heist".to_string(),
                    location: "drowned vault".to_string(),
                    situation: "alarms silent, for now".to_string(),
                    void_level: 2,
                    clocks: Vec::new(),
                },
            ),
            record(
                3,
                SessionEvent::SessionEnd {
                    reason: "all clocks resolved".to_string(),
                    rounds: 3,
                },
            ),
        ];
        let counts = validate(&full).unwrap();
        assert_eq!(counts["session_start"], 1);
        assert_eq!(counts["scenario"], 1);
        assert_eq!(counts["session_end"], 1);
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = parse_lines(vec!["{not json".to_string()]).unwrap_err();
        assert!(matches!(err, EventLogError::MalformedLine { line: 1, .. }));
    }
}
