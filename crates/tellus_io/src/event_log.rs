//! Structured simulation event log with dual sinks.
//!
//! The file sink writes line-delimited JSON under a dedicated mutex; the
//! store sink is fire-and-forget from the hot path. Store failures are
//! logged by the storage worker, never surfaced here.

use crate::error::Result;
use crate::store::StoreHandle;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tellus_data::{SimEvent, Verbosity};
use tracing::warn;

pub struct EventLog {
    file: Option<Mutex<BufWriter<File>>>,
    store: Option<StoreHandle>,
    verbosity: Verbosity,
}

impl EventLog {
    pub fn new_at(
        dir: impl AsRef<Path>,
        verbosity: Verbosity,
        store: Option<StoreHandle>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("world_simulation.log"))?;
        Ok(Self {
            file: Some(Mutex::new(BufWriter::new(file))),
            store,
            verbosity,
        })
    }

    /// A log with no sinks; used by tests and by worlds that do not keep
    /// event history.
    pub fn new_dummy() -> Self {
        Self {
            file: None,
            store: None,
            verbosity: Verbosity::Trace,
        }
    }

    pub fn should_log(&self, level: Verbosity) -> bool {
        level >= self.verbosity
    }

    /// Writes the event to both sinks, gated by the event type's
    /// verbosity. File write errors are warned and swallowed; they must
    /// not disturb the tick.
    pub fn log_event(&self, event: &SimEvent) {
        if !self.should_log(event.event_type.level()) {
            return;
        }
        if let Some(file) = &self.file {
            match serde_json::to_string(event) {
                Ok(json) => {
                    if let Ok(mut writer) = file.lock() {
                        if writeln!(writer, "{json}").and_then(|()| writer.flush()).is_err() {
                            warn!(event = event.event_type.as_str(), "event log write failed");
                        }
                    }
                }
                Err(e) => warn!("event serialization failed: {e}"),
            }
        }
        if let Some(store) = &self.store {
            store.record_event(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use tellus_data::EventType;
    use uuid::Uuid;

    fn event(event_type: EventType) -> SimEvent {
        SimEvent::new(
            Uuid::new_v4(),
            42,
            event_type,
            0.5,
            serde_json::json!({"note": "test"}),
        )
    }

    #[test]
    fn test_line_delimited_file_sink() {
        let dir = "logs_test_event_log";
        let _ = std::fs::remove_dir_all(dir);
        let log = EventLog::new_at(dir, Verbosity::Trace, None).unwrap();
        log.log_event(&event(EventType::Speciation));
        log.log_event(&event(EventType::Extinction));

        let file = File::open(format!("{dir}/world_simulation.log")).unwrap();
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .map_while(std::result::Result::ok)
            .collect();
        assert_eq!(lines.len(), 2);
        let parsed: SimEvent = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed.event_type, EventType::Speciation);
        assert_eq!(parsed.year, 42);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_verbosity_gates_writes() {
        let dir = "logs_test_event_log_verbosity";
        let _ = std::fs::remove_dir_all(dir);
        let log = EventLog::new_at(dir, Verbosity::Warn, None).unwrap();
        // year_tick logs at trace, mass_extinction at warn.
        log.log_event(&event(EventType::YearTick));
        log.log_event(&event(EventType::MassExtinction));

        let file = File::open(format!("{dir}/world_simulation.log")).unwrap();
        let count = BufReader::new(file).lines().count();
        assert_eq!(count, 1);
        assert!(log.should_log(Verbosity::Error));
        assert!(!log.should_log(Verbosity::Info));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_dummy_log_is_silent() {
        let log = EventLog::new_dummy();
        log.log_event(&event(EventType::Climate));
        assert!(log.should_log(Verbosity::Trace));
    }
}
