//! Dead-letter queue: a bounded ring of failed or panicked events kept
//! for retry and inspection.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;

const MAX_RETRIES: u32 = 3;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FailedEvent {
    pub id: Uuid,
    pub world_id: Uuid,
    pub year: i64,
    pub event_type: String,
    pub error: String,
    pub stack: Option<String>,
    pub retry_count: u32,
    pub recoverable: bool,
    pub timestamp: String,
}

struct DlqInner {
    events: VecDeque<FailedEvent>,
    file: Option<BufWriter<File>>,
}

pub struct DeadLetterQueue {
    max_size: usize,
    inner: Mutex<DlqInner>,
}

impl DeadLetterQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            inner: Mutex::new(DlqInner {
                events: VecDeque::new(),
                file: None,
            }),
        }
    }

    /// Attaches a `dlq.log` file sink under `dir`; failures that reach
    /// the queue are mirrored there as line-delimited JSON.
    pub fn with_file_sink(max_size: usize, dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("dlq.log"))?;
        let queue = Self::new(max_size);
        queue
            .inner
            .lock()
            .expect("dlq lock poisoned")
            .file = Some(BufWriter::new(file));
        Ok(queue)
    }

    /// Records a recoverable failure.
    pub fn log_failure(&self, world_id: Uuid, year: i64, event_type: &str, err: &str) -> Uuid {
        warn!(year, event_type, error = err, "event dead-lettered");
        self.push(FailedEvent {
            id: Uuid::new_v4(),
            world_id,
            year,
            event_type: event_type.to_string(),
            error: err.to_string(),
            stack: None,
            retry_count: 0,
            recoverable: true,
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    /// Records a recovered panic. Panics are always written to the file
    /// sink with their stack and are never recoverable.
    pub fn log_panic(
        &self,
        world_id: Uuid,
        year: i64,
        event_type: &str,
        panic_msg: &str,
        stack: String,
    ) -> Uuid {
        error!(year, event_type, panic = panic_msg, "panic dead-lettered");
        self.push(FailedEvent {
            id: Uuid::new_v4(),
            world_id,
            year,
            event_type: event_type.to_string(),
            error: panic_msg.to_string(),
            stack: Some(stack),
            retry_count: 0,
            recoverable: false,
            timestamp: Utc::now().to_rfc3339(),
        })
    }

    fn push(&self, event: FailedEvent) -> Uuid {
        let id = event.id;
        let mut inner = self.inner.lock().expect("dlq lock poisoned");
        if let Some(file) = &mut inner.file {
            if let Ok(json) = serde_json::to_string(&event) {
                let _ = writeln!(file, "{json}");
                let _ = file.flush();
            }
        }
        inner.events.push_back(event);
        // Keep only the most recent max_size entries.
        while inner.events.len() > self.max_size {
            inner.events.pop_front();
        }
        id
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("dlq lock poisoned").events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most-recent-first listing.
    pub fn list_recent(&self) -> Vec<FailedEvent> {
        let inner = self.inner.lock().expect("dlq lock poisoned");
        inner.events.iter().rev().cloned().collect()
    }

    /// Non-panic failures for `world_id` that still have retries left.
    pub fn get_recoverable(&self, world_id: Uuid) -> Vec<FailedEvent> {
        let inner = self.inner.lock().expect("dlq lock poisoned");
        inner
            .events
            .iter()
            .filter(|e| e.world_id == world_id && e.recoverable && e.retry_count < MAX_RETRIES)
            .cloned()
            .collect()
    }

    /// Bumps an event's retry counter. Returns false when the id is gone.
    pub fn mark_retried(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().expect("dlq lock poisoned");
        match inner.events.iter_mut().find(|e| e.id == id) {
            Some(event) => {
                event.retry_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn remove_event(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock().expect("dlq lock poisoned");
        let before = inner.events.len();
        inner.events.retain(|e| e.id != id);
        inner.events.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_ring_keeps_most_recent() {
        let dlq = DeadLetterQueue::new(5);
        let world = Uuid::new_v4();
        for year in 0..10 {
            dlq.log_failure(world, year, "tectonic", "store timeout");
        }
        assert_eq!(dlq.len(), 5);
        let years: Vec<i64> = dlq.list_recent().iter().map(|e| e.year).collect();
        assert_eq!(years, vec![9, 8, 7, 6, 5]);
    }

    #[test]
    fn test_recoverable_excludes_panics_and_exhausted_retries() {
        let dlq = DeadLetterQueue::new(10);
        let world = Uuid::new_v4();
        let failure = dlq.log_failure(world, 1, "climate", "store busy");
        dlq.log_panic(world, 2, "tick", "index out of bounds", "stack...".to_string());

        let recoverable = dlq.get_recoverable(world);
        assert_eq!(recoverable.len(), 1);
        assert_eq!(recoverable[0].id, failure);

        for _ in 0..MAX_RETRIES {
            assert!(dlq.mark_retried(failure));
        }
        assert!(dlq.get_recoverable(world).is_empty());
    }

    #[test]
    fn test_recoverable_scoped_to_world() {
        let dlq = DeadLetterQueue::new(10);
        let world_a = Uuid::new_v4();
        let world_b = Uuid::new_v4();
        dlq.log_failure(world_a, 1, "migration", "boom");
        assert_eq!(dlq.get_recoverable(world_a).len(), 1);
        assert!(dlq.get_recoverable(world_b).is_empty());
    }

    #[test]
    fn test_remove_event() {
        let dlq = DeadLetterQueue::new(10);
        let world = Uuid::new_v4();
        let id = dlq.log_failure(world, 1, "speciation", "oops");
        assert!(dlq.remove_event(id));
        assert!(!dlq.remove_event(id));
        assert!(dlq.is_empty());
    }

    #[test]
    fn test_panics_hit_file_sink() {
        let dir = "logs_test_dlq";
        let _ = std::fs::remove_dir_all(dir);
        let dlq = DeadLetterQueue::with_file_sink(5, dir).unwrap();
        dlq.log_panic(
            Uuid::new_v4(),
            7,
            "tick",
            "attempt to divide by zero",
            "thread 'sim' panicked at ...".to_string(),
        );
        let content = std::fs::read_to_string(format!("{dir}/dlq.log")).unwrap();
        let parsed: FailedEvent = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert!(!parsed.recoverable);
        assert!(parsed.stack.is_some());
        let _ = std::fs::remove_dir_all(dir);
    }
}
