//! Persistence and delivery infrastructure: checkpoint serialization, the
//! SQLite-backed stores, the structured event log, the dead-letter queue,
//! and the read-through query cache.

pub mod cache;
pub mod checkpoint;
pub mod dlq;
pub mod error;
pub mod event_log;
pub mod store;

pub use cache::{KeyValueBackend, MemoryBackend, QueryCache};
pub use checkpoint::{Checkpoint, CheckpointKind, CheckpointManager};
pub use dlq::{DeadLetterQueue, FailedEvent};
pub use error::{IoError, Result};
pub use event_log::EventLog;
pub use store::{RunnerStateRow, SimulationStore, StoreHandle};
