//! SQLite persistence behind a background command thread.
//!
//! A single worker owns the connection; producers enqueue fire-and-forget
//! writes and reply-channel reads over mpsc. Database latency never blocks
//! the simulation tick.

use crate::checkpoint::{Checkpoint, CheckpointKind};
use anyhow::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use tellus_data::SimEvent;
use tracing::{error, warn};
use uuid::Uuid;

/// Lightweight runner lifecycle row, one per world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerStateRow {
    pub world_id: Uuid,
    pub current_year: i64,
    pub speed: i64,
    pub state: String,
    pub updated_at: String,
}

/// Commands for the background storage thread.
pub enum StoreCommand {
    /// Upserts the lifecycle row for a world.
    SaveRunnerState {
        world_id: Uuid,
        current_year: i64,
        speed: i64,
        state: String,
    },
    /// Overwrites the single serialized world blob for a world.
    SaveWorldSnapshot { world_id: Uuid, data: Vec<u8> },
    /// Inserts or replaces a checkpoint at (world, year).
    SaveCheckpoint(Checkpoint),
    /// Appends a simulation event record.
    RecordEvent(SimEvent),
    QueryRunnerState(Uuid, Sender<Option<RunnerStateRow>>),
    QueryWorldSnapshot(Uuid, Sender<Option<Vec<u8>>>),
    /// Nearest checkpoint with year <= the given year.
    QueryCheckpointAtOrBefore(Uuid, i64, Sender<Option<Checkpoint>>),
    QueryRecentEvents(Uuid, usize, Sender<Vec<SimEvent>>),
    Stop,
}

/// Cloneable producer handle to the storage thread. The sender sits
/// behind a mutex so handles can be shared freely across threads.
pub struct StoreHandle {
    sender: Mutex<Sender<StoreCommand>>,
}

impl Clone for StoreHandle {
    fn clone(&self) -> Self {
        Self {
            sender: Mutex::new(self.sender.lock().expect("store handle poisoned").clone()),
        }
    }
}

impl StoreHandle {
    fn send(&self, cmd: StoreCommand) -> bool {
        self.sender
            .lock()
            .expect("store handle poisoned")
            .send(cmd)
            .is_ok()
    }

    pub fn save_runner_state(&self, world_id: Uuid, current_year: i64, speed: i64, state: String) {
        self.send(StoreCommand::SaveRunnerState {
            world_id,
            current_year,
            speed,
            state,
        });
    }

    pub fn save_world_snapshot(&self, world_id: Uuid, data: Vec<u8>) {
        self.send(StoreCommand::SaveWorldSnapshot { world_id, data });
    }

    pub fn save_checkpoint(&self, checkpoint: Checkpoint) {
        self.send(StoreCommand::SaveCheckpoint(checkpoint));
    }

    /// Fire-and-forget event append; never blocks the caller.
    pub fn record_event(&self, event: SimEvent) {
        self.send(StoreCommand::RecordEvent(event));
    }

    pub fn query_runner_state(&self, world_id: Uuid) -> Option<Receiver<Option<RunnerStateRow>>> {
        let (tx, rx) = mpsc::channel();
        self.send(StoreCommand::QueryRunnerState(world_id, tx))
            .then_some(rx)
    }

    pub fn query_world_snapshot(&self, world_id: Uuid) -> Option<Receiver<Option<Vec<u8>>>> {
        let (tx, rx) = mpsc::channel();
        self.send(StoreCommand::QueryWorldSnapshot(world_id, tx))
            .then_some(rx)
    }

    pub fn query_checkpoint_at_or_before(
        &self,
        world_id: Uuid,
        year: i64,
    ) -> Option<Receiver<Option<Checkpoint>>> {
        let (tx, rx) = mpsc::channel();
        self.send(StoreCommand::QueryCheckpointAtOrBefore(world_id, year, tx))
            .then_some(rx)
    }

    pub fn query_recent_events(
        &self,
        world_id: Uuid,
        limit: usize,
    ) -> Option<Receiver<Vec<SimEvent>>> {
        let (tx, rx) = mpsc::channel();
        self.send(StoreCommand::QueryRecentEvents(world_id, limit, tx))
            .then_some(rx)
    }
}

/// Owner of the background SQLite worker.
pub struct SimulationStore {
    sender: Sender<StoreCommand>,
}

impl SimulationStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let path = path.as_ref().to_owned();

        thread::spawn(move || {
            let mut conn = match Connection::open(&path) {
                Ok(c) => c,
                Err(e) => {
                    error!("failed to open database: {e}");
                    return;
                }
            };
            if let Err(e) = init_db(&mut conn) {
                error!("failed to initialize database: {e}");
                return;
            }
            let _ = conn.execute("PRAGMA journal_mode=WAL", []);
            let _ = conn.execute("PRAGMA synchronous = NORMAL", []);

            while let Ok(cmd) = rx.recv() {
                match cmd {
                    StoreCommand::SaveRunnerState {
                        world_id,
                        current_year,
                        speed,
                        state,
                    } => {
                        let result = conn.execute(
                            "INSERT INTO world_runner_state (world_id, current_year, speed, state, updated_at)
                              VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
                              ON CONFLICT(world_id) DO UPDATE SET
                                 current_year = excluded.current_year,
                                 speed = excluded.speed,
                                 state = excluded.state,
                                 updated_at = excluded.updated_at",
                            params![world_id, current_year, speed, state],
                        );
                        if let Err(e) = result {
                            warn!("runner state save failed: {e}");
                        }
                    }
                    StoreCommand::SaveWorldSnapshot { world_id, data } => {
                        let result = conn.execute(
                            "INSERT INTO world_simulation_snapshot (world_id, data, updated_at)
                              VALUES (?1, ?2, CURRENT_TIMESTAMP)
                              ON CONFLICT(world_id) DO UPDATE SET
                                 data = excluded.data,
                                 updated_at = excluded.updated_at",
                            params![world_id, data],
                        );
                        if let Err(e) = result {
                            warn!("world snapshot save failed: {e}");
                        }
                    }
                    StoreCommand::SaveCheckpoint(cp) => {
                        let result = conn.execute(
                            "INSERT OR REPLACE INTO world_checkpoints
                              (id, world_id, year, kind, state_data, species_count, population_sum, created_at)
                              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                            params![
                                cp.id,
                                cp.world_id,
                                cp.year,
                                kind_tag(cp.kind),
                                cp.payload,
                                cp.species_count,
                                cp.population_sum as i64,
                                cp.created_at
                            ],
                        );
                        if let Err(e) = result {
                            warn!("checkpoint save failed: {e}");
                        }
                    }
                    StoreCommand::RecordEvent(ev) => {
                        let details = ev.details.to_string();
                        let result = conn.execute(
                            "INSERT INTO simulation_events (id, world_id, year, event_type, severity, details, created_at)
                              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            params![
                                ev.id,
                                ev.world_id,
                                ev.year,
                                ev.event_type.as_str(),
                                f64::from(ev.severity),
                                details,
                                ev.timestamp
                            ],
                        );
                        if let Err(e) = result {
                            warn!("event record failed: {e}");
                        }
                    }
                    StoreCommand::QueryRunnerState(world_id, reply_tx) => {
                        let row = conn
                            .query_row(
                                "SELECT world_id, current_year, speed, state, updated_at
                                 FROM world_runner_state WHERE world_id = ?1",
                                params![world_id],
                                |row| {
                                    Ok(RunnerStateRow {
                                        world_id: row.get(0)?,
                                        current_year: row.get(1)?,
                                        speed: row.get(2)?,
                                        state: row.get(3)?,
                                        updated_at: row.get(4)?,
                                    })
                                },
                            )
                            .ok();
                        let _ = reply_tx.send(row);
                    }
                    StoreCommand::QueryWorldSnapshot(world_id, reply_tx) => {
                        let data: Option<Vec<u8>> = conn
                            .query_row(
                                "SELECT data FROM world_simulation_snapshot WHERE world_id = ?1",
                                params![world_id],
                                |row| row.get(0),
                            )
                            .ok();
                        let _ = reply_tx.send(data);
                    }
                    StoreCommand::QueryCheckpointAtOrBefore(world_id, year, reply_tx) => {
                        let cp = conn
                            .query_row(
                                "SELECT id, world_id, year, kind, state_data, species_count, population_sum, created_at
                                 FROM world_checkpoints
                                 WHERE world_id = ?1 AND year <= ?2
                                 ORDER BY year DESC LIMIT 1",
                                params![world_id, year],
                                |row| {
                                    let kind: String = row.get(3)?;
                                    let population_sum: i64 = row.get(6)?;
                                    Ok(Checkpoint {
                                        id: row.get(0)?,
                                        world_id: row.get(1)?,
                                        year: row.get(2)?,
                                        kind: parse_kind(&kind),
                                        payload: row.get(4)?,
                                        species_count: row.get(5)?,
                                        population_sum: population_sum as u64,
                                        created_at: row.get(7)?,
                                    })
                                },
                            )
                            .ok();
                        let _ = reply_tx.send(cp);
                    }
                    StoreCommand::QueryRecentEvents(world_id, limit, reply_tx) => {
                        let mut stmt = match conn.prepare(
                            "SELECT id, world_id, year, event_type, severity, details, created_at
                             FROM simulation_events WHERE world_id = ?1
                             ORDER BY year DESC, created_at DESC LIMIT ?2",
                        ) {
                            Ok(s) => s,
                            Err(_) => continue,
                        };
                        let rows = stmt.query_map(params![world_id, limit as i64], |row| {
                            let event_type: String = row.get(3)?;
                            let details: String = row.get(5)?;
                            Ok((
                                row.get::<_, Uuid>(0)?,
                                row.get::<_, Uuid>(1)?,
                                row.get::<_, i64>(2)?,
                                event_type,
                                row.get::<_, f64>(4)?,
                                details,
                                row.get::<_, String>(6)?,
                            ))
                        });
                        if let Ok(iter) = rows {
                            let results: Vec<SimEvent> = iter
                                .filter_map(std::result::Result::ok)
                                .filter_map(|(id, world_id, year, ty, sev, details, ts)| {
                                    let event_type =
                                        serde_json::from_value(serde_json::json!(ty)).ok()?;
                                    Some(SimEvent {
                                        id,
                                        world_id,
                                        year,
                                        event_type,
                                        severity: sev as f32,
                                        details: serde_json::from_str(&details)
                                            .unwrap_or(serde_json::Value::Null),
                                        timestamp: ts,
                                    })
                                })
                                .collect();
                            let _ = reply_tx.send(results);
                        }
                    }
                    StoreCommand::Stop => break,
                }
            }
        });

        Ok(Self { sender: tx })
    }

    pub fn handle(&self) -> StoreHandle {
        StoreHandle {
            sender: Mutex::new(self.sender.clone()),
        }
    }

    pub fn stop(&self) {
        let _ = self.sender.send(StoreCommand::Stop);
    }
}

fn kind_tag(kind: CheckpointKind) -> &'static str {
    match kind {
        CheckpointKind::Full => "full",
        CheckpointKind::Delta => "delta",
    }
}

fn parse_kind(tag: &str) -> CheckpointKind {
    match tag {
        "full" => CheckpointKind::Full,
        _ => CheckpointKind::Delta,
    }
}

fn init_db(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS world_simulation_snapshot (
            world_id TEXT PRIMARY KEY,
            data BLOB NOT NULL,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS world_runner_state (
            world_id TEXT PRIMARY KEY,
            current_year INTEGER NOT NULL,
            speed INTEGER NOT NULL,
            state TEXT NOT NULL,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS world_checkpoints (
            id TEXT PRIMARY KEY,
            world_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            kind TEXT NOT NULL,
            state_data BLOB NOT NULL,
            species_count INTEGER NOT NULL,
            population_sum INTEGER NOT NULL,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(world_id, year)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS simulation_events (
            id TEXT PRIMARY KEY,
            world_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            severity REAL NOT NULL,
            details TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checkpoints_world_year
         ON world_checkpoints(world_id, year)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_world_year
         ON simulation_events(world_id, year)",
        [],
    )?;

    Ok(())
}
