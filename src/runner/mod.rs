//! The simulation runner: a cooperative scheduler owning the world's time
//! axis.
//!
//! A wall-clock ticker advances the world by `speed` years per tick under
//! the writer lock; control operations, observers, and the persistence
//! timer synchronize through the same readers-writer lock from their own
//! threads. User handlers are invoked with the lock released and must not
//! call back into mutating runner operations synchronously.

mod tick;

use crate::broadcast::Broadcaster;
use crate::config::SimulationConfig;
use crate::life::{
    BasicDiseaseSim, BasicLifeSim, DiseaseSimulator, LifeSimulator, SapienceDetector,
    ThresholdSapienceDetector,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tellus_core::{
    ClimateDriver, EffectApplicator, GeoEventManager, GeologyEngine, TurningPointManager,
};
use tellus_data::{
    ActiveEffect, GameMessage, Intervention, SimEvent, SimulationState, TurningPoint,
    TurningPointSummary,
};
use tellus_io::checkpoint::{compress, decompress};
use tellus_io::{Checkpoint, CheckpointManager, DeadLetterQueue, EventLog, IoError, StoreHandle};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use tick::TickOutput;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("population simulator not initialized")]
    NotInitialized,
    #[error("runner is in the error state; reconstruct it from a snapshot")]
    Faulted,
    #[error("no turning point is pending")]
    NoPendingTurningPoint,
    #[error("unknown turning point or intervention id")]
    UnknownIntervention,
    #[error("not enough divine energy")]
    InsufficientEnergy,
    #[error(transparent)]
    Serialization(#[from] IoError),
    #[error("no persisted world found")]
    NoPersistedWorld,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    Running,
    Paused,
    Stopping,
    Error,
}

impl RunnerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::Running => "running",
            RunnerState::Paused => "paused",
            RunnerState::Stopping => "stopping",
            RunnerState::Error => "error",
        }
    }

    fn parse(tag: &str) -> RunnerState {
        match tag {
            "running" => RunnerState::Running,
            "paused" => RunnerState::Paused,
            "stopping" => RunnerState::Stopping,
            "error" => RunnerState::Error,
            _ => RunnerState::Idle,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speed {
    Paused,
    Slow,
    Normal,
    Fast,
    Turbo,
}

impl Speed {
    pub fn years_per_tick(&self) -> i64 {
        match self {
            Speed::Paused => 0,
            Speed::Slow => 1,
            Speed::Normal => 10,
            Speed::Fast => 100,
            Speed::Turbo => 1_000,
        }
    }

    pub fn from_years(years: i64) -> Speed {
        match years {
            0 => Speed::Paused,
            1 => Speed::Slow,
            10 => Speed::Normal,
            100 => Speed::Fast,
            _ => Speed::Turbo,
        }
    }
}

/// Lightweight in-memory snapshot record.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorldSnapshot {
    pub year: i64,
    pub species_count: u32,
    pub population_sum: u64,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunnerStats {
    pub state: RunnerState,
    pub speed: Speed,
    pub current_year: i64,
    pub start_year: i64,
    pub total_ticks: u64,
    pub events_emitted: u64,
    pub species_count: usize,
    pub population_sum: u64,
    pub divine_energy: u64,
    pub pending_turning_point: bool,
    pub snapshot_count: usize,
}

pub type TickHandler = Arc<dyn Fn(i64) + Send + Sync>;
pub type SnapshotHandler = Arc<dyn Fn(&WorldSnapshot) + Send + Sync>;
pub type TurningPointHandler = Arc<dyn Fn(&TurningPoint) + Send + Sync>;
pub type EventBroadcastHandler = Arc<dyn Fn(&GameMessage) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    tick: Option<TickHandler>,
    snapshot: Option<SnapshotHandler>,
    turning: Option<TurningPointHandler>,
    broadcast: Option<EventBroadcastHandler>,
}

pub(crate) struct RunnerCore {
    pub(crate) config: SimulationConfig,
    pub(crate) state: RunnerState,
    pub(crate) speed: Speed,
    pub(crate) start_year: i64,
    pub(crate) total_ticks: u64,
    pub(crate) events_emitted: u64,
    pub(crate) sim: SimulationState,
    pub(crate) geology: Arc<Mutex<GeologyEngine>>,
    pub(crate) geo_events: GeoEventManager,
    pub(crate) climate: ClimateDriver,
    pub(crate) turning: TurningPointManager,
    pub(crate) effects: EffectApplicator,
    pub(crate) life: Box<dyn LifeSimulator>,
    pub(crate) disease: Box<dyn DiseaseSimulator>,
    pub(crate) sapience: Box<dyn SapienceDetector>,
    pub(crate) checkpoints: CheckpointManager,
    pub(crate) recent_events: VecDeque<SimEvent>,
    pub(crate) snapshots: VecDeque<WorldSnapshot>,
    pub(crate) last_snapshot_year: i64,
    pub(crate) newly_sapient: Vec<Uuid>,
    pub(crate) was_ice_age: bool,
    pub(crate) paused_for_turning: bool,
}

#[derive(Clone)]
pub struct SimulationRunner {
    core: Arc<RwLock<RunnerCore>>,
    handlers: Arc<RwLock<Handlers>>,
    broadcaster: Arc<Broadcaster>,
    log: Arc<EventLog>,
    dlq: Arc<DeadLetterQueue>,
    store: Option<StoreHandle>,
    stop_flag: Arc<AtomicBool>,
    threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SimulationRunner {
    pub fn new(config: SimulationConfig, store: Option<StoreHandle>) -> Self {
        Self::with_collaborators(
            config,
            store,
            Box::new(BasicLifeSim::new()),
            Box::new(BasicDiseaseSim::new(1)),
            Box::new(ThresholdSapienceDetector::default()),
        )
    }

    pub fn with_collaborators(
        config: SimulationConfig,
        store: Option<StoreHandle>,
        life: Box<dyn LifeSimulator>,
        disease: Box<dyn DiseaseSimulator>,
        sapience: Box<dyn SapienceDetector>,
    ) -> Self {
        let world_id = Uuid::new_v4();
        let log = match EventLog::new_at(&config.log_dir, config.verbosity, store.clone()) {
            Ok(log) => Arc::new(log),
            Err(e) => {
                warn!("event log unavailable, running silent: {e}");
                Arc::new(EventLog::new_dummy())
            }
        };
        let dlq = Arc::new(
            DeadLetterQueue::with_file_sink(config.checkpoint.dlq_max_size, &config.log_dir)
                .unwrap_or_else(|_| DeadLetterQueue::new(config.checkpoint.dlq_max_size)),
        );

        let geology = GeologyEngine::new(config.geology_config(), config.seed);
        let core = RunnerCore {
            state: RunnerState::Idle,
            speed: Speed::Normal,
            start_year: 0,
            total_ticks: 0,
            events_emitted: 0,
            sim: SimulationState::new(world_id),
            geology: Arc::new(Mutex::new(geology)),
            geo_events: GeoEventManager::new(config.seed.wrapping_add(1)),
            climate: ClimateDriver::default(),
            turning: TurningPointManager::new(world_id, config.turning_config()),
            effects: EffectApplicator::new(),
            life,
            disease,
            sapience,
            checkpoints: CheckpointManager::new(config.checkpoint.full_freq, store.clone()),
            recent_events: VecDeque::new(),
            snapshots: VecDeque::new(),
            last_snapshot_year: 0,
            newly_sapient: Vec::new(),
            was_ice_age: false,
            paused_for_turning: false,
            config,
        };

        Self {
            core: Arc::new(RwLock::new(core)),
            handlers: Arc::new(RwLock::new(Handlers::default())),
            broadcaster: Arc::new(Broadcaster::new()),
            log,
            dlq,
            store,
            stop_flag: Arc::new(AtomicBool::new(false)),
            threads: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn read_core(&self) -> RwLockReadGuard<'_, RunnerCore> {
        self.core.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_core(&self) -> RwLockWriteGuard<'_, RunnerCore> {
        self.core.write().unwrap_or_else(|e| e.into_inner())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Seeds the population simulator. Required before `start`.
    pub fn initialize_population_simulator(&self, seed: u64) {
        let mut guard = self.write_core();
        let core = &mut *guard;
        core.life.initialize(seed, &mut core.sim);
    }

    pub fn start(&self, start_year: i64) -> Result<(), RunnerError> {
        {
            let mut core = self.write_core();
            if !core.life.is_initialized() {
                return Err(RunnerError::NotInitialized);
            }
            match core.state {
                // Start while running is idempotent success.
                RunnerState::Running => return Ok(()),
                RunnerState::Error => return Err(RunnerError::Faulted),
                _ => {}
            }
            if core.state == RunnerState::Idle {
                core.sim.year = start_year;
                core.start_year = start_year;
                core.last_snapshot_year = start_year;
            }
            {
                let geology = core.geology.clone();
                let mut engine = geology.lock().unwrap_or_else(|e| e.into_inner());
                if !engine.is_initialized() {
                    engine.initialize();
                }
            }
            core.state = RunnerState::Running;
            info!(start_year, "runner started");
        }
        self.spawn_threads();
        Ok(())
    }

    /// Pause from any state but Running is a silent no-op.
    pub fn pause(&self) {
        let mut core = self.write_core();
        if core.state == RunnerState::Running {
            core.state = RunnerState::Paused;
            info!(year = core.sim.year, "runner paused");
        }
    }

    /// Resume from any state but Paused is a silent no-op.
    pub fn resume(&self) {
        let mut core = self.write_core();
        if core.state == RunnerState::Paused {
            core.state = RunnerState::Running;
            core.paused_for_turning = false;
            info!(year = core.sim.year, "runner resumed");
        }
    }

    /// Signals the loop, joins it, performs a final persist, and returns
    /// the runner to Idle.
    pub fn stop(&self) -> Result<(), RunnerError> {
        let was_error = {
            let mut core = self.write_core();
            match core.state {
                RunnerState::Idle => return Ok(()),
                // A faulted runner stays faulted; only its threads are
                // reaped.
                RunnerState::Error => true,
                _ => {
                    core.state = RunnerState::Stopping;
                    false
                }
            }
        };
        self.stop_flag.store(true, Ordering::SeqCst);
        let handles: Vec<JoinHandle<()>> = {
            let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
            threads.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        self.stop_flag.store(false, Ordering::SeqCst);

        let persist_result = self.persist_state();
        if !was_error {
            let mut core = self.write_core();
            core.state = RunnerState::Idle;
            info!(year = core.sim.year, "runner stopped");
        }
        persist_result
    }

    fn spawn_threads(&self) {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        if !threads.is_empty() {
            return;
        }
        let (tick_interval, persist_interval) = {
            let core = self.read_core();
            (
                Duration::from_millis(core.config.runner.tick_interval_ms),
                Duration::from_secs(core.config.runner.persist_interval_secs),
            )
        };

        let ticker = self.clone();
        threads.push(thread::spawn(move || {
            loop {
                if ticker.stop_flag.load(Ordering::SeqCst) {
                    break;
                }
                thread::sleep(tick_interval);
                let (state, speed) = {
                    let core = ticker.read_core();
                    (core.state, core.speed)
                };
                match state {
                    RunnerState::Error => break,
                    RunnerState::Running if speed != Speed::Paused => {}
                    _ => continue,
                }
                if ticker.tick_once(speed).is_err() {
                    // Panic recovered; the runner is now in Error.
                    break;
                }
            }
        }));

        let persister = self.clone();
        threads.push(thread::spawn(move || loop {
            let mut waited = Duration::ZERO;
            // Sleep in small slices so stop() joins promptly.
            while waited < persist_interval {
                if persister.stop_flag.load(Ordering::SeqCst) {
                    return;
                }
                let slice = Duration::from_millis(200).min(persist_interval - waited);
                thread::sleep(slice);
                waited += slice;
            }
            if let Err(e) = persister.persist_state() {
                warn!("periodic persist failed: {e}");
            }
        }));
    }

    /// One scheduler tick: advance by `speed` years under the writer
    /// lock, recover panics into the DLQ, then dispatch handlers and
    /// broadcasts with the lock released.
    fn tick_once(&self, speed: Speed) -> Result<TickOutput, RunnerError> {
        let outcome = {
            let mut core = self.write_core();
            let log = Arc::clone(&self.log);
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                core.tick(speed.years_per_tick(), &log)
            }));
            match result {
                Ok(output) => output,
                Err(panic) => {
                    let message = panic_message(&panic);
                    let backtrace = std::backtrace::Backtrace::force_capture().to_string();
                    self.dlq.log_panic(
                        core.sim.world_id,
                        core.sim.year,
                        "tick",
                        &message,
                        backtrace,
                    );
                    core.state = RunnerState::Error;
                    return Err(RunnerError::Faulted);
                }
            }
        };
        self.dispatch(&outcome);
        Ok(outcome)
    }

    /// Handler and broadcast dispatch, all locks released.
    fn dispatch(&self, outcome: &TickOutput) {
        for message in &outcome.messages {
            self.broadcaster.broadcast_event(message);
        }
        let (tick, snapshot, turning, broadcast) = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            (
                handlers.tick.clone(),
                handlers.snapshot.clone(),
                handlers.turning.clone(),
                handlers.broadcast.clone(),
            )
        };
        if let Some(broadcast) = broadcast {
            for message in &outcome.messages {
                broadcast(message);
            }
        }
        if let Some(tick) = tick {
            tick(outcome.year);
        }
        if let Some(snapshot) = snapshot {
            for snap in &outcome.new_snapshots {
                snapshot(snap);
            }
        }
        if let (Some(turning), Some(tp)) = (turning, &outcome.turning) {
            turning(tp);
        }
    }

    /// Deterministic lock-held stepping; drives `tick` n times at the
    /// current speed (Normal when the speed is Paused) without touching
    /// the lifecycle state.
    pub fn step(&self, n: usize) -> Result<(), RunnerError> {
        for _ in 0..n {
            let speed = {
                let core = self.read_core();
                if core.speed == Speed::Paused {
                    Speed::Normal
                } else {
                    core.speed
                }
            };
            self.tick_once(speed)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Writes the runner row and the serialized world blob. Serialization
    /// failures surface; store failures are logged by the worker.
    pub fn persist_state(&self) -> Result<(), RunnerError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let (world_id, year, speed, state, blob) = {
            let mut core = self.write_core();
            let json = serde_json::to_vec(&core.sim).map_err(IoError::from)?;
            let blob = compress(&json)?;
            let sim = core.sim.clone();
            if let Err(e) = core.checkpoints.create_checkpoint(&sim) {
                warn!("checkpoint during persist failed: {e}");
            }
            (
                core.sim.world_id,
                core.sim.year,
                core.speed,
                core.state,
                blob,
            )
        };
        store.save_runner_state(world_id, year, speed.years_per_tick(), state.as_str().to_string());
        store.save_world_snapshot(world_id, blob);
        Ok(())
    }

    /// Rehydrates the world from the persisted snapshot and runner row.
    /// A persisted `Running` state comes back as `Paused`; an explicit
    /// `start` is required.
    pub fn load_persisted(&self, world_id: Uuid) -> Result<(), RunnerError> {
        let Some(store) = &self.store else {
            return Err(RunnerError::NoPersistedWorld);
        };
        let row = store
            .query_runner_state(world_id)
            .and_then(|rx| rx.recv().ok())
            .flatten()
            .ok_or(RunnerError::NoPersistedWorld)?;
        let blob = store
            .query_world_snapshot(world_id)
            .and_then(|rx| rx.recv().ok())
            .flatten()
            .ok_or(RunnerError::NoPersistedWorld)?;
        let json = decompress(&blob)?;
        let sim: SimulationState = serde_json::from_slice(&json).map_err(IoError::from)?;

        let mut core = self.write_core();
        core.sim = sim;
        core.speed = Speed::from_years(row.speed);
        core.state = match RunnerState::parse(&row.state) {
            RunnerState::Running => RunnerState::Paused,
            other => other,
        };
        core.last_snapshot_year = core.sim.year;
        info!(year = core.sim.year, state = ?core.state, "world rehydrated");
        Ok(())
    }

    pub fn create_checkpoint(&self) -> Result<Checkpoint, RunnerError> {
        let mut core = self.write_core();
        let sim = core.sim.clone();
        Ok(core.checkpoints.create_checkpoint(&sim)?)
    }

    pub fn restore_to_year(&self, year: i64) -> Result<(), RunnerError> {
        let mut core = self.write_core();
        let world_id = core.sim.world_id;
        let state = core.checkpoints.restore_to_year(world_id, year)?;
        core.sim = state;
        core.last_snapshot_year = core.sim.year;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Turning points
    // ------------------------------------------------------------------

    /// Operator-requested turning point; pauses the scheduler like any
    /// other trigger when `pause_on_turning` is set.
    pub fn trigger_turning_point(&self, title: &str, description: &str) -> Option<TurningPoint> {
        let (tp, message) = {
            let mut core = self.write_core();
            let year = core.sim.year;
            let summary = TurningPointSummary {
                total_species: core.sim.species_count() as u32,
                recent_extinctions: core.sim.extinctions_since(year - 100_000) as u32,
                newly_sapient: 0,
            };
            let tp = core.turning.trigger_manual(year, title, description, summary)?;
            if core.config.runner.pause_on_turning && core.state == RunnerState::Running {
                core.state = RunnerState::Paused;
                core.paused_for_turning = true;
            }
            let message = GameMessage::game("turning_point", tp.title.clone())
                .with_data("year", serde_json::json!(year));
            (tp, message)
        };
        self.broadcaster.broadcast_event(&message);
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        if let Some(handler) = &handlers.turning {
            handler(&tp);
        }
        Some(tp)
    }

    /// Resolves the pending turning point, spending energy and activating
    /// the chosen intervention's effects. Affordability, spend, and
    /// resolution happen atomically under the writer lock.
    pub fn resolve_turning_point(
        &self,
        tp_id: Uuid,
        intervention_id: Uuid,
    ) -> Result<Intervention, RunnerError> {
        let mut core = self.write_core();
        let year = core.sim.year;
        let cost = core
            .turning
            .pending()
            .ok_or(RunnerError::NoPendingTurningPoint)?
            .interventions
            .iter()
            .find(|i| i.id == intervention_id)
            .ok_or(RunnerError::UnknownIntervention)?
            .cost;
        if !core.turning.can_afford(cost) {
            return Err(RunnerError::InsufficientEnergy);
        }
        let chosen = core
            .turning
            .resolve(tp_id, intervention_id, year)
            .ok_or(RunnerError::UnknownIntervention)?;
        core.turning.spend_energy(cost);

        for effect in &chosen.effects {
            core.effects.add(ActiveEffect {
                id: Uuid::new_v4(),
                kind: effect.kind,
                target: chosen.target,
                target_id: None,
                magnitude: effect.magnitude,
                start_year: year,
                duration: effect.duration,
                data: effect.data.clone(),
            });
        }
        let event = SimEvent::new(
            core.sim.world_id,
            year,
            tellus_data::EventType::Intervention,
            0.7,
            serde_json::json!({ "intervention": chosen.name, "cost": cost }),
        );
        self.log.log_event(&event);
        core.recent_events.push_back(event);
        core.events_emitted += 1;
        if core.paused_for_turning {
            core.state = RunnerState::Running;
            core.paused_for_turning = false;
        }
        Ok(chosen)
    }

    pub fn pending_turning_point(&self) -> Option<TurningPoint> {
        self.read_core().turning.pending().cloned()
    }

    /// Rebuilds the pending turning point's intervention menu (wire input
    /// `4`).
    pub fn regenerate_interventions(&self) -> Option<TurningPoint> {
        let mut core = self.write_core();
        let year = core.sim.year;
        core.turning.regenerate_interventions(year)
    }

    // ------------------------------------------------------------------
    // Queries and accessors
    // ------------------------------------------------------------------

    pub fn get_state(&self) -> RunnerState {
        self.read_core().state
    }

    pub fn get_current_year(&self) -> i64 {
        self.read_core().sim.year
    }

    pub fn get_speed(&self) -> Speed {
        self.read_core().speed
    }

    pub fn set_speed(&self, speed: Speed) {
        self.write_core().speed = speed;
    }

    pub fn get_stats(&self) -> RunnerStats {
        let core = self.read_core();
        RunnerStats {
            state: core.state,
            speed: core.speed,
            current_year: core.sim.year,
            start_year: core.start_year,
            total_ticks: core.total_ticks,
            events_emitted: core.events_emitted,
            species_count: core.sim.species_count(),
            population_sum: core.sim.population_sum(),
            divine_energy: core.turning.energy(),
            pending_turning_point: core.turning.pending().is_some(),
            snapshot_count: core.snapshots.len(),
        }
    }

    pub fn update_config(&self, config: SimulationConfig) {
        let mut core = self.write_core();
        core.config = config;
    }

    /// Injects an external event into the ring, the log, and the
    /// broadcast.
    pub fn add_event(&self, event: SimEvent) {
        let message = {
            let mut core = self.write_core();
            self.log.log_event(&event);
            let message = tick::message_for(&event);
            let cap = core.config.runner.recent_events_cap;
            core.recent_events.push_back(event);
            while core.recent_events.len() > cap {
                core.recent_events.pop_front();
            }
            core.events_emitted += 1;
            message
        };
        self.broadcaster.broadcast_event(&message);
    }

    /// The `n` most recent events, newest first.
    pub fn get_recent_events(&self, n: usize) -> Vec<SimEvent> {
        let core = self.read_core();
        core.recent_events.iter().rev().take(n).cloned().collect()
    }

    pub fn get_snapshots(&self) -> Vec<WorldSnapshot> {
        self.read_core().snapshots.iter().cloned().collect()
    }

    /// Nearest snapshot at or before `year`.
    pub fn get_snapshot_at_year(&self, year: i64) -> Option<WorldSnapshot> {
        let core = self.read_core();
        core.snapshots
            .iter()
            .filter(|s| s.year <= year)
            .last()
            .cloned()
    }

    pub fn divine_energy(&self) -> u64 {
        self.read_core().turning.energy()
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    pub fn dead_letter_queue(&self) -> Arc<DeadLetterQueue> {
        Arc::clone(&self.dlq)
    }

    /// The geology engine behind its own mutex, for direct operations.
    pub fn geology(&self) -> Arc<Mutex<GeologyEngine>> {
        Arc::clone(&self.read_core().geology)
    }

    pub fn world_id(&self) -> Uuid {
        self.read_core().sim.world_id
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    pub fn set_tick_handler(&self, handler: TickHandler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .tick = Some(handler);
    }

    pub fn set_snapshot_handler(&self, handler: SnapshotHandler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot = Some(handler);
    }

    pub fn set_turning_point_handler(&self, handler: TurningPointHandler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .turning = Some(handler);
    }

    pub fn set_event_broadcast_handler(&self, handler: EventBroadcastHandler) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .broadcast = Some(handler);
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
