//! Throttled, interpolated read-model for observers.
//!
//! A timer thread samples the runner and pushes a `ViewState` to an
//! optional handler. Between samples the display year interpolates from
//! the previous observation toward the latest, clamped to the update
//! interval.

use crate::runner::{RunnerState, SimulationRunner, Speed};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tellus_data::{SimEvent, TurningPoint};

#[derive(Serialize, Debug, Clone)]
pub struct ViewState {
    pub state: RunnerState,
    pub speed: Speed,
    pub year: i64,
    /// Interpolated display year; smooth between observations.
    pub display_year: f64,
    pub species_count: usize,
    pub population_sum: u64,
    pub divine_energy: u64,
    pub recent_events: Vec<SimEvent>,
    pub pending_turning_point: Option<TurningPoint>,
}

pub type ViewHandler = Arc<dyn Fn(&ViewState) + Send + Sync>;

struct Observation {
    prev_year: i64,
    year: i64,
    at: Instant,
}

pub struct PlayerViewSync {
    runner: SimulationRunner,
    interval: Duration,
    handler: Mutex<Option<ViewHandler>>,
    observation: Mutex<Observation>,
    stop_flag: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerViewSync {
    pub fn new(runner: SimulationRunner) -> Arc<Self> {
        Self::with_interval(runner, Duration::from_millis(100))
    }

    pub fn with_interval(runner: SimulationRunner, interval: Duration) -> Arc<Self> {
        let year = runner.get_current_year();
        Arc::new(Self {
            runner,
            interval,
            handler: Mutex::new(None),
            observation: Mutex::new(Observation {
                prev_year: year,
                year,
                at: Instant::now(),
            }),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }

    pub fn set_handler(&self, handler: ViewHandler) {
        *self.handler.lock().expect("view handler poisoned") = Some(handler);
    }

    /// Spawns the periodic sampling thread.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.thread.lock().expect("view thread poisoned");
        if slot.is_some() {
            return;
        }
        let view = Arc::clone(self);
        let stop = Arc::clone(&self.stop_flag);
        let interval = self.interval;
        *slot = Some(std::thread::spawn(move || loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(interval);
            view.force_update();
        }));
    }

    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().expect("view thread poisoned").take() {
            let _ = handle.join();
        }
        self.stop_flag.store(false, Ordering::SeqCst);
    }

    /// Samples the runner immediately and pushes the view to the handler.
    pub fn force_update(&self) {
        {
            let mut obs = self.observation.lock().expect("view observation poisoned");
            obs.prev_year = obs.year;
            obs.year = self.runner.get_current_year();
            obs.at = Instant::now();
        }
        let state = self.get_current_state();
        let handler = self.handler.lock().expect("view handler poisoned").clone();
        if let Some(handler) = handler {
            handler(&state);
        }
    }

    /// The current view, with the display year interpolated by elapsed
    /// fraction of the update interval (clamped to 1).
    pub fn get_current_state(&self) -> ViewState {
        let stats = self.runner.get_stats();
        let display_year = {
            let obs = self.observation.lock().expect("view observation poisoned");
            let fraction =
                (obs.at.elapsed().as_secs_f64() / self.interval.as_secs_f64()).clamp(0.0, 1.0);
            obs.prev_year as f64 + (obs.year - obs.prev_year) as f64 * fraction
        };
        ViewState {
            state: stats.state,
            speed: stats.speed,
            year: stats.current_year,
            display_year,
            species_count: stats.species_count,
            population_sum: stats.population_sum,
            divine_energy: stats.divine_energy,
            recent_events: self.runner.get_recent_events(16),
            pending_turning_point: self.runner.pending_turning_point(),
        }
    }

    /// Only succeeds when a snapshot exists at or before the requested
    /// year; the view then reports that snapshot's year.
    pub fn seek_to_year(&self, year: i64) -> bool {
        match self.runner.get_snapshot_at_year(year) {
            Some(snapshot) => {
                let mut obs = self.observation.lock().expect("view observation poisoned");
                obs.prev_year = snapshot.year;
                obs.year = snapshot.year;
                obs.at = Instant::now();
                true
            }
            None => false,
        }
    }

    /// (oldest snapshot year, current year); `None` without snapshots.
    pub fn get_available_year_range(&self) -> Option<(i64, i64)> {
        let snapshots = self.runner.get_snapshots();
        let first = snapshots.first()?.year;
        Some((first, self.runner.get_current_year()))
    }
}

impl Drop for PlayerViewSync {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}
