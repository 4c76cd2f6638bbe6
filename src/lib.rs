//! Deep-time planetary ecosystem simulation core.
//!
//! The runner owns the world's time axis and fans tick work through the
//! geology, climate, biology, and intervention subsystems; everything an
//! embedding process needs is re-exported here.

pub mod broadcast;
pub mod config;
pub mod life;
pub mod runner;
pub mod view;

pub use broadcast::Broadcaster;
pub use config::SimulationConfig;
pub use life::{
    BasicDiseaseSim, BasicLifeSim, DiseaseSimulator, LifeSimulator, SapienceDetector,
    ThresholdSapienceDetector,
};
pub use runner::{
    RunnerError, RunnerState, RunnerStats, SimulationRunner, Speed, WorldSnapshot,
};
pub use view::{PlayerViewSync, ViewState};
