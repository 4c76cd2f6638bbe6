use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tellus_core::geology::GeologyConfig;
use tellus_core::turning::TurningConfig;
use tellus_data::Verbosity;
use tracing::warn;

/// Overrides the config file location when set.
const CONFIG_ENV: &str = "TELLUS_CONFIG";

const CONFIG_FILE: &str = "tellus.toml";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunnerSection {
    /// Wall-clock milliseconds between scheduler ticks.
    pub tick_interval_ms: u64,
    /// Wall-clock seconds between persistence passes.
    pub persist_interval_secs: u64,
    /// Simulated years between lightweight snapshots.
    pub snapshot_interval: i64,
    /// In-memory snapshot ring size; oldest entries drop first.
    pub snapshot_cap: usize,
    /// Pause automatically at this year; 0 disables.
    pub max_year_target: i64,
    pub pause_on_turning: bool,
    /// Recent-event ring size.
    pub recent_events_cap: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GeologySection {
    pub face_resolution: usize,
    pub flat_width: usize,
    pub flat_height: usize,
    pub circumference_m: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TurningSection {
    pub interval_years: i64,
    pub extinction_threshold: f64,
    pub energy_per_interval: i64,
    pub starting_energy: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckpointSection {
    /// Years between full checkpoints; everything in between is a delta.
    pub full_freq: i64,
    pub dlq_max_size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimulationConfig {
    pub seed: u64,
    pub log_dir: String,
    pub verbosity: Verbosity,
    pub runner: RunnerSection,
    pub geology: GeologySection,
    pub turning: TurningSection,
    pub checkpoint: CheckpointSection,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            log_dir: "logs".to_string(),
            verbosity: Verbosity::Info,
            runner: RunnerSection {
                tick_interval_ms: 100,
                persist_interval_secs: 30,
                snapshot_interval: 100_000,
                snapshot_cap: 1_024,
                max_year_target: 0,
                pause_on_turning: true,
                recent_events_cap: 256,
            },
            geology: GeologySection {
                face_resolution: 48,
                flat_width: 192,
                flat_height: 96,
                circumference_m: 40_000_000.0,
            },
            turning: TurningSection {
                interval_years: 1_000_000,
                extinction_threshold: 0.25,
                energy_per_interval: 10_000,
                starting_energy: 3,
            },
            checkpoint: CheckpointSection {
                full_freq: 1_000_000,
                dlq_max_size: 512,
            },
        }
    }
}

impl SimulationConfig {
    /// Config file location: `TELLUS_CONFIG` when set, else `tellus.toml`
    /// in the working directory.
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from)
    }

    /// Loads the resolved config file. A missing file is seeded with the
    /// defaults; a malformed one is left in place and ignored.
    pub fn load() -> Self {
        let path = Self::path();
        if let Some(config) = Self::load_from(&path) {
            return config;
        }
        let config = Self::default();
        if !path.exists() {
            config.seed_file(&path);
        }
        config
    }

    /// Parses a config file; `None` when it is missing or malformed.
    pub fn load_from(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), "ignoring malformed config: {e}");
                None
            }
        }
    }

    fn seed_file(&self, path: &Path) {
        let Ok(serialized) = toml::to_string_pretty(self) else {
            return;
        };
        if let Err(e) = fs::write(path, serialized) {
            warn!(path = %path.display(), "could not seed config file: {e}");
        }
    }

    pub fn geology_config(&self) -> GeologyConfig {
        GeologyConfig {
            face_resolution: self.geology.face_resolution,
            flat_width: self.geology.flat_width,
            flat_height: self.geology.flat_height,
            circumference_m: self.geology.circumference_m,
            ..GeologyConfig::default()
        }
    }

    pub fn turning_config(&self) -> TurningConfig {
        TurningConfig {
            interval_years: self.turning.interval_years,
            extinction_threshold: self.turning.extinction_threshold,
            energy_per_interval: self.turning.energy_per_interval,
            starting_energy: self.turning.starting_energy,
        }
    }

    /// Hash of the rate-critical constants. Worlds persisted under a
    /// different fingerprint were simulated under different physics.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", self.geology).as_bytes());
        hasher.update(format!("{:?}", self.turning).as_bytes());
        hasher.update(self.seed.to_le_bytes());
        hex::encode(hasher.finalize())
    }
}
