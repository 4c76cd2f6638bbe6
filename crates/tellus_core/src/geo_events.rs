//! Stochastic long-lived geological and climate events.
//!
//! Elapsed simulation time is divided into 10 000-tick chunks; each chunk
//! samples an independent probability per event kind. Active events merge
//! into a single modifier triple (additive temperature, multiplicative
//! sunlight and oxygen) consumed by the biology and climate subsystems.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Ticks per probability-sampling chunk.
const CHUNK_TICKS: i64 = 10_000;

/// Cooling deeper than this for longer than `RECOVERY_YEARS` arms the
/// warming-recovery check.
const RECOVERY_COOLING_C: f64 = 5.0;
const RECOVERY_YEARS: i64 = 50_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GeoEventKind {
    VolcanicWinter,
    AsteroidImpact,
    IceAge,
    OceanAnoxia,
    ContinentalDrift,
    FloodBasalt,
    GreenhouseSpike,
    Warming,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GeoEvent {
    pub kind: GeoEventKind,
    pub start_tick: i64,
    pub duration: i64,
    pub severity: f64,
    /// Additive global temperature offset in degrees C.
    pub delta_t: f64,
    /// Multiplicative sunlight factor.
    pub sunlight: f64,
    /// Multiplicative oxygen factor.
    pub oxygen: f64,
}

impl GeoEvent {
    pub fn active(&self, tick: i64) -> bool {
        tick < self.start_tick + self.duration
    }

    fn new(kind: GeoEventKind, start_tick: i64, severity: f64) -> Self {
        let severity = severity.clamp(0.0, 1.0);
        let (duration, delta_t, sunlight, oxygen) = match kind {
            GeoEventKind::VolcanicWinter => {
                (5_000 + (15_000.0 * severity) as i64, -4.0 - 6.0 * severity, 0.85, 1.0)
            }
            GeoEventKind::AsteroidImpact => {
                (1_000 + (4_000.0 * severity) as i64, -5.0 - 10.0 * severity, 0.7, 1.0)
            }
            GeoEventKind::IceAge => {
                (50_000 + (150_000.0 * severity) as i64, -8.0 - 12.0 * severity, 0.9, 1.0)
            }
            GeoEventKind::OceanAnoxia => (100_000, 0.0, 1.0, 0.6 + 0.2 * (1.0 - severity)),
            GeoEventKind::ContinentalDrift => (500_000, 0.0, 1.0, 1.0),
            GeoEventKind::FloodBasalt => {
                (200_000, 2.0 + 4.0 * severity, 0.95, 0.9)
            }
            GeoEventKind::GreenhouseSpike => (50_000, 3.0 + 5.0 * severity, 1.0, 1.0),
            GeoEventKind::Warming => (30_000, 6.0, 1.0, 1.0),
        };
        Self {
            kind,
            start_tick,
            duration,
            severity,
            delta_t,
            sunlight,
            oxygen,
        }
    }
}

/// Merged modifiers over all currently-active events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvModifiers {
    pub delta_t: f64,
    pub sunlight: f64,
    pub oxygen: f64,
}

impl Default for EnvModifiers {
    fn default() -> Self {
        Self {
            delta_t: 0.0,
            sunlight: 1.0,
            oxygen: 1.0,
        }
    }
}

pub struct GeoEventManager {
    active: Vec<GeoEvent>,
    /// Events scheduled to begin at a future tick (delayed follow-ups).
    pending: Vec<GeoEvent>,
    /// 0..1; scales volcanic-winter odds, decays per chunk.
    tectonic_activity: f64,
    /// 0..1; 1.0 suppresses asteroid impacts entirely.
    impact_shielding: f64,
    /// Years spent below the recovery cooling threshold.
    cooling_years: i64,
    chunk_carry: i64,
    rng: ChaCha8Rng,
}

impl GeoEventManager {
    pub fn new(seed: u64) -> Self {
        Self {
            active: Vec::new(),
            pending: Vec::new(),
            tectonic_activity: 0.5,
            impact_shielding: 0.0,
            cooling_years: 0,
            chunk_carry: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn set_impact_shielding(&mut self, shielding: f64) {
        self.impact_shielding = shielding.clamp(0.0, 1.0);
    }

    pub fn raise_tectonic_activity(&mut self, amount: f64) {
        self.tectonic_activity = (self.tectonic_activity + amount).min(1.0);
    }

    pub fn tectonic_activity(&self) -> f64 {
        self.tectonic_activity
    }

    /// Samples new events for the span `(current_tick - ticks_elapsed,
    /// current_tick]`. Returns events that began during the span.
    pub fn check_for_new_events(&mut self, current_tick: i64, ticks_elapsed: i64) -> Vec<GeoEvent> {
        let mut started = Vec::new();

        // Promote delayed events whose start has arrived.
        let due: Vec<GeoEvent> = {
            let (due, rest): (Vec<_>, Vec<_>) = self
                .pending
                .drain(..)
                .partition(|e| e.start_tick <= current_tick);
            self.pending = rest;
            due
        };
        for ev in due {
            started.push(ev.clone());
            self.active.push(ev);
        }

        self.chunk_carry += ticks_elapsed.max(0);
        while self.chunk_carry >= CHUNK_TICKS {
            self.chunk_carry -= CHUNK_TICKS;
            self.sample_chunk(current_tick, &mut started);

            self.tectonic_activity = (self.tectonic_activity * 0.9999).max(0.05);
            self.check_climate_recovery(current_tick, &mut started);
        }
        started
    }

    fn sample_chunk(&mut self, tick: i64, started: &mut Vec<GeoEvent>) {
        let p_volcanic = 0.002 + 0.028 * self.tectonic_activity;
        if self.rng.gen_bool(p_volcanic) {
            let sev = self.rng.gen_range(0.1..1.0);
            self.begin(GeoEvent::new(GeoEventKind::VolcanicWinter, tick, sev), started);
        }
        let p_asteroid = 0.001 * (1.0 - self.impact_shielding);
        if p_asteroid > 0.0 && self.rng.gen_bool(p_asteroid) {
            let sev = self.rng.gen_range(0.2..1.0);
            self.begin(GeoEvent::new(GeoEventKind::AsteroidImpact, tick, sev), started);
        }
        if self.rng.gen_bool(0.0005) {
            let sev = self.rng.gen_range(0.3..1.0);
            self.begin(GeoEvent::new(GeoEventKind::IceAge, tick, sev), started);
        }
        if self.rng.gen_bool(0.0002) {
            let sev = self.rng.gen_range(0.2..0.8);
            self.begin(GeoEvent::new(GeoEventKind::OceanAnoxia, tick, sev), started);
        }
        if self.rng.gen_bool(0.0003) {
            let sev = self.rng.gen_range(0.2..1.0);
            self.raise_tectonic_activity(0.2);
            self.begin(GeoEvent::new(GeoEventKind::ContinentalDrift, tick, sev), started);
        }
        if self.rng.gen_bool(0.0001) {
            let sev = self.rng.gen_range(0.3..1.0);
            self.raise_tectonic_activity(0.3);
            self.begin(GeoEvent::new(GeoEventKind::FloodBasalt, tick, sev), started);
            // Flood basalts outgas; a greenhouse spike follows once the
            // dust settles.
            self.pending
                .push(GeoEvent::new(GeoEventKind::GreenhouseSpike, tick + 10_000, sev));
        }
    }

    fn check_climate_recovery(&mut self, tick: i64, started: &mut Vec<GeoEvent>) {
        let cooling: f64 = self
            .active
            .iter()
            .filter(|e| e.active(tick) && e.delta_t < 0.0)
            .map(|e| e.delta_t)
            .sum();
        if cooling <= -RECOVERY_COOLING_C {
            self.cooling_years += CHUNK_TICKS;
            if self.cooling_years > RECOVERY_YEARS && self.rng.gen_bool(0.1) {
                self.begin(GeoEvent::new(GeoEventKind::Warming, tick, 0.5), started);
                self.cooling_years = 0;
            }
        } else {
            self.cooling_years = 0;
        }
    }

    fn begin(&mut self, event: GeoEvent, started: &mut Vec<GeoEvent>) {
        info!(kind = ?event.kind, tick = event.start_tick, severity = event.severity,
              "geological event begins");
        started.push(event.clone());
        self.active.push(event);
    }

    /// Queues an externally-constructed event (the climate driver injects
    /// insolation-driven ice ages this way).
    pub fn queue_event(&mut self, event: GeoEvent) {
        self.active.push(event);
    }

    /// Truncates any active ice-age event so it ends at `tick`.
    pub fn end_ice_age(&mut self, tick: i64) {
        for ev in &mut self.active {
            if ev.kind == GeoEventKind::IceAge && ev.active(tick) {
                ev.duration = (tick - ev.start_tick).max(0);
            }
        }
    }

    pub fn has_active(&self, kind: GeoEventKind, tick: i64) -> bool {
        self.active.iter().any(|e| e.kind == kind && e.active(tick))
    }

    /// (sum of temperature offsets, product of sunlight factors, product of
    /// oxygen factors) over active events.
    pub fn get_environment_modifiers(&self, tick: i64) -> EnvModifiers {
        let mut m = EnvModifiers::default();
        for ev in self.active.iter().filter(|e| e.active(tick)) {
            m.delta_t += ev.delta_t;
            m.sunlight *= ev.sunlight;
            m.oxygen *= ev.oxygen;
        }
        m
    }

    /// Drops events whose duration has elapsed.
    pub fn update_active_events(&mut self, tick: i64) {
        self.active.retain(|e| e.active(tick));
    }

    pub fn active_events(&self) -> &[GeoEvent] {
        &self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_shielding_blocks_asteroids() {
        let mut m = GeoEventManager::new(7);
        m.set_impact_shielding(1.0);
        let mut started = Vec::new();
        for i in 0..1_000 {
            started.extend(m.check_for_new_events(i * CHUNK_TICKS, CHUNK_TICKS));
        }
        assert!(started
            .iter()
            .all(|e| e.kind != GeoEventKind::AsteroidImpact));
    }

    #[test]
    fn test_activity_stays_within_bounds() {
        let mut m = GeoEventManager::new(1);
        for i in 0..5_000 {
            m.check_for_new_events(i * CHUNK_TICKS, CHUNK_TICKS);
            m.update_active_events(i * CHUNK_TICKS);
            assert!(m.tectonic_activity() >= 0.05);
            assert!(m.tectonic_activity() <= 1.0);
        }
    }

    #[test]
    fn test_modifiers_merge() {
        let mut m = GeoEventManager::new(0);
        m.queue_event(GeoEvent {
            kind: GeoEventKind::VolcanicWinter,
            start_tick: 0,
            duration: 10_000,
            severity: 0.5,
            delta_t: -5.0,
            sunlight: 0.9,
            oxygen: 1.0,
        });
        m.queue_event(GeoEvent {
            kind: GeoEventKind::OceanAnoxia,
            start_tick: 0,
            duration: 10_000,
            severity: 0.5,
            delta_t: -1.0,
            sunlight: 0.8,
            oxygen: 0.7,
        });
        let mods = m.get_environment_modifiers(100);
        assert!((mods.delta_t - -6.0).abs() < 1e-9);
        assert!((mods.sunlight - 0.72).abs() < 1e-9);
        assert!((mods.oxygen - 0.7).abs() < 1e-9);

        // Expired events contribute nothing and are filterable.
        let mods = m.get_environment_modifiers(10_000);
        assert_eq!(mods, EnvModifiers::default());
        m.update_active_events(10_000);
        assert!(m.active_events().is_empty());
    }

    #[test]
    fn test_ice_age_truncation() {
        let mut m = GeoEventManager::new(0);
        m.queue_event(GeoEvent::new(GeoEventKind::IceAge, 1_000, 0.5));
        assert!(m.has_active(GeoEventKind::IceAge, 5_000));
        m.end_ice_age(5_000);
        assert!(!m.has_active(GeoEventKind::IceAge, 5_000));
    }

    #[test]
    fn test_chunk_carry_accumulates_partial_spans() {
        let mut m = GeoEventManager::new(42);
        // Spans shorter than a chunk accumulate instead of being dropped.
        m.check_for_new_events(4_000, 4_000);
        assert_eq!(m.chunk_carry, 4_000);
        m.check_for_new_events(10_000, 6_000);
        assert_eq!(m.chunk_carry, 0);
        m.check_for_new_events(35_000, 25_000);
        assert_eq!(m.chunk_carry, 5_000);
    }
}
