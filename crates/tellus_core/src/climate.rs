//! Orbital climate driver: insolation, solar luminosity, and the ice-age
//! state machine with hysteresis.

use crate::geo_events::{GeoEvent, GeoEventKind, GeoEventManager};
use crate::heat::heat;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Obliquity oscillation period, years.
const OBLIQUITY_PERIOD: f64 = 41_000.0;

/// Insolation thresholds: enter below, exit above. The asymmetry plus the
/// minimum duration gives the hysteresis.
const ICE_AGE_ENTER: f64 = 0.985;
const ICE_AGE_EXIT: f64 = 0.995;
const ICE_AGE_MIN_YEARS: i64 = 10_000;

/// Main-sequence brightening timescale, years.
const SOLAR_EVOLUTION_SPAN: f64 = 4.6e9;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct IceAgeState {
    pub active: bool,
    pub start_year: i64,
}

pub struct ClimateDriver {
    base_insolation: f64,
    /// 0..1; a large moon damps obliquity swings.
    stability: f64,
    greenhouse_offset: f64,
    geothermal_offset: f64,
    insolation: f64,
    obliquity: f64,
    solar_luminosity: f64,
    ice_age: IceAgeState,
}

impl Default for ClimateDriver {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl ClimateDriver {
    pub fn new(base_insolation: f64, stability: f64) -> Self {
        Self {
            base_insolation,
            stability: stability.clamp(0.0, 1.0),
            greenhouse_offset: 0.0,
            geothermal_offset: 0.0,
            insolation: base_insolation,
            obliquity: 23.44,
            solar_luminosity: 1.0,
            ice_age: IceAgeState::default(),
        }
    }

    pub fn set_greenhouse_offset(&mut self, offset: f64) {
        self.greenhouse_offset = offset;
    }

    /// Recomputes orbital state and insolation for `year`, then steps the
    /// ice-age machine. Insolation-driven ice ages are injected into the
    /// event manager; ending an ice age truncates the injected event.
    pub fn update(&mut self, year: i64, events: &mut GeoEventManager) {
        let y = year.max(0) as f64;
        let phase = (y / OBLIQUITY_PERIOD) * std::f64::consts::TAU;

        self.obliquity = 23.44 + 1.2 * self.stability * phase.sin();
        // The young sun is fainter; luminosity is normalized to 1.0 at
        // year 0 and brightens over the main sequence.
        self.solar_luminosity = 1.0 / (1.0 - 0.1 * (y / SOLAR_EVOLUTION_SPAN).min(1.0));
        self.geothermal_offset = 12.0 * (heat(year) - 1.0);
        self.insolation =
            self.base_insolation * self.solar_luminosity * (1.0 + 0.02 * self.stability * phase.sin());

        if !self.ice_age.active && self.insolation < ICE_AGE_ENTER {
            self.start_ice_age(year, events);
        } else if self.ice_age.active
            && self.insolation > ICE_AGE_EXIT
            && year - self.ice_age.start_year >= ICE_AGE_MIN_YEARS
        {
            self.end_ice_age(year, events);
        }
    }

    fn start_ice_age(&mut self, year: i64, events: &mut GeoEventManager) {
        let severity = ((ICE_AGE_ENTER - self.insolation) / 0.03).clamp(0.3, 1.0);
        self.ice_age = IceAgeState {
            active: true,
            start_year: year,
        };
        info!(year, severity, insolation = self.insolation, "ice age begins");
        events.queue_event(GeoEvent {
            kind: GeoEventKind::IceAge,
            start_tick: year,
            // Open-ended until the exit condition truncates it; bounded by
            // a glacial-cycle ceiling so an abandoned driver cannot leave
            // a permanent event behind.
            duration: 400_000,
            severity,
            delta_t: -8.0 - severity * 12.0,
            sunlight: 0.9,
            oxygen: 1.0,
        });
    }

    fn end_ice_age(&mut self, year: i64, events: &mut GeoEventManager) {
        info!(year, started = self.ice_age.start_year, "ice age ends");
        self.ice_age.active = false;
        events.end_ice_age(year);
    }

    pub fn get_obliquity(&self) -> f64 {
        self.obliquity
    }

    pub fn get_insolation(&self) -> f64 {
        self.insolation
    }

    pub fn is_ice_age(&self) -> bool {
        self.ice_age.active
    }

    pub fn ice_age_state(&self) -> IceAgeState {
        self.ice_age
    }

    pub fn get_geothermal_offset(&self) -> f64 {
        self.geothermal_offset
    }

    pub fn get_greenhouse_offset(&self) -> f64 {
        self.greenhouse_offset
    }

    pub fn get_solar_luminosity(&self) -> f64 {
        self.solar_luminosity
    }
}
