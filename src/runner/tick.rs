//! The per-tick advancement loop.
//!
//! Sub-stages observe a fixed order within a tick: population, evolution
//! slots, migration/disease, geology, event drain, snapshot, turning-point
//! check, max-year check. Broadcast messages are collected in production
//! order and delivered after the writer lock is released.

use super::{RunnerCore, RunnerState, WorldSnapshot};
use chrono::Utc;
use tellus_core::geo_events::GeoEventKind;
use tellus_core::geology::PhaseEvent;
use tellus_data::{EventType, GameMessage, SimEvent, TurningPoint};
use tellus_io::EventLog;
use uuid::Uuid;

/// Years between geology advances inside the per-year loop.
const GEOLOGY_CADENCE: i64 = 100_000;

/// Everything a tick produced that must be dispatched outside the lock.
#[derive(Debug, Default)]
pub struct TickOutput {
    pub year: i64,
    pub messages: Vec<GameMessage>,
    pub new_snapshots: Vec<WorldSnapshot>,
    pub turning: Option<TurningPoint>,
    pub reached_max_year: bool,
}

impl RunnerCore {
    /// Advances the world by `n` simulated years. Writer lock held by the
    /// caller.
    pub(crate) fn tick(&mut self, n: i64, log: &EventLog) -> TickOutput {
        let mut out = TickOutput::default();
        let world_id = self.sim.world_id;

        for _ in 0..n {
            self.sim.year += 1;
            let year = self.sim.year;

            self.life.advance_year(&mut self.sim);

            if year % 1_000 == 0 {
                self.life.run_evolution(&mut self.sim);
                self.life.run_coevolution(&mut self.sim);
                self.life.apply_drift(&mut self.sim);
                self.life.run_sexual_selection(&mut self.sim);
                for species_id in self.sapience.scan(&self.sim, year) {
                    self.newly_sapient.push(species_id);
                    let event = SimEvent::new(
                        world_id,
                        year,
                        EventType::SapienceDetected,
                        0.9,
                        serde_json::json!({ "species_id": species_id }),
                    );
                    self.queue_event(event, log, &mut out);
                }
            }

            if year % 10_000 == 0 {
                let mods = self.geo_events.get_environment_modifiers(year);
                self.life.update_oxygen(&mut self.sim, mods.oxygen);
                self.effects.cleanup_expired(year);
                self.life.check_speciation(&mut self.sim);
                self.life.apply_migration(&mut self.sim);
                for event in self.disease.update(&mut self.sim, year) {
                    self.queue_event(event, log, &mut out);
                }
            }

            if year % GEOLOGY_CADENCE == 0 {
                self.advance_geology(year, log, &mut out);
            }

            for event in self.life.drain_events() {
                self.queue_event(event, log, &mut out);
            }

            if year - self.last_snapshot_year >= self.config.runner.snapshot_interval {
                let snapshot = WorldSnapshot {
                    year,
                    species_count: self.sim.species_count() as u32,
                    population_sum: self.sim.population_sum(),
                    timestamp: Utc::now().to_rfc3339(),
                };
                self.snapshots.push_back(snapshot.clone());
                while self.snapshots.len() > self.config.runner.snapshot_cap {
                    self.snapshots.pop_front();
                }
                self.last_snapshot_year = year;
                out.new_snapshots.push(snapshot);
            }

            if year % GEOLOGY_CADENCE == 0 && year > 0 {
                self.turning.accumulate_energy(year);
                if self.check_turning_point(year, log, &mut out) {
                    break;
                }
            }

            if self.config.runner.max_year_target > 0
                && year >= self.config.runner.max_year_target
            {
                if self.state == RunnerState::Running {
                    self.state = RunnerState::Paused;
                }
                out.reached_max_year = true;
                out.messages.push(
                    GameMessage::game("max_year_reached", format!("simulation paused at year {year}"))
                        .with_data("year", serde_json::json!(year)),
                );
                break;
            }
        }

        self.turning.accumulate_energy(self.sim.year);
        self.total_ticks += 1;
        out.year = self.sim.year;
        out
    }

    fn check_turning_point(&mut self, year: i64, log: &EventLog, out: &mut TickOutput) -> bool {
        let total_species = self.sim.species_count() as u32;
        let recent_extinctions = self.sim.extinctions_since(year - GEOLOGY_CADENCE) as u32;
        let newly_sapient: Vec<Uuid> = std::mem::take(&mut self.newly_sapient);
        let Some(tp) = self.turning.check_for_turning_point(
            year,
            total_species,
            recent_extinctions,
            &newly_sapient,
            "",
        ) else {
            return false;
        };

        let event = SimEvent::new(
            self.sim.world_id,
            year,
            EventType::TurningPoint,
            0.8,
            serde_json::json!({ "trigger": tp.trigger, "title": tp.title }),
        );
        self.queue_event(event, log, out);
        out.messages.push(
            GameMessage::game("turning_point", tp.title.clone())
                .with_data("year", serde_json::json!(year))
                .with_data("importance", serde_json::json!("high")),
        );
        if self.config.runner.pause_on_turning && self.state == RunnerState::Running {
            self.state = RunnerState::Paused;
            self.paused_for_turning = true;
        }
        out.turning = Some(tp);
        true
    }

    fn advance_geology(&mut self, year: i64, log: &EventLog, out: &mut TickOutput) {
        let world_id = self.sim.world_id;

        // New stochastic events feed both the modifier pool and terrain.
        let started = self.geo_events.check_for_new_events(year, GEOLOGY_CADENCE);
        let geology = self.geology.clone();
        {
            let mut engine = geology.lock().unwrap_or_else(|e| e.into_inner());
            for geo_event in &started {
                engine.apply_event(geo_event);
                let (ty, tag) = match geo_event.kind {
                    GeoEventKind::VolcanicWinter
                    | GeoEventKind::ContinentalDrift
                    | GeoEventKind::FloodBasalt
                    | GeoEventKind::AsteroidImpact => (EventType::Tectonic, "tectonic"),
                    _ => (EventType::Climate, "climate"),
                };
                let event = SimEvent::new(
                    world_id,
                    year,
                    ty,
                    geo_event.severity as f32,
                    serde_json::json!({ "kind": geo_event.kind, "duration": geo_event.duration }),
                );
                self.queue_event(event, log, out);
                out.messages.push(
                    GameMessage::simulation(tag, format!("{:?} begins", geo_event.kind))
                        .with_data("severity", serde_json::json!(geo_event.severity)),
                );
            }
        }

        self.climate.update(year, &mut self.geo_events);
        if self.climate.is_ice_age() != self.was_ice_age {
            self.was_ice_age = self.climate.is_ice_age();
            let event = SimEvent::new(
                world_id,
                year,
                EventType::Climate,
                0.6,
                serde_json::json!({
                    "ice_age": self.was_ice_age,
                    "insolation": self.climate.get_insolation(),
                }),
            );
            self.queue_event(event, log, out);
        }

        let mods = self.geo_events.get_environment_modifiers(year);
        let temp_mod = mods.delta_t + self.effects.temperature_modifier(year);
        let phase = {
            let mut engine = geology.lock().unwrap_or_else(|e| e.into_inner());
            let phase = engine.simulate_geology(GEOLOGY_CADENCE as f64, temp_mod);
            if year % 1_000_000 == 0 {
                engine.update_biomes(temp_mod);
                self.sim.tectonics = Some(tellus_data::TectonicSnapshot {
                    fragmentation: engine.fragmentation(),
                });
                let climate_snapshot =
                    self.sim
                        .climate
                        .get_or_insert(tellus_data::ClimateSnapshot {
                            global_temperature: 15.0,
                            oxygen: 0.21,
                            co2: 0.0004,
                        });
                climate_snapshot.global_temperature = (15.0 + temp_mod) as f32;
            }
            phase
        };
        if let Some(PhaseEvent::GreatDeluge) = phase {
            let event = SimEvent::new(
                world_id,
                year,
                EventType::Climate,
                1.0,
                serde_json::json!({ "phase": "great_deluge" }),
            );
            self.queue_event(event, log, out);
            out.messages
                .push(GameMessage::game("great_deluge", "the skies open and oceans return"));
        }

        self.geo_events.update_active_events(year);
    }

    fn queue_event(&mut self, event: SimEvent, log: &EventLog, out: &mut TickOutput) {
        log.log_event(&event);
        out.messages.push(message_for(&event));
        self.recent_events.push_back(event);
        while self.recent_events.len() > self.config.runner.recent_events_cap {
            self.recent_events.pop_front();
        }
        self.events_emitted += 1;
    }
}

/// Maps an event record onto the broadcast envelope.
pub(crate) fn message_for(event: &SimEvent) -> GameMessage {
    GameMessage::simulation(
        event.event_type.as_str(),
        format!("{} at year {}", event.event_type.as_str(), event.year),
    )
    .with_data("year", serde_json::json!(event.year))
    .with_data("severity", serde_json::json!(event.severity))
}
