//! Turning-point detection and the Divine Energy budget.
//!
//! The manager holds at most one pending turning point. Triggers are
//! checked in priority order (sapience, mass extinction, era interval,
//! special tag); intervention menus are copied from templates, filtered by
//! per-name cooldowns and scoped by trigger, with Observe always offered.

use std::collections::HashMap;
use tellus_data::{
    EffectKind, Intervention, InterventionEffect, InterventionKind, RiskLevel, TargetKind,
    TurningPoint, TurningPointSummary, TurningTrigger,
};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TurningConfig {
    /// Years between interval-triggered turning points.
    pub interval_years: i64,
    /// Fraction of recent extinctions over total species that counts as a
    /// mass extinction.
    pub extinction_threshold: f64,
    /// Simulated years per unit of Divine Energy.
    pub energy_per_interval: i64,
    pub starting_energy: u64,
}

impl Default for TurningConfig {
    fn default() -> Self {
        Self {
            interval_years: 1_000_000,
            extinction_threshold: 0.25,
            energy_per_interval: 10_000,
            starting_energy: 3,
        }
    }
}

pub struct TurningPointManager {
    world_id: Uuid,
    config: TurningConfig,
    templates: Vec<Intervention>,
    /// Intervention name -> year its cooldown lapses.
    cooldowns: HashMap<String, i64>,
    pending: Option<TurningPoint>,
    paused: bool,
    energy: u64,
    last_energy_year: i64,
    last_interval_year: i64,
}

impl TurningPointManager {
    pub fn new(world_id: Uuid, config: TurningConfig) -> Self {
        Self {
            world_id,
            energy: config.starting_energy,
            config,
            templates: default_templates(),
            cooldowns: HashMap::new(),
            pending: None,
            paused: false,
            last_energy_year: 0,
            last_interval_year: 0,
        }
    }

    // ------------------------------------------------------------------
    // Divine Energy
    // ------------------------------------------------------------------

    /// Accrues energy for the span since the last accrual, preserving the
    /// fractional remainder in `last_energy_year`.
    pub fn accumulate_energy(&mut self, year: i64) {
        let elapsed = year - self.last_energy_year;
        if elapsed <= 0 {
            return;
        }
        let gained = elapsed / self.config.energy_per_interval;
        if gained > 0 {
            self.energy += gained as u64;
            self.last_energy_year += gained * self.config.energy_per_interval;
        }
    }

    pub fn energy(&self) -> u64 {
        self.energy
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.energy >= cost as u64
    }

    /// Returns true iff the budget was atomically reduced by `cost`.
    pub fn spend_energy(&mut self, cost: u32) -> bool {
        if self.energy >= cost as u64 {
            self.energy -= cost as u64;
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Trigger check
    // ------------------------------------------------------------------

    /// Checks trigger conditions for the current year. Returns the new
    /// pending turning point, or `None` when one is already pending or no
    /// condition fires. A fired turning point pauses the manager until
    /// resolved.
    pub fn check_for_turning_point(
        &mut self,
        year: i64,
        total_species: u32,
        recent_extinctions: u32,
        newly_sapient: &[Uuid],
        special_tag: &str,
    ) -> Option<TurningPoint> {
        if self.pending.is_some() {
            return None;
        }

        let summary = TurningPointSummary {
            total_species,
            recent_extinctions,
            newly_sapient: newly_sapient.len() as u32,
        };

        let (trigger, title, description) = if !newly_sapient.is_empty() {
            (
                TurningTrigger::Sapience,
                "The Awakening".to_string(),
                format!("{} species crossed the sapience threshold", newly_sapient.len()),
            )
        } else if total_species > 0
            && f64::from(recent_extinctions) / f64::from(total_species)
                >= self.config.extinction_threshold
        {
            (
                TurningTrigger::Extinction,
                "Mass Extinction".to_string(),
                format!(
                    "{} of {} species lost in the recent past",
                    recent_extinctions, total_species
                ),
            )
        } else if year - self.last_interval_year >= self.config.interval_years {
            (
                TurningTrigger::Interval,
                "Era Milestone".to_string(),
                format!("the world reached year {}", year),
            )
        } else if !special_tag.is_empty() {
            (
                special_trigger(special_tag),
                "Significant Event".to_string(),
                special_tag.to_string(),
            )
        } else {
            return None;
        };

        if trigger == TurningTrigger::Interval {
            self.last_interval_year = year;
        }

        let tp = TurningPoint {
            id: Uuid::new_v4(),
            world_id: self.world_id,
            year,
            trigger,
            title,
            description,
            summary,
            interventions: self.offer_interventions(trigger, year),
            resolved: false,
            chosen: None,
            resolved_year: None,
        };
        info!(year, trigger = ?tp.trigger, "turning point triggered");
        self.pending = Some(tp.clone());
        self.paused = true;
        Some(tp)
    }

    /// Operator-requested turning point with a custom title. Ignored when
    /// one is already pending.
    pub fn trigger_manual(
        &mut self,
        year: i64,
        title: &str,
        description: &str,
        summary: TurningPointSummary,
    ) -> Option<TurningPoint> {
        if self.pending.is_some() {
            return None;
        }
        let tp = TurningPoint {
            id: Uuid::new_v4(),
            world_id: self.world_id,
            year,
            trigger: TurningTrigger::PlayerRequest,
            title: title.to_string(),
            description: description.to_string(),
            summary,
            interventions: self.offer_interventions(TurningTrigger::PlayerRequest, year),
            resolved: false,
            chosen: None,
            resolved_year: None,
        };
        info!(year, title, "turning point requested by operator");
        self.pending = Some(tp.clone());
        self.paused = true;
        Some(tp)
    }

    /// Rebuilds the pending turning point's menu (player requested a
    /// regenerated set of options).
    pub fn regenerate_interventions(&mut self, year: i64) -> Option<TurningPoint> {
        let trigger = self.pending.as_ref()?.trigger;
        let menu = self.offer_interventions(trigger, year);
        let tp = self.pending.as_mut()?;
        tp.interventions = menu;
        Some(tp.clone())
    }

    fn offer_interventions(&self, trigger: TurningTrigger, year: i64) -> Vec<Intervention> {
        let mut offered: Vec<Intervention> = self
            .templates
            .iter()
            .filter(|t| match self.cooldowns.get(&t.name) {
                Some(&until) => until <= year,
                None => true,
            })
            .filter(|t| match trigger {
                TurningTrigger::Extinction => matches!(
                    t.kind,
                    InterventionKind::Protection
                        | InterventionKind::Nudge
                        | InterventionKind::Accelerate
                ),
                TurningTrigger::Sapience => {
                    matches!(t.kind, InterventionKind::Nudge | InterventionKind::Magic)
                }
                TurningTrigger::Interval => true,
                _ => matches!(
                    t.kind,
                    InterventionKind::Nudge | InterventionKind::Protection
                ),
            })
            .cloned()
            .collect();
        for item in &mut offered {
            item.id = Uuid::new_v4();
        }
        offered.push(observe());
        offered
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    pub fn pending(&self) -> Option<&TurningPoint> {
        self.pending.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Resolves the pending turning point with the chosen intervention.
    /// Records the intervention's cooldown and clears the pending slot.
    /// Returns the chosen intervention; `None` when the ids do not match.
    pub fn resolve(&mut self, tp_id: Uuid, intervention_id: Uuid, year: i64) -> Option<Intervention> {
        let tp = self.pending.as_mut()?;
        if tp.id != tp_id {
            return None;
        }
        let chosen = tp
            .interventions
            .iter()
            .find(|i| i.id == intervention_id)?
            .clone();
        if chosen.cooldown > 0 {
            self.cooldowns
                .insert(chosen.name.clone(), year + chosen.cooldown);
        }
        tp.resolved = true;
        tp.chosen = Some(intervention_id);
        tp.resolved_year = Some(year);
        info!(year, intervention = %chosen.name, "turning point resolved");
        self.pending = None;
        self.paused = false;
        Some(chosen)
    }
}

fn special_trigger(tag: &str) -> TurningTrigger {
    match tag {
        "climate_shift" => TurningTrigger::ClimateShift,
        "tectonic_event" => TurningTrigger::TectonicEvent,
        "pandemic" => TurningTrigger::Pandemic,
        "magic_event" => TurningTrigger::MagicEvent,
        "player_request" => TurningTrigger::PlayerRequest,
        _ => TurningTrigger::Milestone,
    }
}

/// Observe is always offered, costs nothing, does nothing.
fn observe() -> Intervention {
    Intervention {
        id: Uuid::new_v4(),
        name: "Observe".to_string(),
        kind: InterventionKind::None,
        cost: 0,
        cooldown: 0,
        target: TargetKind::World,
        effects: Vec::new(),
        risk: RiskLevel::Low,
    }
}

fn default_templates() -> Vec<Intervention> {
    let template = |name: &str,
                    kind: InterventionKind,
                    cost: u32,
                    cooldown: i64,
                    target: TargetKind,
                    risk: RiskLevel,
                    effects: Vec<InterventionEffect>| Intervention {
        id: Uuid::new_v4(),
        name: name.to_string(),
        kind,
        cost,
        cooldown,
        target,
        effects,
        risk,
    };
    vec![
        template(
            "Genetic Nudge",
            InterventionKind::Nudge,
            1,
            50_000,
            TargetKind::Species,
            RiskLevel::Low,
            vec![InterventionEffect {
                kind: EffectKind::TraitBoost,
                magnitude: 1.0,
                duration: 100_000,
                data: None,
            }],
        ),
        template(
            "Shield of Ages",
            InterventionKind::Protection,
            2,
            200_000,
            TargetKind::Species,
            RiskLevel::Low,
            vec![InterventionEffect {
                kind: EffectKind::ExtinctionImmunity,
                magnitude: 1.0,
                duration: 250_000,
                data: None,
            }],
        ),
        template(
            "Evolutionary Surge",
            InterventionKind::Accelerate,
            3,
            500_000,
            TargetKind::Species,
            RiskLevel::Medium,
            vec![InterventionEffect {
                kind: EffectKind::MutationRate,
                magnitude: 2.0,
                duration: 200_000,
                data: None,
            }],
        ),
        template(
            "Guiding Hand",
            InterventionKind::Direct,
            4,
            1_000_000,
            TargetKind::Region,
            RiskLevel::Medium,
            vec![InterventionEffect {
                kind: EffectKind::PopulationBoost,
                magnitude: 1000.0,
                duration: 50_000,
                data: None,
            }],
        ),
        template(
            "Gift of Fire",
            InterventionKind::Magic,
            5,
            2_000_000,
            TargetKind::Species,
            RiskLevel::High,
            vec![InterventionEffect {
                kind: EffectKind::GrantedPower,
                magnitude: 1.0,
                duration: 0,
                data: Some("fire_mastery".to_string()),
            }],
        ),
        template(
            "World Scouring",
            InterventionKind::Cataclysm,
            8,
            5_000_000,
            TargetKind::World,
            RiskLevel::High,
            vec![InterventionEffect {
                kind: EffectKind::Temperature,
                magnitude: -10.0,
                duration: 100_000,
                data: None,
            }],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TurningPointManager {
        TurningPointManager::new(Uuid::new_v4(), TurningConfig::default())
    }

    #[test]
    fn test_energy_accrual_preserves_remainder() {
        let mut m = manager();
        let base = m.energy();
        m.accumulate_energy(25_000);
        assert_eq!(m.energy(), base + 2);
        assert_eq!(m.last_energy_year, 20_000);
        m.accumulate_energy(30_000);
        assert_eq!(m.energy(), base + 3);
    }

    #[test]
    fn test_spend_energy_is_atomic() {
        let mut m = manager();
        let base = m.energy();
        assert!(m.can_afford(base as u32));
        assert!(!m.spend_energy(base as u32 + 1));
        assert_eq!(m.energy(), base);
        assert!(m.spend_energy(1));
        assert_eq!(m.energy(), base - 1);
    }

    #[test]
    fn test_interval_trigger_fires_and_pauses() {
        let mut m = TurningPointManager::new(
            Uuid::new_v4(),
            TurningConfig {
                interval_years: 100_000,
                ..TurningConfig::default()
            },
        );
        let tp = m
            .check_for_turning_point(100_000, 50, 0, &[], "")
            .expect("interval should trigger");
        assert_eq!(tp.trigger, TurningTrigger::Interval);
        assert_eq!(tp.title, "Era Milestone");
        assert!(m.is_paused());

        // No duplicate trigger while pending.
        assert!(m.check_for_turning_point(100_000, 50, 0, &[], "").is_none());
    }

    #[test]
    fn test_sapience_outranks_extinction() {
        let mut m = manager();
        let sapient = [Uuid::new_v4()];
        let tp = m
            .check_for_turning_point(1_000_000, 10, 9, &sapient, "")
            .unwrap();
        assert_eq!(tp.trigger, TurningTrigger::Sapience);
    }

    #[test]
    fn test_extinction_threshold() {
        let mut m = manager();
        assert!(m.check_for_turning_point(10, 100, 24, &[], "").is_none());
        let tp = m.check_for_turning_point(10, 100, 25, &[], "").unwrap();
        assert_eq!(tp.trigger, TurningTrigger::Extinction);
        let kinds: Vec<_> = tp.interventions.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&InterventionKind::Protection));
        assert!(kinds.contains(&InterventionKind::None));
        assert!(!kinds.contains(&InterventionKind::Cataclysm));
    }

    #[test]
    fn test_resolve_clears_pending_and_records_cooldown() {
        let mut m = manager();
        let tp = m
            .check_for_turning_point(1_000_000, 50, 0, &[], "")
            .unwrap();
        let pick = tp
            .interventions
            .iter()
            .find(|i| i.kind == InterventionKind::Nudge)
            .unwrap()
            .clone();
        let resolved = m.resolve(tp.id, pick.id, 1_000_000).unwrap();
        assert_eq!(resolved.name, pick.name);
        assert!(m.pending().is_none());
        assert!(!m.is_paused());

        // The chosen intervention stays off the menu until its cooldown
        // lapses.
        let tp2 = m
            .check_for_turning_point(2_000_000, 50, 0, &[], "")
            .unwrap();
        if pick.cooldown > 1_000_000 {
            assert!(tp2.interventions.iter().all(|i| i.name != pick.name));
        }
    }

    #[test]
    fn test_resolve_rejects_wrong_ids() {
        let mut m = manager();
        let tp = m
            .check_for_turning_point(1_000_000, 50, 0, &[], "")
            .unwrap();
        assert!(m.resolve(Uuid::new_v4(), tp.interventions[0].id, 1_000_000).is_none());
        assert!(m.pending().is_some());
    }

    #[test]
    fn test_observe_always_offered() {
        let mut m = manager();
        for (year, tag) in [(1_000_000, ""), (5_000_000, "pandemic")] {
            let tp = m.check_for_turning_point(year, 50, 0, &[], tag).unwrap();
            assert!(tp
                .interventions
                .iter()
                .any(|i| i.kind == InterventionKind::None && i.cost == 0));
            let observe = tp
                .interventions
                .iter()
                .find(|i| i.kind == InterventionKind::None)
                .unwrap();
            m.resolve(tp.id, observe.id, year).unwrap();
        }
    }
}
