//! Active-effect bookkeeping for resolved interventions.
//!
//! Effects are append-only; expiry is handled by `cleanup_expired`, and
//! every query filters expired entries so callers never observe them.

use tellus_data::{ActiveEffect, EffectKind, TargetKind};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct EffectApplicator {
    effects: Vec<ActiveEffect>,
}

impl EffectApplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: ActiveEffect) {
        self.effects.push(effect);
    }

    /// Drops every effect that has expired as of `year`.
    pub fn cleanup_expired(&mut self, year: i64) {
        self.effects.retain(|e| !e.expired(year));
    }

    pub fn active_count(&self, year: i64) -> usize {
        self.live(year).count()
    }

    fn live(&self, year: i64) -> impl Iterator<Item = &ActiveEffect> {
        self.effects.iter().filter(move |e| !e.expired(year))
    }

    fn targeting(&self, year: i64, target_id: Uuid) -> impl Iterator<Item = &ActiveEffect> {
        self.live(year)
            .filter(move |e| e.target_id == Some(target_id) || e.target == TargetKind::World)
    }

    /// Sum of trait-boost magnitudes applying to `target_id`.
    pub fn trait_modifier(&self, year: i64, target_id: Uuid) -> f64 {
        self.targeting(year, target_id)
            .filter(|e| e.kind == EffectKind::TraitBoost)
            .map(|e| e.magnitude)
            .sum()
    }

    /// Product of mutation-rate multipliers applying to `target_id`, base 1.
    pub fn mutation_multiplier(&self, year: i64, target_id: Uuid) -> f64 {
        self.targeting(year, target_id)
            .filter(|e| e.kind == EffectKind::MutationRate)
            .map(|e| e.magnitude)
            .product()
    }

    /// Sum of population-boost magnitudes applying to `target_id`.
    pub fn population_modifier(&self, year: i64, target_id: Uuid) -> f64 {
        self.targeting(year, target_id)
            .filter(|e| e.kind == EffectKind::PopulationBoost)
            .map(|e| e.magnitude)
            .sum()
    }

    /// Sum of world-targeted temperature offsets.
    pub fn temperature_modifier(&self, year: i64) -> f64 {
        self.live(year)
            .filter(|e| e.kind == EffectKind::Temperature && e.target == TargetKind::World)
            .map(|e| e.magnitude)
            .sum()
    }

    /// True when any live effect grants `target_id` extinction immunity.
    pub fn extinction_immune(&self, year: i64, target_id: Uuid) -> bool {
        self.targeting(year, target_id)
            .any(|e| e.kind == EffectKind::ExtinctionImmunity)
    }

    /// Power strings granted to `target_id`.
    pub fn granted_powers(&self, year: i64, target_id: Uuid) -> Vec<String> {
        self.targeting(year, target_id)
            .filter(|e| e.kind == EffectKind::GrantedPower)
            .filter_map(|e| e.data.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(kind: EffectKind, target_id: Option<Uuid>, magnitude: f64) -> ActiveEffect {
        ActiveEffect {
            id: Uuid::new_v4(),
            kind,
            target: if target_id.is_some() {
                TargetKind::Species
            } else {
                TargetKind::World
            },
            target_id,
            magnitude,
            start_year: 0,
            duration: 1000,
            data: None,
        }
    }

    #[test]
    fn test_trait_boosts_sum() {
        let id = Uuid::new_v4();
        let mut app = EffectApplicator::new();
        app.add(effect(EffectKind::TraitBoost, Some(id), 1.0));
        app.add(effect(EffectKind::TraitBoost, Some(id), 2.5));
        app.add(effect(EffectKind::TraitBoost, Some(Uuid::new_v4()), 9.0));
        assert_eq!(app.trait_modifier(500, id), 3.5);
    }

    #[test]
    fn test_mutation_multipliers_multiply() {
        let id = Uuid::new_v4();
        let mut app = EffectApplicator::new();
        assert_eq!(app.mutation_multiplier(0, id), 1.0);
        app.add(effect(EffectKind::MutationRate, Some(id), 2.0));
        app.add(effect(EffectKind::MutationRate, Some(id), 1.5));
        assert_eq!(app.mutation_multiplier(0, id), 3.0);
    }

    #[test]
    fn test_world_effects_apply_to_all_targets() {
        let id = Uuid::new_v4();
        let mut app = EffectApplicator::new();
        app.add(effect(EffectKind::TraitBoost, None, 4.0));
        assert_eq!(app.trait_modifier(0, id), 4.0);
        app.add(effect(EffectKind::Temperature, None, -3.0));
        assert_eq!(app.temperature_modifier(0), -3.0);
    }

    #[test]
    fn test_queries_never_return_expired() {
        let id = Uuid::new_v4();
        let mut app = EffectApplicator::new();
        app.add(effect(EffectKind::TraitBoost, Some(id), 2.0));
        assert_eq!(app.trait_modifier(999, id), 2.0);
        assert_eq!(app.trait_modifier(1000, id), 0.0);
        // Cleanup removes, queries only filter.
        assert_eq!(app.effects.len(), 1);
        app.cleanup_expired(1000);
        assert!(app.effects.is_empty());
    }

    #[test]
    fn test_immunity_is_disjunctive() {
        let id = Uuid::new_v4();
        let mut app = EffectApplicator::new();
        assert!(!app.extinction_immune(0, id));
        app.add(effect(EffectKind::ExtinctionImmunity, Some(id), 1.0));
        assert!(app.extinction_immune(0, id));
    }

    #[test]
    fn test_granted_powers_collects_strings() {
        let id = Uuid::new_v4();
        let mut app = EffectApplicator::new();
        let mut eff = effect(EffectKind::GrantedPower, Some(id), 1.0);
        eff.data = Some("fire_resistance".to_string());
        app.add(eff);
        assert_eq!(app.granted_powers(0, id), vec!["fire_resistance"]);
    }
}
