use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TurningTrigger {
    Interval,
    Extinction,
    Sapience,
    ClimateShift,
    TectonicEvent,
    Pandemic,
    MagicEvent,
    PlayerRequest,
    Milestone,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    None,
    Nudge,
    Direct,
    Cataclysm,
    Magic,
    Protection,
    Accelerate,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Species,
    Biome,
    Region,
    World,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    TraitBoost,
    MutationRate,
    PopulationBoost,
    Temperature,
    ExtinctionImmunity,
    GrantedPower,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InterventionEffect {
    pub kind: EffectKind,
    pub magnitude: f64,
    /// Years; 0 means permanent.
    pub duration: i64,
    pub data: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Intervention {
    pub id: Uuid,
    pub name: String,
    pub kind: InterventionKind,
    pub cost: u32,
    /// Years before this intervention can be offered again.
    pub cooldown: i64,
    pub target: TargetKind,
    pub effects: Vec<InterventionEffect>,
    pub risk: RiskLevel,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurningPointSummary {
    pub total_species: u32,
    pub recent_extinctions: u32,
    pub newly_sapient: u32,
}

/// A scheduler-pausing event awaiting an operator choice.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TurningPoint {
    pub id: Uuid,
    pub world_id: Uuid,
    pub year: i64,
    pub trigger: TurningTrigger,
    pub title: String,
    pub description: String,
    pub summary: TurningPointSummary,
    pub interventions: Vec<Intervention>,
    pub resolved: bool,
    pub chosen: Option<Uuid>,
    pub resolved_year: Option<i64>,
}

/// A world- or target-scoped modifier produced by a resolved intervention.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActiveEffect {
    pub id: Uuid,
    pub kind: EffectKind,
    pub target: TargetKind,
    pub target_id: Option<Uuid>,
    pub magnitude: f64,
    pub start_year: i64,
    /// Years; 0 means the effect never expires.
    pub duration: i64,
    pub data: Option<String>,
}

impl ActiveEffect {
    pub fn expired(&self, year: i64) -> bool {
        self.duration > 0 && year >= self.start_year + self.duration
    }
}

/// Player input over the turning-point wire format: a decimal option index
/// 0..=3, or 4 to request a regenerated menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerChoice {
    Option(usize),
    Regenerate,
}

impl PlayerChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().parse::<usize>().ok()? {
            n @ 0..=3 => Some(PlayerChoice::Option(n)),
            4 => Some(PlayerChoice::Regenerate),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_expiry() {
        let mut eff = ActiveEffect {
            id: Uuid::new_v4(),
            kind: EffectKind::TraitBoost,
            target: TargetKind::Species,
            target_id: Some(Uuid::new_v4()),
            magnitude: 1.5,
            start_year: 1000,
            duration: 500,
            data: None,
        };
        assert!(!eff.expired(1499));
        assert!(eff.expired(1500));

        eff.duration = 0;
        assert!(!eff.expired(i64::MAX));
    }

    #[test]
    fn test_player_choice_parse() {
        assert_eq!(PlayerChoice::parse("2"), Some(PlayerChoice::Option(2)));
        assert_eq!(PlayerChoice::parse(" 4 "), Some(PlayerChoice::Regenerate));
        assert_eq!(PlayerChoice::parse("5"), None);
        assert_eq!(PlayerChoice::parse("abc"), None);
    }
}
