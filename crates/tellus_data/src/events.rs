use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of simulation event tags. The string forms are stable and
/// shared with the event store and broadcast payloads.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Speciation,
    Extinction,
    MassExtinction,
    DiseaseOutbreak,
    Migration,
    TurningPoint,
    BiomeShift,
    Tectonic,
    Climate,
    SapienceDetected,
    Checkpoint,
    YearTick,
    ExtinctionCascade,
    PhylogenyUpdate,
    KeystoneEffect,
    RegionIsolation,
    EndemicEvolution,
    ZoonoticJump,
    ProtoSapience,
    SapienceAchieved,
    Intervention,
    AdaptiveRadiation,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Speciation => "speciation",
            EventType::Extinction => "extinction",
            EventType::MassExtinction => "mass_extinction",
            EventType::DiseaseOutbreak => "disease_outbreak",
            EventType::Migration => "migration",
            EventType::TurningPoint => "turning_point",
            EventType::BiomeShift => "biome_shift",
            EventType::Tectonic => "tectonic",
            EventType::Climate => "climate",
            EventType::SapienceDetected => "sapience_detected",
            EventType::Checkpoint => "checkpoint",
            EventType::YearTick => "year_tick",
            EventType::ExtinctionCascade => "extinction_cascade",
            EventType::PhylogenyUpdate => "phylogeny_update",
            EventType::KeystoneEffect => "keystone_effect",
            EventType::RegionIsolation => "region_isolation",
            EventType::EndemicEvolution => "endemic_evolution",
            EventType::ZoonoticJump => "zoonotic_jump",
            EventType::ProtoSapience => "proto_sapience",
            EventType::SapienceAchieved => "sapience_achieved",
            EventType::Intervention => "intervention",
            EventType::AdaptiveRadiation => "adaptive_radiation",
        }
    }

    /// Default verbosity each tag is logged at.
    pub fn level(&self) -> Verbosity {
        match self {
            EventType::YearTick => Verbosity::Trace,
            EventType::Migration | EventType::PhylogenyUpdate | EventType::BiomeShift => {
                Verbosity::Debug
            }
            EventType::MassExtinction
            | EventType::ExtinctionCascade
            | EventType::DiseaseOutbreak => Verbosity::Warn,
            _ => Verbosity::Info,
        }
    }
}

/// Log verbosity gate. `should_log(l)` passes when `l >= configured`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// One structured simulation event record.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SimEvent {
    pub id: Uuid,
    pub world_id: Uuid,
    pub year: i64,
    pub event_type: EventType,
    pub severity: f32,
    pub details: serde_json::Value,
    pub timestamp: String,
}

impl SimEvent {
    pub fn new(
        world_id: Uuid,
        year: i64,
        event_type: EventType,
        severity: f32,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            world_id,
            year,
            event_type,
            severity: severity.clamp(0.0, 1.0),
            details,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
