//! Shared data types for the tellus simulation: the persisted world
//! aggregate, the event taxonomy, turning-point/intervention records, and
//! the broadcast message envelope.

pub mod events;
pub mod message;
pub mod state;
pub mod turning;

pub use events::{EventType, SimEvent, Verbosity};
pub use message::{GameMessage, HexCoord, MessageKind};
pub use state::{
    ClimateSnapshot, Pathogen, PathogenKind, PathogenStatus, Population, SimulationState, Species,
    TectonicSnapshot, GENE_COUNT, SAVE_VERSION,
};
pub use turning::{
    ActiveEffect, EffectKind, Intervention, InterventionEffect, InterventionKind, PlayerChoice,
    RiskLevel, TargetKind, TurningPoint, TurningPointSummary, TurningTrigger,
};
