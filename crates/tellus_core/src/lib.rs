//! Core simulation physics and decision systems: the planetary heat curve,
//! the geology engine, stochastic geological events, the climate driver,
//! the turning-point manager, and the effect applicator.

pub mod climate;
pub mod effects;
pub mod geo_events;
pub mod geology;
pub mod heat;
pub mod turning;

pub use climate::ClimateDriver;
pub use effects::EffectApplicator;
pub use geo_events::{EnvModifiers, GeoEvent, GeoEventKind, GeoEventManager};
pub use geology::{CatastropheKind, GeoStats, GeologyConfig, GeologyEngine, PhaseEvent};
pub use turning::{TurningConfig, TurningPointManager};
