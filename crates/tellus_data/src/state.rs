use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Version stamp written into every serialized world aggregate.
pub const SAVE_VERSION: u32 = 1;

/// Length of the per-species gene vector.
pub const GENE_COUNT: usize = 200;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Species {
    pub id: Uuid,
    pub ancestor_id: Option<Uuid>,
    pub origin_year: i64,
    pub genes: Vec<f32>,
    pub active_genes: Vec<usize>,
    pub extinct: bool,
    pub extinct_year: Option<i64>,
}

impl Species {
    pub fn ancestral(id: Uuid, origin_year: i64) -> Self {
        Self {
            id,
            ancestor_id: None,
            origin_year,
            genes: vec![0.0; GENE_COUNT],
            active_genes: Vec::new(),
            extinct: false,
            extinct_year: None,
        }
    }
}

/// Population of one species in one region.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Population {
    pub species_id: Uuid,
    pub region_id: u32,
    pub count: u64,
    pub juveniles: u64,
    /// Species id -> last year this population encountered it.
    pub last_contact: BTreeMap<Uuid, i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathogenKind {
    Virus,
    Bacteria,
    Fungus,
    Prion,
    Parasite,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathogenStatus {
    Transient,
    Endemic,
    Dormant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Pathogen {
    pub id: Uuid,
    pub kind: PathogenKind,
    pub virulence: f32,
    pub transmissibility: f32,
    pub hosts: Vec<Uuid>,
    pub status: PathogenStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TectonicSnapshot {
    /// 0 = single supercontinent, 1 = fully fragmented.
    pub fragmentation: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ClimateSnapshot {
    pub global_temperature: f32,
    pub oxygen: f32,
    pub co2: f32,
}

/// The versioned world aggregate serialized by the checkpoint manager.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub version: u32,
    pub world_id: Uuid,
    pub year: i64,
    pub species: Vec<Species>,
    pub populations: Vec<Population>,
    pub pathogens: Vec<Pathogen>,
    pub tectonics: Option<TectonicSnapshot>,
    pub climate: Option<ClimateSnapshot>,
}

impl SimulationState {
    pub fn new(world_id: Uuid) -> Self {
        Self {
            version: SAVE_VERSION,
            world_id,
            year: 0,
            species: Vec::new(),
            populations: Vec::new(),
            pathogens: Vec::new(),
            tectonics: None,
            climate: None,
        }
    }

    /// Living (non-extinct) species count.
    pub fn species_count(&self) -> usize {
        self.species.iter().filter(|s| !s.extinct).count()
    }

    pub fn population_sum(&self) -> u64 {
        self.populations.iter().map(|p| p.count).sum()
    }

    pub fn extinctions_since(&self, year: i64) -> usize {
        self.species
            .iter()
            .filter(|s| s.extinct && s.extinct_year.map_or(false, |y| y >= year))
            .count()
    }
}
