//! Checkpoint serialization: gzip-compressed JSON snapshots of the world
//! aggregate, full every `full_freq` years and delta otherwise.

use crate::error::{IoError, Result};
use crate::store::StoreHandle;
use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tellus_data::{SimulationState, SAVE_VERSION};
use tracing::info;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    Full,
    Delta,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Checkpoint {
    pub id: Uuid,
    pub world_id: Uuid,
    pub year: i64,
    pub kind: CheckpointKind,
    pub payload: Vec<u8>,
    pub species_count: u32,
    pub population_sum: u64,
    pub created_at: String,
}

pub struct CheckpointManager {
    full_freq: i64,
    last_full_year: Option<i64>,
    store: Option<StoreHandle>,
}

impl CheckpointManager {
    pub fn new(full_freq: i64, store: Option<StoreHandle>) -> Self {
        Self {
            full_freq: full_freq.max(1),
            last_full_year: None,
            store,
        }
    }

    /// Serializes and compresses the state. Tags the checkpoint `full`
    /// when `full_freq` years have passed since the last full one (the
    /// first checkpoint is always full), queues the store write, and
    /// returns the record.
    pub fn create_checkpoint(&mut self, state: &SimulationState) -> Result<Checkpoint> {
        let json = serde_json::to_vec(state)?;
        let payload = compress(&json)?;

        let kind = match self.last_full_year {
            Some(last) if state.year - last < self.full_freq => CheckpointKind::Delta,
            _ => {
                self.last_full_year = Some(state.year);
                CheckpointKind::Full
            }
        };

        let checkpoint = Checkpoint {
            id: Uuid::new_v4(),
            world_id: state.world_id,
            year: state.year,
            kind,
            payload,
            species_count: state.species_count() as u32,
            population_sum: state.population_sum(),
            created_at: Utc::now().to_rfc3339(),
        };
        info!(
            year = state.year,
            kind = ?checkpoint.kind,
            bytes = checkpoint.payload.len(),
            hash = %payload_hash(&checkpoint.payload),
            "checkpoint created"
        );
        if let Some(store) = &self.store {
            store.save_checkpoint(checkpoint.clone());
        }
        Ok(checkpoint)
    }

    /// Inverts `create_checkpoint`: decompress, parse, version-check.
    pub fn restore_checkpoint(&self, checkpoint: &Checkpoint) -> Result<SimulationState> {
        let json = decompress(&checkpoint.payload)?;
        let state: SimulationState = serde_json::from_slice(&json)?;
        if state.version > SAVE_VERSION {
            return Err(IoError::Version {
                found: state.version,
                supported: SAVE_VERSION,
            });
        }
        Ok(state)
    }

    /// Loads the nearest stored checkpoint with year <= `year`.
    pub fn restore_to_year(&self, world_id: Uuid, year: i64) -> Result<SimulationState> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| IoError::store("no checkpoint store attached"))?;
        let rx = store
            .query_checkpoint_at_or_before(world_id, year)
            .ok_or_else(|| IoError::store("checkpoint store unavailable"))?;
        let checkpoint = rx
            .recv()
            .map_err(|_| IoError::store("checkpoint store worker gone"))?
            .ok_or_else(|| IoError::not_found(format!("checkpoint at or before year {year}")))?;
        self.restore_checkpoint(&checkpoint)
    }
}

/// Short content hash correlating checkpoint rows with log lines.
pub fn payload_hash(payload: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(&hasher.finalize()[..8])
}

/// Gzip-compresses a serialized payload.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| IoError::compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| IoError::compression(e.to_string()))
}

/// Inverse of [`compress`].
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| IoError::compression(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tellus_data::{
        ClimateSnapshot, Pathogen, PathogenKind, PathogenStatus, Population, Species,
        TectonicSnapshot, GENE_COUNT,
    };

    fn populated_state() -> SimulationState {
        let mut state = SimulationState::new(Uuid::new_v4());
        state.year = 1_234_567;
        let mut species = Species::ancestral(Uuid::new_v4(), 100);
        species.genes = (0..GENE_COUNT).map(|i| i as f32 * 0.25).collect();
        species.active_genes = vec![3, 17, 42];
        let species_id = species.id;
        state.species.push(species);

        let mut contact = BTreeMap::new();
        contact.insert(species_id, 900_000);
        state.populations.push(Population {
            species_id,
            region_id: 4,
            count: 120_000,
            juveniles: 9_000,
            last_contact: contact,
        });
        state.pathogens.push(Pathogen {
            id: Uuid::new_v4(),
            kind: PathogenKind::Prion,
            virulence: 0.7,
            transmissibility: 0.2,
            hosts: vec![species_id],
            status: PathogenStatus::Endemic,
        });
        state.tectonics = Some(TectonicSnapshot { fragmentation: 0.42 });
        state.climate = Some(ClimateSnapshot {
            global_temperature: 14.5,
            oxygen: 0.21,
            co2: 0.0004,
        });
        state
    }

    #[test]
    fn test_roundtrip_identity() {
        let mut manager = CheckpointManager::new(1_000_000, None);
        let state = populated_state();
        let cp = manager.create_checkpoint(&state).unwrap();
        let restored = manager.restore_checkpoint(&cp).unwrap();
        assert_eq!(state, restored);
    }

    #[test]
    fn test_full_delta_cadence() {
        let mut manager = CheckpointManager::new(1_000_000, None);
        let mut state = populated_state();

        state.year = 0;
        assert_eq!(
            manager.create_checkpoint(&state).unwrap().kind,
            CheckpointKind::Full
        );
        state.year = 400_000;
        assert_eq!(
            manager.create_checkpoint(&state).unwrap().kind,
            CheckpointKind::Delta
        );
        state.year = 999_999;
        assert_eq!(
            manager.create_checkpoint(&state).unwrap().kind,
            CheckpointKind::Delta
        );
        state.year = 1_000_000;
        assert_eq!(
            manager.create_checkpoint(&state).unwrap().kind,
            CheckpointKind::Full
        );
    }

    #[test]
    fn test_compression_shrinks_repetitive_payloads() {
        let repetitive = vec![7u8; 100_000];
        let packed = compress(&repetitive).unwrap();
        assert!(packed.len() < repetitive.len() / 10);
        assert_eq!(decompress(&packed).unwrap(), repetitive);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut manager = CheckpointManager::new(1_000_000, None);
        let mut state = populated_state();
        state.version = SAVE_VERSION + 1;
        let cp = manager.create_checkpoint(&state).unwrap();
        match manager.restore_checkpoint(&cp) {
            Err(IoError::Version { found, .. }) => assert_eq!(found, SAVE_VERSION + 1),
            other => panic!("expected version error, got {other:?}"),
        }
    }

    #[test]
    fn test_checkpoint_summary_counts() {
        let mut manager = CheckpointManager::new(1_000_000, None);
        let state = populated_state();
        let cp = manager.create_checkpoint(&state).unwrap();
        assert_eq!(cp.species_count, 1);
        assert_eq!(cp.population_sum, 120_000);
        assert_eq!(cp.world_id, state.world_id);
    }
}
