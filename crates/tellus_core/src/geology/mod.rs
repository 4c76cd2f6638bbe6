//! The geology engine: variable-time-step advancement of terrain,
//! tectonics, oceans, and biomes across deep time.
//!
//! Work is scheduled through six accumulators, one per stage. Each
//! `simulate_geology` call banks the elapsed years, then drains whole
//! stage intervals up to a per-call iteration cap. Stage intervals scale
//! with the planetary heat regime so a newborn molten world takes coarse
//! tectonic steps and skips surface processes entirely.

pub mod erosion;
pub mod heightmap;
pub mod plates;

use crate::geo_events::{GeoEvent, GeoEventKind};
use crate::heat::heat;
use erosion::{
    add_volcano, carve_crater, deposit_sediment, flood_basalt, hydraulic_erosion,
    regenerate_rivers, thermal_erosion,
};
use heightmap::{CubeCoord, CubeSphereMap};
use plates::{BoundaryKind, PlateField};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const EROSION_INTERVAL: f64 = 1.0e5;
const DEPOSIT_INTERVAL: f64 = 1.0e5;
const RIVER_INTERVAL: f64 = 1.0e7;
const MAINTENANCE_INTERVAL: f64 = 1.0e5;
const GENERAL_INTERVAL: f64 = 1.0e7;

/// Accumulators cap at this many stage intervals so a heat-regime
/// threshold crossing cannot trigger a catastrophic catch-up.
const ACCUMULATOR_CAP: f64 = 10.0;

const MAX_TECTONIC_ITERS: usize = 5;
const MAX_EROSION_ITERS: usize = 10;

/// Peaks above this subside during maintenance.
const PEAK_SUBSIDENCE_FLOOR: f32 = 8_000.0;

/// Fraction of surface temperature over 90 C per 20 C of excess that is
/// held as vapor.
const VAPOR_ONSET_C: f64 = 90.0;
const VAPOR_SPAN_C: f64 = 20.0;

/// Sea-level drop when the hydrosphere is fully vaporized.
const VAPOR_SEA_DROP_M: f64 = 4_000.0;

/// Sea-level homeostasis rate per year.
const SEA_LEVEL_RATE: f64 = 1.0e-6;

#[derive(Debug, Clone)]
pub struct GeologyConfig {
    pub face_resolution: usize,
    pub flat_width: usize,
    pub flat_height: usize,
    pub circumference_m: f64,
    pub sea_level_baseline: f64,
    /// Elevation change cap per boundary cell per standard tectonic step.
    pub max_uplift_per_step: f64,
}

impl Default for GeologyConfig {
    fn default() -> Self {
        Self {
            face_resolution: 48,
            flat_width: 192,
            flat_height: 96,
            circumference_m: 40_000_000.0,
            sea_level_baseline: 0.0,
            max_uplift_per_step: f64::INFINITY,
        }
    }
}

/// Phase transitions surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Vaporized-water fraction fell below one half: the skies open.
    GreatDeluge,
}

/// Terrain-affecting catastrophes an operator can trigger directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatastropheKind {
    VolcanicWinter,
    AsteroidImpact,
    IceAge,
    FloodBasalt,
    ContinentalDrift,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    Ocean,
    IceSheet,
    Tundra,
    Boreal,
    Temperate,
    Tropical,
    Desert,
    Volcanic,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct GeoStats {
    pub initialized: bool,
    pub age_years: f64,
    pub heat: f64,
    pub min_elevation: f32,
    pub max_elevation: f32,
    pub mean_elevation: f32,
    pub sea_level: f64,
    pub land_fraction: f32,
    pub plate_count: usize,
    pub fragmentation: f32,
    pub tectonic_steps: u64,
    pub erosion_steps: u64,
    pub volcano_count: u64,
    pub cave_count: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulators {
    tectonic: f64,
    erosion: f64,
    deposit: f64,
    river: f64,
    maintenance: f64,
    general: f64,
}

pub struct GeologyEngine {
    config: GeologyConfig,
    seed: u64,
    initialized: bool,
    age_years: f64,
    acc: Accumulators,
    map: CubeSphereMap,
    plates: PlateField,
    rng: ChaCha8Rng,
    hotspots: Vec<[f64; 3]>,
    magma_pressure: f64,
    biomes: Vec<Biome>,
    /// Mean latitudinal/elevation temperature with no offsets applied.
    avg_base_temp: f64,
    temp_shift: f64,
    sea_level: f64,
    sea_target: f64,
    vapor_prev: f64,
    tectonic_steps: u64,
    erosion_steps: u64,
    volcano_count: u64,
    cave_count: u64,
}

impl GeologyEngine {
    pub fn new(config: GeologyConfig, seed: u64) -> Self {
        let map = CubeSphereMap::generate(1, 1, 1, 0);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let plates = PlateField::generate(1, &map, &mut rng);
        Self {
            seed,
            initialized: false,
            age_years: 0.0,
            acc: Accumulators::default(),
            map,
            plates,
            rng,
            hotspots: Vec::new(),
            magma_pressure: 0.0,
            biomes: Vec::new(),
            avg_base_temp: 15.0,
            temp_shift: 0.0,
            sea_level: config.sea_level_baseline,
            sea_target: config.sea_level_baseline,
            vapor_prev: 0.0,
            tectonic_steps: 0,
            erosion_steps: 0,
            volcano_count: 0,
            cave_count: 0,
            config,
        }
    }

    /// Generates terrain, plates, and hotspots. Must be called before the
    /// simulation operations do anything.
    pub fn initialize(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.map = CubeSphereMap::generate(
            self.config.face_resolution,
            self.config.flat_width,
            self.config.flat_height,
            self.seed,
        );
        let plate_count = self.rng.gen_range(6..=9);
        self.plates = PlateField::generate(plate_count, &self.map, &mut self.rng);
        let mut hotspots = Vec::with_capacity(4);
        for _ in 0..4 {
            let c = self.random_coord();
            hotspots.push(self.map.dir_of(c));
        }
        self.hotspots = hotspots;
        self.sea_level = self.config.sea_level_baseline;
        self.sea_target = self.config.sea_level_baseline;
        self.vapor_prev = 0.0;
        self.age_years = 0.0;
        self.initialized = true;
        info!(
            plates = plate_count,
            cells = self.map.cell_count(),
            "geology initialized"
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn radius_m(&self) -> f64 {
        self.config.circumference_m / std::f64::consts::TAU
    }

    fn random_coord(&mut self) -> CubeCoord {
        let idx = self.rng.gen_range(0..self.map.cell_count());
        self.map.coord_of(idx)
    }

    fn tectonic_interval(h: f64) -> f64 {
        if h > 4.0 {
            1.0e7
        } else if h > 1.5 {
            2.0e6
        } else {
            1.0e5
        }
    }

    // ------------------------------------------------------------------
    // Main advancement
    // ------------------------------------------------------------------

    /// Advances the engine by `dt` years. Returns a phase event when one
    /// occurs. A no-op returning `None` on an uninitialized engine.
    pub fn simulate_geology(&mut self, dt: f64, global_temp_mod: f64) -> Option<PhaseEvent> {
        if !self.initialized || dt <= 0.0 {
            return None;
        }
        self.age_years += dt;
        let h = heat(self.age_years as i64);

        // Tectonic work scales with internal heat; surface stages bank
        // plain years.
        self.acc.tectonic += dt * h;
        self.acc.erosion += dt;
        self.acc.deposit += dt;
        self.acc.river += dt;
        self.acc.maintenance += dt;
        self.acc.general += dt;

        let tect_interval = Self::tectonic_interval(h);
        self.acc.tectonic = self.acc.tectonic.min(ACCUMULATOR_CAP * tect_interval);
        self.acc.erosion = self.acc.erosion.min(ACCUMULATOR_CAP * EROSION_INTERVAL);
        self.acc.deposit = self.acc.deposit.min(ACCUMULATOR_CAP * DEPOSIT_INTERVAL);
        self.acc.river = self.acc.river.min(ACCUMULATOR_CAP * RIVER_INTERVAL);
        self.acc.maintenance = self
            .acc
            .maintenance
            .min(ACCUMULATOR_CAP * MAINTENANCE_INTERVAL);
        self.acc.general = self.acc.general.min(ACCUMULATOR_CAP * GENERAL_INTERVAL);

        let mut iters = 0;
        while self.acc.tectonic >= tect_interval && iters < MAX_TECTONIC_ITERS {
            self.tectonic_step(tect_interval);
            self.acc.tectonic -= tect_interval;
            iters += 1;
        }

        // Molten crust: no surface water, nothing to erode.
        if h <= 4.0 {
            let mut iters = 0;
            while self.acc.erosion >= EROSION_INTERVAL && iters < MAX_EROSION_ITERS {
                self.erosion_step();
                self.acc.erosion -= EROSION_INTERVAL;
                iters += 1;
            }
        }

        let mut iters = 0;
        while self.acc.deposit >= DEPOSIT_INTERVAL && iters < 10 {
            let sea = self.sea_level as f32;
            deposit_sediment(&mut self.map, &mut self.rng, sea);
            self.acc.deposit -= DEPOSIT_INTERVAL;
            iters += 1;
        }

        if h <= 4.0 {
            let mut iters = 0;
            while self.acc.river >= RIVER_INTERVAL && iters < 2 {
                self.river_step();
                self.acc.river -= RIVER_INTERVAL;
                iters += 1;
            }
        }

        let mut iters = 0;
        while self.acc.general >= GENERAL_INTERVAL && iters < 2 {
            self.general_step(h);
            self.acc.general -= GENERAL_INTERVAL;
            iters += 1;
        }

        let mut iters = 0;
        while self.acc.maintenance >= MAINTENANCE_INTERVAL && iters < 10 {
            self.maintenance_step(MAINTENANCE_INTERVAL);
            self.acc.maintenance -= MAINTENANCE_INTERVAL;
            iters += 1;
        }

        let phase = self.update_ocean_phase(dt, global_temp_mod, h);

        if self.map.is_dirty() {
            self.map.flush();
        }
        phase
    }

    fn tectonic_step(&mut self, interval: f64) {
        self.plates.advance(interval, self.radius_m());
        self.plates.recompute_centroids(&self.map);
        self.boundary_uplift(interval / 1.0e5, self.config.max_uplift_per_step);
        self.tectonic_steps += 1;
    }

    /// Moves every boundary cell 10% of the way toward its pair
    /// equilibrium, scaled by the step interval and capped at `max_delta`.
    fn boundary_uplift(&mut self, scale: f64, max_delta: f64) {
        self.plates.ensure_boundary(&self.map);
        let factor = (0.1 * scale).min(1.0) as f32;
        let cap = max_delta as f32;
        for i in 0..self.plates.boundary_cells().len() {
            let bc = self.plates.boundary_cells()[i];
            let pa = &self.plates.plates[bc.plate as usize];
            let pb = &self.plates.plates[bc.neighbor as usize];
            let avg_age = (pa.age_my + pb.age_my) * 0.5;
            let target = match bc.kind {
                BoundaryKind::Convergent => 4_500.0 + 25.0 * avg_age.min(100.0),
                BoundaryKind::Divergent => -3_000.0 - 10.0 * avg_age.min(50.0),
                BoundaryKind::Transform => 500.0,
            } as f32;
            let e = self.map.get_idx(bc.cell);
            let delta = ((target - e) * factor).clamp(-cap, cap);
            self.map.set_idx(bc.cell, e + delta);
        }
    }

    fn erosion_step(&mut self) {
        let sea = self.sea_level as f32;
        thermal_erosion(&mut self.map, 4);
        hydraulic_erosion(&mut self.map, &mut self.rng, 1_500, sea);
        self.erosion_steps += 1;
    }

    fn river_step(&mut self) {
        // Plates have moved an appreciable arc by river cadence; refresh
        // ownership before carving drainage off the new relief.
        self.plates.reassign_regions(&self.map);
        let sea = self.sea_level as f32;
        regenerate_rivers(&mut self.map, &mut self.rng, sea, 24);
    }

    fn general_step(&mut self, h: f64) {
        // Hotspot volcanism shares the molten-crust skip with erosion.
        if h <= 4.0 {
            for i in 0..self.hotspots.len() {
                let coord = self.map.coord_of_dir(self.hotspots[i]);
                add_volcano(&mut self.map, coord, 120.0, 2);
            }
        }
        self.magma_pressure += self.rng.gen_range(0.0..1.0);
        if self.magma_pressure > 3.0 {
            let coord = self.random_coord();
            let height = self.rng.gen_range(800.0..2_000.0);
            add_volcano(&mut self.map, coord, height, 3);
            self.volcano_count += 1;
            self.magma_pressure = 0.0;
        }
        // Karst development in carbonate shelves.
        let coord = self.random_coord();
        if self.map.get(coord) > self.sea_level as f32 {
            self.map.raise(coord, -5.0);
            self.cave_count += 1;
        }
    }

    fn maintenance_step(&mut self, interval: f64) {
        let rate = (1.0e-8 * interval) as f32;
        for idx in 0..self.map.cell_count() {
            let e = self.map.get_idx(idx);
            if e > PEAK_SUBSIDENCE_FLOOR {
                self.map.set_idx(idx, e - (e - PEAK_SUBSIDENCE_FLOOR) * rate);
            }
        }
        self.map.clamp_all();
    }

    fn update_ocean_phase(&mut self, dt: f64, global_temp_mod: f64, h: f64) -> Option<PhaseEvent> {
        let surface_temp = self.avg_base_temp + global_temp_mod + self.temp_shift + 11.0 * (h - 1.0);
        let vapor = ((surface_temp - VAPOR_ONSET_C) / VAPOR_SPAN_C).clamp(0.0, 1.0);
        self.sea_target = self.config.sea_level_baseline - vapor * VAPOR_SEA_DROP_M;

        let rate = (SEA_LEVEL_RATE * dt).min(1.0);
        self.sea_level += (self.sea_target - self.sea_level) * rate;

        let phase = if vapor < 0.5 && self.vapor_prev >= 0.5 {
            info!(age = self.age_years, surface_temp, "great deluge: oceans condense");
            Some(PhaseEvent::GreatDeluge)
        } else {
            None
        };
        self.vapor_prev = vapor;
        phase
    }

    // ------------------------------------------------------------------
    // External forcing
    // ------------------------------------------------------------------

    /// Applies the terrain component of a geological event. Severity
    /// determines magnitude deterministically; placement draws on the
    /// engine RNG.
    pub fn apply_event(&mut self, event: &GeoEvent) {
        if !self.initialized {
            return;
        }
        let sev = event.severity;
        debug!(kind = ?event.kind, severity = sev, "applying geological event to terrain");
        match event.kind {
            GeoEventKind::VolcanicWinter => {
                let volcanoes = 1 + (3.0 * sev) as usize;
                for _ in 0..volcanoes {
                    let coord = self.random_coord();
                    let height = (1_500.0 + 2_000.0 * sev) as f32;
                    add_volcano(&mut self.map, coord, height, 2);
                    self.volcano_count += 1;
                }
            }
            GeoEventKind::AsteroidImpact => {
                let coord = self.random_coord();
                let radius = 4 + (8.0 * sev) as u32;
                let depth = (3_000.0 + 5_000.0 * sev) as f32;
                carve_crater(&mut self.map, coord, radius, depth);
            }
            GeoEventKind::IceAge => {
                self.sea_level -= 50.0 + 70.0 * sev;
                if self.map.is_dirty() {
                    self.map.flush();
                }
                let min = self.map.min_elevation();
                let max = self.map.max_elevation();
                let threshold = min + 0.6 * (max - min);
                for idx in 0..self.map.cell_count() {
                    let e = self.map.get_idx(idx);
                    if e > threshold {
                        self.map.set_idx(idx, e - (e - threshold) * 0.1 * sev as f32);
                    }
                }
            }
            GeoEventKind::FloodBasalt => {
                let coord = self.random_coord();
                let radius = 6 + (6.0 * sev) as u32;
                flood_basalt(&mut self.map, coord, radius, (800.0 + 1_200.0 * sev) as f32);
            }
            GeoEventKind::ContinentalDrift => {
                let extra_years = 50_000.0 + 100_000.0 * sev;
                self.plates.advance(extra_years, self.radius_m());
                self.plates.recompute_centroids(&self.map);
                self.boundary_uplift(1.0, 100.0 * sev);
            }
            GeoEventKind::OceanAnoxia
            | GeoEventKind::GreenhouseSpike
            | GeoEventKind::Warming => {}
        }
    }

    /// Operator-triggered plate collision at a flat-grid location.
    pub fn trigger_tectonic_collision(&mut self, x: usize, y: usize, magnitude: f64) {
        if !self.initialized {
            return;
        }
        let coord = self.map.coord_of_dir(self.map.flat_dir(x, y));
        let height = (500.0 + 2_500.0 * magnitude.clamp(0.0, 1.0)) as f32;
        add_volcano(&mut self.map, coord, height, 3);
        self.tectonic_steps += 1;
    }

    pub fn trigger_catastrophe(&mut self, kind: CatastropheKind, magnitude: f64) {
        let geo_kind = match kind {
            CatastropheKind::VolcanicWinter => GeoEventKind::VolcanicWinter,
            CatastropheKind::AsteroidImpact => GeoEventKind::AsteroidImpact,
            CatastropheKind::IceAge => GeoEventKind::IceAge,
            CatastropheKind::FloodBasalt => GeoEventKind::FloodBasalt,
            CatastropheKind::ContinentalDrift => GeoEventKind::ContinentalDrift,
        };
        let event = GeoEvent {
            kind: geo_kind,
            start_tick: self.age_years as i64,
            duration: 0,
            severity: magnitude.clamp(0.0, 1.0),
            delta_t: 0.0,
            sunlight: 1.0,
            oxygen: 1.0,
        };
        self.apply_event(&event);
    }

    /// Persistent surface-temperature offset (degrees C).
    pub fn shift_temperature(&mut self, delta: f64) {
        self.temp_shift += delta;
    }

    // ------------------------------------------------------------------
    // Biomes and queries
    // ------------------------------------------------------------------

    /// Reclassifies the flat grid into biomes from latitude, elevation,
    /// sea level, and the temperature offsets in force.
    pub fn update_biomes(&mut self, global_temp_mod: f64) {
        if !self.initialized {
            return;
        }
        if self.map.is_dirty() {
            self.map.flush();
        }
        let h = heat(self.age_years as i64);
        let geothermal = 11.0 * (h - 1.0);
        let (w, height) = self.map.flat_size();
        let sea = self.sea_level as f32;
        let mut biomes = Vec::with_capacity(w * height);
        let mut base_sum = 0.0f64;
        for y in 0..height {
            let lat = self.map.flat_lat(y);
            let lat_temp = 32.0 * lat.cos() - 8.0;
            for x in 0..w {
                let e = self.map.flat_get(x, y);
                let lapse = 6.5 * f64::from((e - sea).max(0.0)) / 1_000.0;
                let base = lat_temp - lapse;
                base_sum += base;
                let t = base + global_temp_mod + self.temp_shift + geothermal;
                biomes.push(classify_biome(t, e, sea, h));
            }
        }
        self.avg_base_temp = base_sum / (w * height) as f64;
        self.biomes = biomes;
    }

    pub fn biomes(&self) -> &[Biome] {
        &self.biomes
    }

    pub fn sea_level(&self) -> f64 {
        self.sea_level
    }

    pub fn fragmentation(&self) -> f32 {
        self.plates.fragmentation()
    }

    pub fn heightmap(&self) -> &CubeSphereMap {
        &self.map
    }

    pub fn get_stats(&mut self) -> GeoStats {
        if self.map.is_dirty() {
            self.map.flush();
        }
        let sea = self.sea_level as f32;
        let land = (0..self.map.cell_count())
            .filter(|&i| self.map.get_idx(i) > sea)
            .count();
        GeoStats {
            initialized: self.initialized,
            age_years: self.age_years,
            heat: heat(self.age_years as i64),
            min_elevation: self.map.min_elevation(),
            max_elevation: self.map.max_elevation(),
            mean_elevation: self.map.mean_elevation(),
            sea_level: self.sea_level,
            land_fraction: land as f32 / self.map.cell_count() as f32,
            plate_count: self.plates.plate_count(),
            fragmentation: self.plates.fragmentation(),
            tectonic_steps: self.tectonic_steps,
            erosion_steps: self.erosion_steps,
            volcano_count: self.volcano_count,
            cave_count: self.cave_count,
        }
    }
}

fn classify_biome(t: f64, elevation: f32, sea_level: f32, h: f64) -> Biome {
    if h > 4.0 {
        return Biome::Volcanic;
    }
    if elevation <= sea_level {
        return if t < -5.0 { Biome::IceSheet } else { Biome::Ocean };
    }
    if t < -5.0 {
        Biome::IceSheet
    } else if t < 3.0 {
        Biome::Tundra
    } else if t < 10.0 {
        Biome::Boreal
    } else if t < 22.0 {
        Biome::Temperate
    } else if t < 32.0 {
        Biome::Tropical
    } else {
        Biome::Desert
    }
}
