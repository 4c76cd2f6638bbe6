//! Tectonic plates on the cube-sphere.
//!
//! Plates are value records: a position/velocity pair on the unit sphere
//! plus the set of cells they own. Cell ownership is a spherical Voronoi
//! assignment rebuilt only on explicit reassignment; the boundary cache is
//! derived from ownership and is invalidated by reassignment, never by
//! plate advance.

use super::heightmap::{cross, dot, normalize, CubeCoord, CubeSphereMap};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone)]
pub struct Plate {
    pub pos: [f64; 3],
    /// Unit tangent direction of motion.
    pub vel: [f64; 3],
    /// Meters per year.
    pub speed: f64,
    pub age_my: f64,
    pub centroid: [f64; 3],
    pub cell_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Convergent,
    Divergent,
    Transform,
}

#[derive(Debug, Clone, Copy)]
pub struct BoundaryCell {
    pub coord: CubeCoord,
    pub cell: usize,
    pub plate: u8,
    pub neighbor: u8,
    pub kind: BoundaryKind,
}

#[derive(Debug, Default)]
pub struct BoundaryCache {
    pub cells: Vec<BoundaryCell>,
}

pub struct PlateField {
    pub plates: Vec<Plate>,
    /// Cell index -> owning plate.
    owner: Vec<u8>,
    boundary: Option<BoundaryCache>,
}

/// Relative speeds below this read as shear rather than opening/closing.
const TRANSFORM_EPSILON: f64 = 0.005;

impl PlateField {
    pub fn generate(count: usize, map: &CubeSphereMap, rng: &mut ChaCha8Rng) -> Self {
        let mut plates = Vec::with_capacity(count);
        for _ in 0..count {
            let pos = random_unit(rng);
            let vel = random_tangent(pos, rng);
            plates.push(Plate {
                pos,
                vel,
                speed: rng.gen_range(0.02..0.12),
                age_my: rng.gen_range(0.0..200.0),
                centroid: pos,
                cell_count: 0,
            });
        }
        let mut field = Self {
            plates,
            owner: vec![0; map.cell_count()],
            boundary: None,
        };
        field.reassign_regions(map);
        field
    }

    pub fn owner_of(&self, cell: usize) -> u8 {
        self.owner[cell]
    }

    pub fn plate_count(&self) -> usize {
        self.plates.len()
    }

    /// 0 = one plate holds everything, 1 = ownership fully dispersed.
    pub fn fragmentation(&self) -> f32 {
        let total: usize = self.plates.iter().map(|p| p.cell_count).sum();
        if total == 0 {
            return 0.0;
        }
        let largest = self.plates.iter().map(|p| p.cell_count).max().unwrap_or(0);
        1.0 - largest as f32 / total as f32
    }

    /// Rotates every plate about its own axis (pos x vel) by the
    /// great-circle angle its speed covers in `years`. Ages the plates.
    /// The boundary cache stays valid: ownership has not changed.
    pub fn advance(&mut self, years: f64, radius_m: f64) {
        for plate in &mut self.plates {
            let theta = plate.speed * years / radius_m;
            let axis = normalize(cross(plate.pos, plate.vel));
            plate.pos = rotate(plate.pos, axis, theta);
            plate.vel = normalize(rotate(plate.vel, axis, theta));
            plate.age_my += years / 1.0e6;
        }
    }

    /// Recomputes the Voronoi ownership from current plate positions and
    /// invalidates the boundary cache.
    pub fn reassign_regions(&mut self, map: &CubeSphereMap) {
        for plate in &mut self.plates {
            plate.cell_count = 0;
        }
        for idx in 0..map.cell_count() {
            let dir = map.dir_of(map.coord_of(idx));
            let mut best = 0u8;
            let mut best_dot = f64::MIN;
            for (i, plate) in self.plates.iter().enumerate() {
                let d = dot(dir, plate.pos);
                if d > best_dot {
                    best_dot = d;
                    best = i as u8;
                }
            }
            self.owner[idx] = best;
            self.plates[best as usize].cell_count += 1;
        }
        self.recompute_centroids(map);
        self.boundary = None;
    }

    pub fn recompute_centroids(&mut self, map: &CubeSphereMap) {
        let mut sums = vec![[0.0f64; 3]; self.plates.len()];
        for idx in 0..map.cell_count() {
            let dir = map.dir_of(map.coord_of(idx));
            let s = &mut sums[self.owner[idx] as usize];
            s[0] += dir[0];
            s[1] += dir[1];
            s[2] += dir[2];
        }
        for (plate, sum) in self.plates.iter_mut().zip(sums) {
            if sum[0] != 0.0 || sum[1] != 0.0 || sum[2] != 0.0 {
                plate.centroid = normalize(sum);
            }
        }
    }

    /// Builds the boundary cache if it is stale.
    pub fn ensure_boundary(&mut self, map: &CubeSphereMap) {
        if self.boundary.is_some() {
            return;
        }
        let mut cells = Vec::new();
        for idx in 0..map.cell_count() {
            let coord = map.coord_of(idx);
            let plate = self.owner[idx];
            for nb in map.neighbors(coord) {
                let n_idx = map.index_of(nb);
                let neighbor = self.owner[n_idx];
                if neighbor != plate {
                    cells.push(BoundaryCell {
                        coord,
                        cell: idx,
                        plate,
                        neighbor,
                        kind: self.classify(plate, neighbor),
                    });
                    break;
                }
            }
        }
        self.boundary = Some(BoundaryCache { cells });
    }

    pub fn boundary_cells(&self) -> &[BoundaryCell] {
        self.boundary.as_ref().map_or(&[], |b| &b.cells)
    }

    pub fn has_boundary_cache(&self) -> bool {
        self.boundary.is_some()
    }

    fn classify(&self, a: u8, b: u8) -> BoundaryKind {
        let pa = &self.plates[a as usize];
        let pb = &self.plates[b as usize];
        // Direction from a toward b along the surface.
        let sep = normalize([
            pb.pos[0] - pa.pos[0],
            pb.pos[1] - pa.pos[1],
            pb.pos[2] - pa.pos[2],
        ]);
        let va = [
            pa.vel[0] * pa.speed,
            pa.vel[1] * pa.speed,
            pa.vel[2] * pa.speed,
        ];
        let vb = [
            pb.vel[0] * pb.speed,
            pb.vel[1] * pb.speed,
            pb.vel[2] * pb.speed,
        ];
        let closing = dot([va[0] - vb[0], va[1] - vb[1], va[2] - vb[2]], sep);
        if closing > TRANSFORM_EPSILON {
            BoundaryKind::Convergent
        } else if closing < -TRANSFORM_EPSILON {
            BoundaryKind::Divergent
        } else {
            BoundaryKind::Transform
        }
    }
}

fn random_unit(rng: &mut ChaCha8Rng) -> [f64; 3] {
    loop {
        let v = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        let len2 = dot(v, v);
        if len2 > 1e-4 && len2 <= 1.0 {
            return normalize(v);
        }
    }
}

fn random_tangent(pos: [f64; 3], rng: &mut ChaCha8Rng) -> [f64; 3] {
    loop {
        let v = random_unit(rng);
        let radial = dot(v, pos);
        let t = [
            v[0] - radial * pos[0],
            v[1] - radial * pos[1],
            v[2] - radial * pos[2],
        ];
        if dot(t, t) > 1e-4 {
            return normalize(t);
        }
    }
}

/// Rodrigues rotation of `v` about unit `axis` by `theta`.
fn rotate(v: [f64; 3], axis: [f64; 3], theta: f64) -> [f64; 3] {
    let (sin, cos) = theta.sin_cos();
    let k_cross_v = cross(axis, v);
    let k_dot_v = dot(axis, v);
    [
        v[0] * cos + k_cross_v[0] * sin + axis[0] * k_dot_v * (1.0 - cos),
        v[1] * cos + k_cross_v[1] * sin + axis[1] * k_dot_v * (1.0 - cos),
        v[2] * cos + k_cross_v[2] * sin + axis[2] * k_dot_v * (1.0 - cos),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn setup() -> (CubeSphereMap, PlateField) {
        let map = CubeSphereMap::generate(16, 64, 32, 9);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let field = PlateField::generate(7, &map, &mut rng);
        (map, field)
    }

    #[test]
    fn test_every_cell_owned_and_counts_consistent() {
        let (map, field) = setup();
        let total: usize = field.plates.iter().map(|p| p.cell_count).sum();
        assert_eq!(total, map.cell_count());
        for idx in 0..map.cell_count() {
            assert!((field.owner_of(idx) as usize) < field.plate_count());
        }
    }

    #[test]
    fn test_advance_keeps_positions_on_sphere() {
        let (_map, mut field) = setup();
        let before: Vec<[f64; 3]> = field.plates.iter().map(|p| p.pos).collect();
        field.advance(10_000_000.0, 6_400_000.0);
        for (plate, old) in field.plates.iter().zip(before) {
            let len = dot(plate.pos, plate.pos).sqrt();
            assert!((len - 1.0).abs() < 1e-9, "position drifted off the sphere");
            let tangent_err = dot(plate.vel, plate.pos).abs();
            assert!(tangent_err < 1e-9, "velocity left the tangent plane");
            assert!(plate.pos != old, "plate did not move");
        }
    }

    #[test]
    fn test_advance_preserves_boundary_cache() {
        let (map, mut field) = setup();
        field.ensure_boundary(&map);
        assert!(field.has_boundary_cache());
        field.advance(1_000_000.0, 6_400_000.0);
        assert!(field.has_boundary_cache());
        // Explicit reassignment invalidates.
        field.reassign_regions(&map);
        assert!(!field.has_boundary_cache());
    }

    #[test]
    fn test_boundary_cells_sit_between_plates() {
        let (map, mut field) = setup();
        field.ensure_boundary(&map);
        let cells = field.boundary_cells();
        assert!(!cells.is_empty());
        for bc in cells {
            assert_eq!(field.owner_of(bc.cell), bc.plate);
            assert_ne!(bc.plate, bc.neighbor);
            let has_foreign_neighbor = map
                .neighbors(bc.coord)
                .iter()
                .any(|nb| field.owner_of(map.index_of(*nb)) == bc.neighbor);
            assert!(has_foreign_neighbor);
        }
    }

    #[test]
    fn test_fragmentation_bounds() {
        let (_map, field) = setup();
        let f = field.fragmentation();
        assert!((0.0..1.0).contains(&f));
    }
}
