//! Spatial index of light-emitting voxels used for emitter sampling.

use std::collections::HashMap;

use rand::{Rng, RngCore};

/// Point sample of an emitter: a voxel center and the cube it jitters within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmitterPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
}

impl EmitterPosition {
    /// Emitter filling the unit voxel at integer coordinates.
    pub fn voxel(x: i32, y: i32, z: i32) -> Self {
        Self { x: x as f64 + 0.5, y: y as f64 + 0.5, z: z as f64 + 0.5, radius: 1.0 }
    }
}

/// Lookup of emitters relevant to a point in octree space.
pub trait EmitterIndex: Send + Sync {
    /// Every emitter associated with the cell containing the point.
    fn emitter_positions(&self, x: i32, y: i32, z: i32) -> &[EmitterPosition];

    /// One emitter of the cell, chosen uniformly.
    fn sample_emitter_position(&self, x: i32, y: i32, z: i32, rng: &mut dyn RngCore) -> Option<EmitterPosition> {
        let positions = self.emitter_positions(x, y, z);
        if positions.is_empty() {
            return None;
        }
        Some(positions[rng.gen_range(0..positions.len())])
    }
}

/// Uniform grid; each emitter is registered in its own cell and the 26 around it,
/// so a query sees every emitter within roughly one cell.
#[derive(Debug, Clone)]
pub struct EmitterGrid {
    cell_size: i32,
    cells: HashMap<(i32, i32, i32), Vec<EmitterPosition>>,
    count: usize,
}

impl EmitterGrid {
    pub fn new(cell_size: i32) -> Self {
        Self { cell_size: cell_size.max(1), cells: HashMap::new(), count: 0 }
    }

    #[inline]
    fn cell_of(&self, x: i32, y: i32, z: i32) -> (i32, i32, i32) {
        (x.div_euclid(self.cell_size), y.div_euclid(self.cell_size), z.div_euclid(self.cell_size))
    }

    pub fn insert(&mut self, pos: EmitterPosition) {
        let (cx, cy, cz) = self.cell_of(pos.x.floor() as i32, pos.y.floor() as i32, pos.z.floor() as i32);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    self.cells.entry((cx + dx, cy + dy, cz + dz)).or_default().push(pos);
                }
            }
        }
        self.count += 1;
    }

    /// Number of distinct emitters inserted.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl EmitterIndex for EmitterGrid {
    fn emitter_positions(&self, x: i32, y: i32, z: i32) -> &[EmitterPosition] {
        self.cells.get(&self.cell_of(x, y, z)).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_neighbouring_cells_see_emitter() {
        let mut grid = EmitterGrid::new(8);
        grid.insert(EmitterPosition::voxel(4, 4, 4));
        assert_eq!(grid.emitter_positions(4, 4, 4).len(), 1);
        assert_eq!(grid.emitter_positions(12, 4, -3).len(), 1);
        assert!(grid.emitter_positions(20, 4, 4).is_empty());
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_sample_from_empty_cell() {
        let grid = EmitterGrid::new(8);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(grid.sample_emitter_position(0, 0, 0, &mut rng).is_none());
    }

    #[test]
    fn test_sample_picks_cell_member() {
        let mut grid = EmitterGrid::new(4);
        grid.insert(EmitterPosition::voxel(1, 1, 1));
        grid.insert(EmitterPosition::voxel(2, 1, 1));
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let p = grid.sample_emitter_position(1, 1, 1, &mut rng).unwrap();
            assert!(p.x == 1.5 || p.x == 2.5);
        }
    }
}
