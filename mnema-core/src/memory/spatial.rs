//! Uniform-grid spatial index over episodic records.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Position, RecordId};

/// Grid cell coordinate.
pub type Cell = (i32, i32);

/// Uniform grid mapping cells to the records perceived inside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<Cell, Vec<(RecordId, Position)>>,
}

impl SpatialGrid {
    /// Create an empty grid. Non-positive cell sizes fall back to 1.0.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            cells: HashMap::new(),
        }
    }

    /// Cell containing `position`.
    #[must_use]
    pub fn cell_of(&self, position: &Position) -> Cell {
        (
            (position.x / self.cell_size).floor() as i32,
            (position.y / self.cell_size).floor() as i32,
        )
    }

    /// Index a record.
    pub fn insert(&mut self, id: RecordId, position: Position) {
        let cell = self.cell_of(&position);
        self.cells.entry(cell).or_default().push((id, position));
    }

    /// Drop a record from the index. Returns whether it was present.
    pub fn remove(&mut self, id: RecordId, position: &Position) -> bool {
        let cell = self.cell_of(position);
        let Some(bucket) = self.cells.get_mut(&cell) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|(rid, _)| *rid != id);
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            self.cells.remove(&cell);
        }
        removed
    }

    /// Records within `radius` of `center`.
    #[must_use]
    pub fn query(&self, center: &Position, radius: f32) -> Vec<RecordId> {
        let (cx, cy) = self.cell_of(center);
        let reach = (radius / self.cell_size).ceil() as i32;
        let mut found = Vec::new();
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                if let Some(bucket) = self.cells.get(&(cx + dx, cy + dy)) {
                    found.extend(
                        bucket
                            .iter()
                            .filter(|(_, p)| p.distance(center) <= radius)
                            .map(|(id, _)| *id),
                    );
                }
            }
        }
        found
    }

    /// Number of indexed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    /// Whether the grid holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_crosses_cell_boundaries() {
        let mut grid = SpatialGrid::new(10.0);
        let a = RecordId::new();
        let b = RecordId::new();
        grid.insert(a, Position::new(9.5, 9.5));
        grid.insert(b, Position::new(40.0, 40.0));
        let hits = grid.query(&Position::new(10.5, 10.5), 2.0);
        assert_eq!(hits, vec![a]);
    }

    #[test]
    fn remove_empties_cell() {
        let mut grid = SpatialGrid::new(10.0);
        let a = RecordId::new();
        let p = Position::new(3.0, 4.0);
        grid.insert(a, p);
        assert!(grid.remove(a, &p));
        assert!(grid.is_empty());
        assert!(!grid.remove(a, &p));
    }

    #[test]
    fn negative_coordinates_use_floor_cells() {
        let grid = SpatialGrid::new(10.0);
        assert_eq!(grid.cell_of(&Position::new(-0.5, 5.0)), (-1, 0));
    }
}
