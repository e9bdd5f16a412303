//! Collision index: minimum-separation checks
//!
//! Linear scan for ordinary wall sizes. Past `GRID_THRESHOLD` points a
//! uniform grid with cell size D answers the same question: any point closer
//! than D to a query lies in the query's cell or one of its eight neighbours.

use std::collections::HashMap;

use glam::Vec2;

use crate::consts::GRID_THRESHOLD;

#[derive(Debug, Clone)]
struct SeparationGrid {
    cell: f32,
    cells: HashMap<(i64, i64), Vec<usize>>,
}

impl SeparationGrid {
    fn new(cell: f32) -> Self {
        Self {
            cell,
            cells: HashMap::new(),
        }
    }

    fn key_for(&self, p: Vec2) -> (i64, i64) {
        (
            (p.x / self.cell).floor() as i64,
            (p.y / self.cell).floor() as i64,
        )
    }

    fn insert(&mut self, idx: usize, p: Vec2) {
        let key = self.key_for(p);
        self.cells.entry(key).or_default().push(idx);
    }

    fn candidates(&self, p: Vec2) -> impl Iterator<Item = usize> + '_ {
        let (cx, cy) = self.key_for(p);
        (-1..=1)
            .flat_map(move |dy| (-1..=1).map(move |dx| (cx + dx, cy + dy)))
            .filter_map(|key| self.cells.get(&key))
            .flatten()
            .copied()
    }
}

/// Answers "is this point at least D from every placed sticker?"
#[derive(Debug, Clone)]
pub struct CollisionIndex {
    min_separation: f32,
    points: Vec<Vec2>,
    /// Local placement not yet committed
    pending: Option<Vec2>,
    grid: Option<SeparationGrid>,
}

impl CollisionIndex {
    /// Index over `points`; switches to a grid for large sets
    pub fn new(min_separation: f32, points: impl IntoIterator<Item = Vec2>) -> Self {
        let points: Vec<Vec2> = points.into_iter().collect();
        let bucketed = points.len() > GRID_THRESHOLD;
        Self::build(min_separation, points, bucketed)
    }

    /// Index that always uses the grid
    pub fn bucketed(min_separation: f32, points: impl IntoIterator<Item = Vec2>) -> Self {
        Self::build(min_separation, points.into_iter().collect(), true)
    }

    fn build(min_separation: f32, points: Vec<Vec2>, bucketed: bool) -> Self {
        let grid = bucketed.then(|| {
            let mut grid = SeparationGrid::new(min_separation);
            for (i, p) in points.iter().enumerate() {
                grid.insert(i, *p);
            }
            grid
        });
        Self {
            min_separation,
            points,
            pending: None,
            grid,
        }
    }

    /// Also keep clear of a pending local placement
    pub fn with_pending(mut self, pending: Option<Vec2>) -> Self {
        self.pending = pending;
        self
    }

    pub fn insert(&mut self, p: Vec2) {
        let idx = self.points.len();
        self.points.push(p);
        if let Some(grid) = &mut self.grid {
            grid.insert(idx, p);
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True if any placed point, or the pending placement (unless it is the
    /// point under test), is strictly closer than D
    ///
    /// Exactly D apart is accepted.
    pub fn is_overlapping(&self, point: Vec2) -> bool {
        let limit_sq = self.min_separation * self.min_separation;
        let too_close = |p: Vec2| p.distance_squared(point) < limit_sq;

        if let Some(pending) = self.pending {
            if pending != point && too_close(pending) {
                return true;
            }
        }

        match &self.grid {
            Some(grid) => grid.candidates(point).any(|i| too_close(self.points[i])),
            None => self.points.iter().any(|p| too_close(*p)),
        }
    }
}
