// occupancy.rs — Spatial grid enforcing a minimum distance between points.
//
// The image is split into square cells whose side equals the separation
// radius, so any point closer than the radius to (x, y) lives in the 3×3
// block of cells around (x, y). Checking a candidate costs a handful of
// distance tests instead of a scan over every accepted point.
//
// Used twice per replenishment:
//   - inside the corner detector, to keep its own output spread out
//   - by the replenisher, to reject new corners that sit on a surviving track

/// Grid of accepted points, bucketed by cell.
#[derive(Debug, Clone)]
pub struct SeparationGrid {
    cells: Vec<Vec<(f32, f32)>>,
    cols: usize,
    rows: usize,
    cell_size: f32,
    min_dist_sq: f32,
}

impl SeparationGrid {
    /// Grid over a `width`×`height` image with separation radius `min_distance`.
    ///
    /// A radius of zero disables the separation check: every point is accepted.
    pub fn new(width: usize, height: usize, min_distance: f32) -> Self {
        let cell_size = min_distance.max(1.0);
        let cols = ((width as f32 / cell_size).ceil() as usize).max(1);
        let rows = ((height as f32 / cell_size).ceil() as usize).max(1);
        SeparationGrid {
            cells: vec![Vec::new(); cols * rows],
            cols,
            rows,
            cell_size,
            min_dist_sq: min_distance * min_distance,
        }
    }

    /// True when no accepted point lies strictly within the radius of (x, y).
    pub fn is_clear(&self, x: f32, y: f32) -> bool {
        let (col, row) = self.cell_of(x, y);
        let c0 = col.saturating_sub(1);
        let r0 = row.saturating_sub(1);
        let c1 = (col + 1).min(self.cols - 1);
        let r1 = (row + 1).min(self.rows - 1);

        for r in r0..=r1 {
            for c in c0..=c1 {
                for &(px, py) in &self.cells[r * self.cols + c] {
                    let dx = px - x;
                    let dy = py - y;
                    if dx * dx + dy * dy < self.min_dist_sq {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Record a point regardless of its neighbours.
    pub fn insert(&mut self, x: f32, y: f32) {
        let (col, row) = self.cell_of(x, y);
        self.cells[row * self.cols + col].push((x, y));
    }

    /// Insert (x, y) only if it keeps the separation. Returns whether it was inserted.
    pub fn try_insert(&mut self, x: f32, y: f32) -> bool {
        if self.is_clear(x, y) {
            self.insert(x, y);
            true
        } else {
            false
        }
    }

    /// Number of accepted points.
    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }

    /// Cell coordinates, clamped so out-of-image points land in border cells.
    fn cell_of(&self, x: f32, y: f32) -> (usize, usize) {
        let col = ((x / self.cell_size).max(0.0) as usize).min(self.cols - 1);
        let row = ((y / self.cell_size).max(0.0) as usize).min(self.rows - 1);
        (col, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_close_points() {
        let mut grid = SeparationGrid::new(100, 100, 7.0);
        assert!(grid.try_insert(50.0, 50.0));
        assert!(!grid.try_insert(55.0, 50.0));
        assert!(!grid.try_insert(50.0, 44.5));
        assert!(grid.try_insert(57.5, 50.0));
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_neighbour_cells_are_checked() {
        // 6.9 and 7.1 sit in different cells but only 0.2 px apart.
        let mut grid = SeparationGrid::new(100, 100, 7.0);
        assert!(grid.try_insert(6.9, 6.9));
        assert!(!grid.is_clear(7.1, 7.1));
    }

    #[test]
    fn test_zero_radius_accepts_distinct_points() {
        let mut grid = SeparationGrid::new(10, 10, 0.0);
        assert!(grid.try_insert(1.0, 1.0));
        assert!(grid.try_insert(1.0, 1.0001));
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn test_out_of_image_points_clamp_to_border_cells() {
        let mut grid = SeparationGrid::new(20, 20, 5.0);
        grid.insert(-1.0, 25.0);
        assert!(!grid.is_clear(0.0, 22.0));
        assert!(!grid.is_empty());
    }
}
