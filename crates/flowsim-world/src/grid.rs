//! Rectangular cell grid with fixed dimensions.
//!
//! Cells are stored row-major in one flat vector. Dimensions are set when
//! the grid is built and never change afterwards, so every coordinate
//! lookup is a range check plus one multiply.

use flowsim_types::{Cell, GridView};

use crate::error::LevelError;

/// Scale used when a level does not state one.
pub const DEFAULT_CM_PER_PIXEL: f64 = 1.0;

/// A `rows` x `cols` grid of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cm_per_pixel: f64,
    cells: Vec<Cell>,
}

impl Grid {
    /// Build a grid with every cell a copy of `fill`.
    pub fn filled(rows: usize, cols: usize, cm_per_pixel: f64, fill: &Cell) -> Self {
        let len = rows.saturating_mul(cols);
        Self {
            rows,
            cols,
            cm_per_pixel,
            cells: vec![fill.clone(); len],
        }
    }

    /// Build a grid from row-major cells.
    ///
    /// # Errors
    ///
    /// Returns [`LevelError::Invalid`] if `cells.len() != rows * cols`.
    pub fn from_cells(
        rows: usize,
        cols: usize,
        cm_per_pixel: f64,
        cells: Vec<Cell>,
    ) -> Result<Self, LevelError> {
        if rows.checked_mul(cols) != Some(cells.len()) {
            return Err(LevelError::Invalid(format!(
                "{} cells cannot fill a {rows}x{cols} grid",
                cells.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            cm_per_pixel,
            cells,
        })
    }

    /// Number of rows.
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Physical scale of one cell.
    pub const fn cm_per_pixel(&self) -> f64 {
        self.cm_per_pixel
    }

    /// Whether the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Flat index of `(r, c)`, or `None` when out of range.
    pub fn index(&self, r: usize, c: usize) -> Option<usize> {
        if r >= self.rows || c >= self.cols {
            return None;
        }
        r.checked_mul(self.cols)?.checked_add(c)
    }

    /// The cell at `(r, c)`.
    pub fn get(&self, r: usize, c: usize) -> Option<&Cell> {
        self.index(r, c).and_then(|i| self.cells.get(i))
    }

    /// Mutable access to the cell at `(r, c)`.
    pub fn get_mut(&mut self, r: usize, c: usize) -> Option<&mut Cell> {
        self.index(r, c).and_then(|i| self.cells.get_mut(i))
    }

    /// All cells, row-major.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// All cells, row-major, mutably.
    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// Materialize the grid as nested rows.
    pub fn view(&self) -> GridView {
        let cells = if self.cols == 0 {
            vec![Vec::new(); self.rows]
        } else {
            self.cells.chunks(self.cols).map(<[Cell]>::to_vec).collect()
        };
        GridView {
            rows: self.rows,
            cols: self.cols,
            cm_per_pixel: self.cm_per_pixel,
            cells,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn grid_2x3() -> Grid {
        Grid::filled(2, 3, DEFAULT_CM_PER_PIXEL, &Cell::new("space", 0.0))
    }

    #[test]
    fn index_is_row_major() {
        let grid = grid_2x3();
        assert_eq!(grid.index(0, 0), Some(0));
        assert_eq!(grid.index(1, 2), Some(5));
        assert_eq!(grid.index(2, 0), None);
        assert_eq!(grid.index(0, 3), None);
    }

    #[test]
    fn view_splits_rows() {
        let mut grid = grid_2x3();
        grid.get_mut(1, 0).unwrap().material = "stone".to_owned();
        let view = grid.view();
        assert_eq!(view.cells.len(), 2);
        assert_eq!(view.cells[1].len(), 3);
        assert_eq!(view.cells[1][0].material, "stone");
        assert_eq!(view.cells[0][0].material, "space");
    }

    #[test]
    fn view_is_detached_from_storage() {
        let mut grid = grid_2x3();
        let view = grid.view();
        grid.get_mut(0, 0).unwrap().depth = 1.0;
        assert!(view.cells[0][0].depth.abs() < f64::EPSILON);
    }

    #[test]
    fn from_cells_checks_length() {
        let cells = vec![Cell::new("space", 0.0); 5];
        assert!(Grid::from_cells(2, 3, 1.0, cells).is_err());
    }

    #[test]
    fn zero_width_grid_keeps_row_count() {
        let grid = Grid::filled(3, 0, 1.0, &Cell::new("space", 0.0));
        assert!(grid.is_empty());
        assert_eq!(grid.view().cells.len(), 3);
    }
}
