//! Discrete gravity flow over the grid.
//!
//! One step:
//!
//! 1. Pin sources full and drains empty.
//! 2. Scan bottom row to top. Every non-solid cell holding water moves
//!    `depth * flow_fraction` into the cell below, provided that cell exists
//!    and is not solid. Moves are computed from the pre-step depths and
//!    accumulated into a separate buffer, so water falls one row per step.
//!    The fraction belongs to the giving cell: a filter releases half of its
//!    own water each step, and anything falling into it arrives whole.
//! 3. Clamp every depth into `[0, 1]` and pin sources and drains again.
//!
//! Solid cells always end the step empty.

use crate::edit::clamp_depth;
use crate::grid::Grid;
use crate::material::MaterialTable;

/// Advance the grid by one tick.
pub fn flow_step(grid: &mut Grid, materials: &MaterialTable) {
    if grid.is_empty() {
        return;
    }
    apply_boundaries(grid, materials);

    let mut next: Vec<f64> = grid.cells().iter().map(|cell| cell.depth).collect();
    for r in (0..grid.rows()).rev() {
        for c in 0..grid.cols() {
            let (Some(here), Some(cell)) = (grid.index(r, c), grid.get(r, c)) else {
                continue;
            };
            if materials.is_solid(&cell.material) {
                if let Some(slot) = next.get_mut(here) {
                    *slot = 0.0;
                }
                continue;
            }
            if cell.depth <= 0.0 {
                continue;
            }
            let Some(below) = r.checked_add(1).and_then(|rb| grid.index(rb, c)) else {
                continue;
            };
            if grid
                .cells()
                .get(below)
                .is_none_or(|b| materials.is_solid(&b.material))
            {
                continue;
            }
            let transfer = cell.depth * materials.flow_fraction(&cell.material);
            if let Some(slot) = next.get_mut(here) {
                *slot -= transfer;
            }
            if let Some(slot) = next.get_mut(below) {
                *slot += transfer;
            }
        }
    }

    for (cell, depth) in grid.cells_mut().iter_mut().zip(next) {
        cell.depth = clamp_depth(depth);
    }
    apply_boundaries(grid, materials);
}

fn apply_boundaries(grid: &mut Grid, materials: &MaterialTable) {
    for cell in grid.cells_mut() {
        if materials.is_source(&cell.material) {
            cell.depth = 1.0;
        } else if materials.is_drain(&cell.material) {
            cell.depth = 0.0;
        }
    }
}
