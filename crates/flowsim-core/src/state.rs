//! The shared, lock-guarded world the tick loop and sessions operate on.
//!
//! Ticks and edit batches take the write lock; snapshots and exports take
//! the read lock. Neither ever interleaves with a mutation.

use std::sync::Arc;
use std::time::Instant;

use flowsim_types::{SnapshotMeta, WorldSnapshot};
use flowsim_world::{BatchError, LevelExport, MaterialTable, World, apply_batch, flow_step};
use serde_json::Value;
use tokio::sync::RwLock;

/// World plus the bookkeeping that travels with it.
#[derive(Debug, Clone)]
pub struct WorldState {
    world: World,
    materials: MaterialTable,
    tick: u64,
    solve_ms: f64,
}

/// Handle shared across tasks.
pub type SharedWorld = Arc<RwLock<WorldState>>;

impl WorldState {
    /// Wrap a world at tick zero.
    pub const fn new(world: World, materials: MaterialTable) -> Self {
        Self {
            world,
            materials,
            tick: 0,
            solve_ms: 0.0,
        }
    }

    /// Move into a [`SharedWorld`].
    pub fn into_shared(self) -> SharedWorld {
        Arc::new(RwLock::new(self))
    }

    /// The world model.
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// The configured material table.
    pub const fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    /// Ticks completed so far.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Run one simulation step and return the new tick number.
    ///
    /// Grid worlds run the flow rule. Network worlds have no flow rule and
    /// only advance the counter.
    pub fn advance(&mut self) -> u64 {
        let started = Instant::now();
        if let World::Grid(grid) = &mut self.world {
            flow_step(grid, &self.materials);
        }
        self.solve_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.tick = self.tick.saturating_add(1);
        self.tick
    }

    /// Apply an edit batch all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns the [`BatchError`] of the first failing operation; the world
    /// is unchanged.
    pub fn apply_edits(&mut self, edits: &[Value]) -> Result<usize, BatchError> {
        apply_batch(&mut self.world, edits, &self.materials)
    }

    /// A detached copy of the current world.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            world: self.world.view(),
            meta: SnapshotMeta {
                solve_ms: self.solve_ms,
            },
        }
    }

    /// A level document for the current world.
    pub fn export(&self, meta: Value) -> LevelExport {
        flowsim_world::export_level(&self.world, self.tick, meta)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::unreachable)]
mod tests {
    use flowsim_types::{Cell, WorldView};
    use flowsim_world::{Grid, Network};
    use serde_json::json;

    use super::*;

    fn column() -> WorldState {
        let cells = vec![Cell::new("space", 1.0), Cell::new("space", 0.0)];
        let grid = Grid::from_cells(2, 1, 1.0, cells).unwrap();
        WorldState::new(World::Grid(grid), MaterialTable::default())
    }

    #[test]
    fn advance_runs_flow_and_counts() {
        let mut state = column();
        assert_eq!(state.advance(), 1);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.tick, 1);
        let WorldView::Grid { grid } = snapshot.world else {
            unreachable!("grid world");
        };
        assert!(grid.cells[0][0].depth.abs() < f64::EPSILON);
        assert!((grid.cells[1][0].depth - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn network_tick_leaves_graph_alone() {
        let mut state = WorldState::new(World::Network(Network::new()), MaterialTable::default());
        state
            .apply_edits(&[json!({"op": "add_node", "id": "n1"})])
            .unwrap();
        let before = state.world().clone();
        state.advance();
        assert_eq!(state.world(), &before);
        assert_eq!(state.tick(), 1);
    }

    #[test]
    fn failed_edit_keeps_snapshot() {
        let mut state = column();
        let before = state.snapshot();
        let err = state
            .apply_edits(&[
                json!({"op": "drain", "r": 0, "c": 0}),
                json!({"op": "fill", "r": 5, "c": 0}),
            ])
            .unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn export_carries_tick_and_meta() {
        let mut state = column();
        state.advance();
        let json = serde_json::to_value(state.export(json!({"note": "hi"}))).unwrap();
        assert_eq!(json["tick"], 1);
        assert_eq!(json["meta"]["note"], "hi");
        assert_eq!(json["rows"], 2);
    }
}
