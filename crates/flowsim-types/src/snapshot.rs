//! Immutable, fully materialized views of the world.
//!
//! A [`WorldSnapshot`] owns every value it carries, so it can be handed to
//! the broadcast path while the tick loop keeps mutating the live world.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::entities::{Cell, Node, Pipe};

/// Row-major grid contents as sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct GridView {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Physical scale of one cell, carried through from the level file.
    pub cm_per_pixel: f64,
    /// `rows` lists of `cols` cells, top row first.
    pub cells: Vec<Vec<Cell>>,
}

/// World contents, in whichever variant the server runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorldView {
    /// Grid deployments.
    Grid {
        /// The grid contents.
        grid: GridView,
    },
    /// Flow-network deployments. Both lists are ordered by id.
    Network {
        /// All nodes.
        nodes: Vec<Node>,
        /// All pipes.
        pipes: Vec<Pipe>,
    },
}

/// Per-snapshot diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SnapshotMeta {
    /// Wall time spent in the most recent simulation step, in milliseconds.
    pub solve_ms: f64,
}

/// A consistent copy of the world at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Tick counter at the moment the snapshot was taken.
    pub tick: u64,
    /// World contents.
    #[serde(flatten)]
    pub world: WorldView,
    /// Diagnostics.
    pub meta: SnapshotMeta,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn grid_snapshot_flattens_world() {
        let snapshot = WorldSnapshot {
            tick: 3,
            world: WorldView::Grid {
                grid: GridView {
                    rows: 1,
                    cols: 1,
                    cm_per_pixel: 1.0,
                    cells: vec![vec![Cell::new("space", 0.5)]],
                },
            },
            meta: SnapshotMeta::default(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["tick"], 3);
        assert_eq!(json["grid"]["cells"][0][0]["material"], "space");
        assert!(json.get("world").is_none());
        assert!(json["meta"].get("solve_ms").is_some());
    }

    #[test]
    fn network_snapshot_lists_nodes_and_pipes() {
        let snapshot = WorldSnapshot {
            tick: 0,
            world: WorldView::Network {
                nodes: Vec::new(),
                pipes: Vec::new(),
            },
            meta: SnapshotMeta::default(),
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["nodes"].is_array());
        assert!(json["pipes"].is_array());
        assert!(json.get("grid").is_none());
    }
}
