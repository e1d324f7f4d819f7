//! World entities: grid cells and flow-network nodes and pipes.
//!
//! These are the shapes that appear on the wire inside snapshots and level
//! files. The authoritative storage lives in `flowsim-world`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Node type assigned when `add_node` omits one.
pub const DEFAULT_NODE_TYPE: &str = "junction";

/// Free-form parameter bag attached to nodes and pipes.
pub type Params = BTreeMap<String, Value>;

/// One grid cell: a material label plus a fill level in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Cell {
    /// Material label drawn from the configured material table.
    pub material: String,
    /// Fill level, always within `[0, 1]`.
    pub depth: f64,
}

impl Cell {
    /// Create a cell with the given material and depth.
    pub fn new(material: impl Into<String>, depth: f64) -> Self {
        Self {
            material: material.into(),
            depth,
        }
    }
}

/// Solver-owned fields of a node. Clients cannot write these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NodeState {
    /// Pressure head.
    pub p: f64,
}

/// Solver-owned fields of a pipe. Clients cannot write these.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PipeState {
    /// Volumetric flow.
    pub q: f64,
    /// Flow direction: `1` from `a` to `b`, `-1` reversed, `0` idle.
    pub dir: i8,
}

/// A typed vertex in the flow network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Node {
    /// Client-chosen id, unique across nodes and pipes.
    pub id: String,
    /// Open type tag, e.g. `junction` or `reservoir`.
    #[serde(rename = "type", default = "default_node_type")]
    pub kind: String,
    /// Client-writable parameters.
    #[serde(default)]
    pub params: Params,
    /// Derived state.
    #[serde(default)]
    pub state: NodeState,
}

/// A typed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Pipe {
    /// Client-chosen id, unique across nodes and pipes.
    pub id: String,
    /// Id of the first endpoint node.
    pub a: String,
    /// Id of the second endpoint node.
    pub b: String,
    /// Client-writable parameters.
    #[serde(default)]
    pub params: Params,
    /// Derived state.
    #[serde(default)]
    pub state: PipeState,
}

fn default_node_type() -> String {
    DEFAULT_NODE_TYPE.to_owned()
}
