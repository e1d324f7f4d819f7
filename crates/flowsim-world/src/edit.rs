//! Transactional edit engine.
//!
//! Clients send edits as loosely-typed JSON objects tagged by `op`. Each
//! object is parsed into an [`EditOp`] and applied to a scratch copy of the
//! world; the copy replaces the live world only if every operation
//! succeeds. The first failure aborts the batch.

use flowsim_types::{Cell, DEFAULT_NODE_TYPE, Node, NodeState, Params, Pipe, PipeState};
use serde_json::{Map, Value};

use crate::error::{BatchError, EditError};
use crate::grid::Grid;
use crate::material::MaterialTable;
use crate::world::World;

/// One parsed edit operation.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    /// Overwrite a grid cell's material, and optionally its depth.
    SetPixel {
        /// Row.
        r: i64,
        /// Column.
        c: i64,
        /// New material label.
        material: String,
        /// New depth; `None` keeps the current one.
        depth: Option<f64>,
    },
    /// Set a grid cell to full depth.
    Fill {
        /// Row.
        r: i64,
        /// Column.
        c: i64,
    },
    /// Set a grid cell to zero depth.
    Drain {
        /// Row.
        r: i64,
        /// Column.
        c: i64,
    },
    /// Insert a network node.
    AddNode {
        /// New id.
        id: String,
        /// Type tag.
        kind: String,
        /// Initial parameters.
        params: Params,
    },
    /// Insert a network pipe.
    AddPipe {
        /// New id.
        id: String,
        /// First endpoint.
        a: String,
        /// Second endpoint.
        b: String,
        /// Initial parameters.
        params: Params,
    },
    /// Set one parameter on a node or pipe.
    SetParam {
        /// Target id.
        id: String,
        /// Parameter name.
        key: String,
        /// New value.
        value: Value,
    },
    /// Remove a node or pipe.
    Delete {
        /// Target id.
        id: String,
    },
}

impl EditOp {
    /// Wire name of this operation.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetPixel { .. } => "set_pixel",
            Self::Fill { .. } => "fill",
            Self::Drain { .. } => "drain",
            Self::AddNode { .. } => "add_node",
            Self::AddPipe { .. } => "add_pipe",
            Self::SetParam { .. } => "set_param",
            Self::Delete { .. } => "del",
        }
    }

    /// Parse one edit object.
    ///
    /// # Errors
    ///
    /// Returns [`EditError::BadRequest`] for anything structurally wrong:
    /// a non-object edit, an unknown `op`, or a field of the wrong type.
    pub fn parse(raw: &Value) -> Result<Self, EditError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| EditError::bad_request("Edit must be an object"))?;
        let op = obj
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| EditError::bad_request("Edit is missing op"))?;

        match op {
            "set_pixel" => Ok(Self::SetPixel {
                r: coordinate(obj, "r")?,
                c: coordinate(obj, "c")?,
                material: string(obj, "material")?,
                depth: optional_number(obj, "depth")?,
            }),
            "fill" => Ok(Self::Fill {
                r: coordinate(obj, "r")?,
                c: coordinate(obj, "c")?,
            }),
            "drain" => Ok(Self::Drain {
                r: coordinate(obj, "r")?,
                c: coordinate(obj, "c")?,
            }),
            "add_node" => Ok(Self::AddNode {
                id: string(obj, "id")?,
                kind: optional_string(obj, "type")?
                    .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_owned()),
                params: params(obj)?,
            }),
            "add_pipe" => Ok(Self::AddPipe {
                id: string(obj, "id")?,
                a: string(obj, "a")?,
                b: string(obj, "b")?,
                params: params(obj)?,
            }),
            "set_param" => Ok(Self::SetParam {
                id: string(obj, "id")?,
                key: string(obj, "key")?,
                value: obj.get("value").cloned().unwrap_or(Value::Null),
            }),
            "del" => Ok(Self::Delete {
                id: string(obj, "id")?,
            }),
            other => Err(EditError::bad_request(format!("Unknown op: {other}"))),
        }
    }

    /// Apply this operation to `world`.
    ///
    /// On error `world` may be partially modified; callers that need
    /// atomicity apply to a scratch copy, as [`apply_batch`] does.
    ///
    /// # Errors
    ///
    /// Returns the [`EditError`] describing why the operation was rejected.
    pub fn apply(self, world: &mut World, materials: &MaterialTable) -> Result<(), EditError> {
        match (self, world) {
            (
                Self::SetPixel {
                    r,
                    c,
                    material,
                    depth,
                },
                World::Grid(grid),
            ) => {
                let cell = cell_at(grid, r, c)?;
                if !materials.contains(&material) {
                    return Err(EditError::InvalidMaterial(material));
                }
                cell.depth = if materials.is_solid(&material) {
                    0.0
                } else {
                    depth.map_or(cell.depth, clamp_depth)
                };
                cell.material = material;
                Ok(())
            }
            (Self::Fill { r, c }, World::Grid(grid)) => {
                set_depth(cell_at(grid, r, c)?, 1.0, materials);
                Ok(())
            }
            (Self::Drain { r, c }, World::Grid(grid)) => {
                set_depth(cell_at(grid, r, c)?, 0.0, materials);
                Ok(())
            }
            (Self::AddNode { id, kind, params }, World::Network(network)) => {
                network.add_node(Node {
                    id,
                    kind,
                    params,
                    state: NodeState::default(),
                })
            }
            (Self::AddPipe { id, a, b, params }, World::Network(network)) => {
                network.add_pipe(Pipe {
                    id,
                    a,
                    b,
                    params,
                    state: PipeState::default(),
                })
            }
            (Self::SetParam { id, key, value }, World::Network(network)) => {
                network.set_param(&id, key, value)
            }
            (Self::Delete { id }, World::Network(network)) => network.remove(&id),
            (op, world) => Err(EditError::bad_request(format!(
                "{} is not supported on a {} world",
                op.name(),
                world.variant()
            ))),
        }
    }
}

/// Apply a batch of raw edits all-or-nothing.
///
/// Returns the number of operations applied.
///
/// # Errors
///
/// Returns a [`BatchError`] naming the first failing operation. `world` is
/// left exactly as it was.
pub fn apply_batch(
    world: &mut World,
    edits: &[Value],
    materials: &MaterialTable,
) -> Result<usize, BatchError> {
    let mut scratch = world.clone();
    for (index, raw) in edits.iter().enumerate() {
        EditOp::parse(raw)
            .and_then(|op| op.apply(&mut scratch, materials))
            .map_err(|error| BatchError { index, error })?;
    }
    *world = scratch;
    Ok(edits.len())
}

/// Clamp a depth into `[0, 1]`.
pub fn clamp_depth(depth: f64) -> f64 {
    depth.clamp(0.0, 1.0)
}

fn cell_at(grid: &mut Grid, r: i64, c: i64) -> Result<&mut Cell, EditError> {
    let (rows, cols) = (grid.rows(), grid.cols());
    let out_of_bounds = || EditError::IndexOutOfBounds { r, c, rows, cols };
    let (Ok(row), Ok(col)) = (usize::try_from(r), usize::try_from(c)) else {
        return Err(out_of_bounds());
    };
    grid.get_mut(row, col).ok_or_else(out_of_bounds)
}

fn set_depth(cell: &mut Cell, depth: f64, materials: &MaterialTable) {
    cell.depth = if materials.is_solid(&cell.material) {
        0.0
    } else {
        depth
    };
}

fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

fn string(obj: &Map<String, Value>, key: &str) -> Result<String, EditError> {
    optional_string(obj, key)?
        .ok_or_else(|| EditError::bad_request(format!("{key} must be a string")))
}

fn optional_string(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, EditError> {
    present(obj, key)
        .map(|v| {
            v.as_str()
                .map(str::to_owned)
                .ok_or_else(|| EditError::bad_request(format!("{key} must be a string")))
        })
        .transpose()
}

fn optional_number(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>, EditError> {
    present(obj, key)
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| EditError::bad_request(format!("{key} must be a number")))
        })
        .transpose()
}

// Integers too large for i64 are still integers; they land out of bounds.
fn coordinate(obj: &Map<String, Value>, key: &str) -> Result<i64, EditError> {
    let number = present(obj, key).and_then(Value::as_number);
    number
        .and_then(|n| n.as_i64().or_else(|| n.as_u64().map(|_| i64::MAX)))
        .ok_or_else(|| EditError::bad_request(format!("{key} must be an integer")))
}

fn params(obj: &Map<String, Value>) -> Result<Params, EditError> {
    match present(obj, "params") {
        None => Ok(Params::new()),
        Some(Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()),
        Some(_) => Err(EditError::bad_request("params must be an object")),
    }
}
