//! Level files: JSON import and export of a whole world.
//!
//! Import is lenient about shape and strict about content. `grid` may be
//! either `{"cells": [[...]]}` or a bare list of rows, cells may omit
//! `material` or `depth`, ragged rows are padded, and unknown fields are
//! ignored. Unknown materials, dangling pipes, and duplicate ids are
//! rejected.
//!
//! Export writes the version header, the world contents, and a caller
//! supplied `meta` object. `import(export(w)) == w` for any world `w`.

use std::path::Path;

use flowsim_types::{
    Cell, Node, PROTOCOL_MAJOR, PROTOCOL_MINOR, Pipe, ProtocolVersion, SCHEMA_REV,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::edit::clamp_depth;
use crate::error::LevelError;
use crate::grid::{DEFAULT_CM_PER_PIXEL, Grid};
use crate::material::MaterialTable;
use crate::network::Network;
use crate::world::World;

/// A level document as read from disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LevelFile {
    /// Declared grid height; rows beyond the data are padded.
    #[serde(default)]
    pub rows: Option<usize>,
    /// Declared grid width; columns beyond the data are padded.
    #[serde(default)]
    pub cols: Option<usize>,
    /// Physical scale of one cell.
    #[serde(default)]
    pub cm_per_pixel: Option<f64>,
    /// Grid contents.
    #[serde(default)]
    pub grid: Option<LevelGrid>,
    /// Network nodes.
    #[serde(default)]
    pub nodes: Option<Vec<Node>>,
    /// Network pipes.
    #[serde(default)]
    pub pipes: Option<Vec<Pipe>>,
}

/// The two accepted spellings of grid contents.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LevelGrid {
    /// `[[...]]`
    Rows(Vec<Vec<LevelCell>>),
    /// `{"cells": [[...]]}`
    Wrapped {
        /// Rows of cells, top first.
        cells: Vec<Vec<LevelCell>>,
    },
}

impl LevelGrid {
    fn into_rows(self) -> Vec<Vec<LevelCell>> {
        match self {
            Self::Rows(cells) | Self::Wrapped { cells } => cells,
        }
    }
}

/// One cell as written in a level file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LevelCell {
    /// Material label; the configured default when absent.
    #[serde(default)]
    pub material: Option<String>,
    /// Fill level; zero when absent.
    #[serde(default)]
    pub depth: Option<f64>,
}

/// A level document as written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct LevelExport {
    /// Protocol version of the writer.
    pub version: ProtocolVersion,
    /// Snapshot schema revision of the writer.
    pub schema_rev: &'static str,
    /// Tick counter when the export was taken.
    pub tick: u64,
    /// World contents.
    #[serde(flatten)]
    pub content: LevelContent,
    /// Caller-supplied metadata.
    pub meta: Value,
}

/// World contents in level-file layout.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LevelContent {
    /// Grid worlds: dimensions at top level, `grid` as bare rows.
    Grid {
        /// Grid height.
        rows: usize,
        /// Grid width.
        cols: usize,
        /// Physical scale of one cell.
        cm_per_pixel: f64,
        /// Rows of cells, top first.
        grid: Vec<Vec<Cell>>,
    },
    /// Network worlds.
    Network {
        /// All nodes, ordered by id.
        nodes: Vec<Node>,
        /// All pipes, ordered by id.
        pipes: Vec<Pipe>,
    },
}

/// Build a level document for `world`.
pub fn export_level(world: &World, tick: u64, meta: Value) -> LevelExport {
    let content = match world {
        World::Grid(grid) => {
            let view = grid.view();
            LevelContent::Grid {
                rows: view.rows,
                cols: view.cols,
                cm_per_pixel: view.cm_per_pixel,
                grid: view.cells,
            }
        }
        World::Network(network) => {
            let (nodes, pipes) = network.view();
            LevelContent::Network { nodes, pipes }
        }
    };
    LevelExport {
        version: ProtocolVersion {
            major: PROTOCOL_MAJOR,
            minor: PROTOCOL_MINOR,
        },
        schema_rev: SCHEMA_REV,
        tick,
        content,
        meta,
    }
}

/// Build a world from a parsed level document.
///
/// A document with `grid` yields a grid world; one with only `nodes` or
/// `pipes` yields a network; one with neither yields a grid of the declared
/// dimensions (empty if none are declared).
///
/// # Errors
///
/// Returns [`LevelError::Invalid`] if the document names unknown materials,
/// repeats an id, or has pipes whose endpoints are missing.
pub fn import_level(file: LevelFile, materials: &MaterialTable) -> Result<World, LevelError> {
    let has_network = file.nodes.is_some() || file.pipes.is_some();
    if file.grid.is_none() && has_network {
        return import_network(
            file.nodes.unwrap_or_default(),
            file.pipes.unwrap_or_default(),
        );
    }
    if has_network {
        warn!("level has both grid and network content; loading the grid");
    }

    let cm_per_pixel = file.cm_per_pixel.unwrap_or(DEFAULT_CM_PER_PIXEL);
    if !(cm_per_pixel.is_finite() && cm_per_pixel > 0.0) {
        return Err(LevelError::Invalid(format!(
            "cm_per_pixel must be positive, got {cm_per_pixel}"
        )));
    }
    let source = file.grid.map(LevelGrid::into_rows).unwrap_or_default();
    let rows = file.rows.unwrap_or(0).max(source.len());
    let cols = source
        .iter()
        .map(Vec::len)
        .max()
        .unwrap_or(0)
        .max(file.cols.unwrap_or(0));

    let mut cells = Vec::with_capacity(rows.saturating_mul(cols));
    for r in 0..rows {
        let row = source.get(r);
        for c in 0..cols {
            let raw = row.and_then(|row| row.get(c));
            cells.push(import_cell(raw, materials).map_err(|material| {
                LevelError::Invalid(format!("unknown material {material:?} at ({r}, {c})"))
            })?);
        }
    }
    Ok(World::Grid(Grid::from_cells(rows, cols, cm_per_pixel, cells)?))
}

/// Parse and import a level from JSON text.
///
/// # Errors
///
/// Returns [`LevelError::Json`] for malformed JSON, or any error from
/// [`import_level`].
pub fn parse_level(json: &str, materials: &MaterialTable) -> Result<World, LevelError> {
    let file: LevelFile = serde_json::from_str(json)?;
    import_level(file, materials)
}

/// Read and import a level file.
///
/// # Errors
///
/// Returns [`LevelError::Io`] if the file cannot be read, or any error from
/// [`parse_level`].
pub fn load_level_file(path: &Path, materials: &MaterialTable) -> Result<World, LevelError> {
    let contents = std::fs::read_to_string(path)?;
    parse_level(&contents, materials)
}

fn import_cell(raw: Option<&LevelCell>, materials: &MaterialTable) -> Result<Cell, String> {
    let material = raw
        .and_then(|cell| cell.material.clone())
        .unwrap_or_else(|| materials.default_material.clone());
    if !materials.contains(&material) {
        return Err(material);
    }
    let depth = if materials.is_solid(&material) {
        0.0
    } else {
        clamp_depth(raw.and_then(|cell| cell.depth).unwrap_or(0.0))
    };
    Ok(Cell { material, depth })
}

fn import_network(nodes: Vec<Node>, pipes: Vec<Pipe>) -> Result<World, LevelError> {
    let mut network = Network::new();
    for node in nodes {
        network
            .add_node(node)
            .map_err(|e| LevelError::Invalid(e.to_string()))?;
    }
    for pipe in pipes {
        network
            .add_pipe(pipe)
            .map_err(|e| LevelError::Invalid(e.to_string()))?;
    }
    Ok(World::Network(network))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::edit::apply_batch;

    fn roundtrip(world: &World) -> World {
        let text = serde_json::to_string(&export_level(world, 12, json!({"note": "t"}))).unwrap();
        parse_level(&text, &MaterialTable::default()).unwrap()
    }

    #[test]
    fn wrapped_and_bare_grids_load_the_same() {
        let materials = MaterialTable::default();
        let wrapped = parse_level(
            r#"{"grid":{"cells":[[{"material":"stone"},{"depth":0.25}]]}}"#,
            &materials,
        )
        .unwrap();
        let bare = parse_level(
            r#"{"grid":[[{"material":"stone"},{"depth":0.25}]]}"#,
            &materials,
        )
        .unwrap();
        assert_eq!(wrapped, bare);
        let World::Grid(grid) = wrapped else {
            panic!("expected a grid");
        };
        assert_eq!(grid.get(0, 1).unwrap().material, "space");
        assert!((grid.get(0, 1).unwrap().depth - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn ragged_rows_are_padded() {
        let world = parse_level(
            r#"{"rows":3,"grid":[[{"material":"stone"},{}],[{}]]}"#,
            &MaterialTable::default(),
        )
        .unwrap();
        let World::Grid(grid) = world else {
            panic!("expected a grid");
        };
        assert_eq!((grid.rows(), grid.cols()), (3, 2));
        assert_eq!(grid.get(2, 1).unwrap().material, "space");
    }

    #[test]
    fn unknown_material_is_rejected() {
        let err = parse_level(
            r#"{"grid":[[{"material":"lava"}]]}"#,
            &MaterialTable::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("lava"));
    }

    #[test]
    fn depth_is_clamped_on_import() {
        let world = parse_level(
            r#"{"grid":[[{"depth":3.0},{"depth":-1.0}]]}"#,
            &MaterialTable::default(),
        )
        .unwrap();
        let World::Grid(grid) = world else {
            panic!("expected a grid");
        };
        assert!((grid.get(0, 0).unwrap().depth - 1.0).abs() < f64::EPSILON);
        assert!(grid.get(0, 1).unwrap().depth.abs() < f64::EPSILON);
    }

    #[test]
    fn dangling_pipe_is_rejected() {
        let err = parse_level(
            r#"{"nodes":[{"id":"n1"}],"pipes":[{"id":"p1","a":"n1","b":"n9"}]}"#,
            &MaterialTable::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LevelError::Invalid(_)));
    }

    #[test]
    fn empty_document_is_empty_grid() {
        let world = parse_level("{}", &MaterialTable::default()).unwrap();
        let World::Grid(grid) = world else {
            panic!("expected a grid");
        };
        assert!(grid.is_empty());
    }

    #[test]
    fn grid_export_layout() {
        let world = parse_level(
            r#"{"cm_per_pixel":2.5,"grid":[[{"material":"spring","depth":0.5}]]}"#,
            &MaterialTable::default(),
        )
        .unwrap();
        let json = serde_json::to_value(export_level(&world, 4, json!({"note": "x"}))).unwrap();
        assert_eq!(json["version"]["major"], 1);
        assert_eq!(json["schema_rev"], "1.0");
        assert_eq!(json["tick"], 4);
        assert_eq!(json["rows"], 1);
        assert_eq!(json["cols"], 1);
        assert_eq!(json["cm_per_pixel"], 2.5);
        assert_eq!(json["grid"][0][0]["material"], "spring");
        assert_eq!(json["meta"]["note"], "x");
    }

    #[test]
    fn grid_roundtrip_is_identity() {
        let mut world = World::Grid(Grid::filled(3, 2, 0.75, &Cell::new("space", 0.0)));
        apply_batch(
            &mut world,
            &[
                json!({"op": "set_pixel", "r": 0, "c": 0, "material": "spring"}),
                json!({"op": "set_pixel", "r": 2, "c": 1, "material": "filter", "depth": 0.1}),
                json!({"op": "set_pixel", "r": 1, "c": 1, "material": "stone"}),
            ],
            &MaterialTable::default(),
        )
        .unwrap();
        assert_eq!(roundtrip(&world), world);
    }

    #[test]
    fn network_roundtrip_is_identity() {
        let mut world = World::Network(Network::new());
        apply_batch(
            &mut world,
            &[
                json!({"op": "add_node", "id": "n1", "params": {"elev": 3}}),
                json!({"op": "add_node", "id": "n2", "type": "tank"}),
                json!({"op": "add_pipe", "id": "p1", "a": "n1", "b": "n2"}),
            ],
            &MaterialTable::default(),
        )
        .unwrap();
        assert_eq!(roundtrip(&world), world);
    }

    #[test]
    fn load_from_disk() {
        let dir = std::env::temp_dir().join(format!("flowsim-level-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("level.json");
        std::fs::write(&path, r#"{"grid":[[{"material":"sink"}]]}"#).unwrap();
        let world = load_level_file(&path, &MaterialTable::default()).unwrap();
        assert_eq!(world.variant(), "grid");
        std::fs::remove_dir_all(&dir).unwrap();

        let missing = load_level_file(&dir.join("nope.json"), &MaterialTable::default());
        assert!(matches!(missing, Err(LevelError::Io { .. })));
    }
}
