//! World model for the Flowsim server.
//!
//! A deployment runs exactly one of two world variants: a rectangular grid
//! of cells that water falls through, or a sparse network of typed nodes
//! and pipes. This crate owns both, the transactional edit engine that
//! mutates them, the per-tick flow rule, and level-file import/export.
//!
//! # Modules
//!
//! - [`edit`] -- All-or-nothing application of client edit batches.
//! - [`error`] -- Edit, material, and level errors.
//! - [`flow`] -- The grid flow step.
//! - [`grid`] -- Fixed-size row-major cell storage.
//! - [`level`] -- Level-file JSON import and export.
//! - [`material`] -- The configured material set and flow roles.
//! - [`network`] -- Nodes and pipes with endpoint integrity.
//! - [`world`] -- The [`World`] enum tying the variants together.

pub mod edit;
pub mod error;
pub mod flow;
pub mod grid;
pub mod level;
pub mod material;
pub mod network;
pub mod world;

pub use edit::{EditOp, apply_batch};
pub use error::{BatchError, EditError, LevelError, MaterialError};
pub use flow::flow_step;
pub use grid::Grid;
pub use level::{LevelExport, export_level, import_level, load_level_file, parse_level};
pub use material::MaterialTable;
pub use network::Network;
pub use world::World;
