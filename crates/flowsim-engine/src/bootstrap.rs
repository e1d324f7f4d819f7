//! Config discovery and initial world construction.

use std::path::{Path, PathBuf};

use flowsim_core::{FlowConfig, WorldVariant};
use flowsim_types::Cell;
use flowsim_world::{Grid, Network, World, load_level_file};
use tracing::info;

use crate::error::EngineError;

/// Config file used when `FLOWSIM_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "flowsim-config.yaml";

/// Where to read configuration from.
pub fn config_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("FLOWSIM_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load and validate configuration.
///
/// A missing file means defaults, with environment overrides still applied.
///
/// # Errors
///
/// Returns [`EngineError::Config`] if the file is unreadable, malformed,
/// or fails validation.
pub fn load_config(path: &Path) -> Result<FlowConfig, EngineError> {
    let config = if path.exists() {
        FlowConfig::from_file(path)?
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        let mut config = FlowConfig::default();
        config.apply_env_overrides();
        config
    };
    config.validate()?;
    Ok(config)
}

/// Build the world the server starts with.
///
/// A configured level file wins; otherwise a fresh world of the configured
/// variant. A fresh grid is filled with the default material at depth zero.
///
/// # Errors
///
/// Returns [`EngineError::Level`] if the level file cannot be loaded.
pub fn build_world(config: &FlowConfig) -> Result<World, EngineError> {
    if let Some(level) = &config.world.level {
        let world = load_level_file(level, &config.materials)?;
        info!(path = %level.display(), variant = world.variant(), "Level loaded");
        return Ok(world);
    }

    let world = match config.world.variant {
        WorldVariant::Grid => World::Grid(Grid::filled(
            config.world.rows,
            config.world.cols,
            config.world.cm_per_pixel,
            &Cell::new(config.materials.default_material.clone(), 0.0),
        )),
        WorldVariant::Network => World::Network(Network::new()),
    };
    info!(variant = world.variant(), "Fresh world created");
    Ok(world)
}
