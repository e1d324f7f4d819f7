//! Configuration loading and typed config structures for the Flowsim server.
//!
//! The canonical configuration lives in `flowsim-config.yaml` at the
//! working directory. Every field has a default, so a missing file, a
//! missing section, or a missing key all fall back to the built-in values.
//! A handful of deployment settings can be overridden from the environment.

use std::path::{Path, PathBuf};

use flowsim_world::{MaterialError, MaterialTable};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The material table is inconsistent.
    #[error("invalid materials: {source}")]
    Materials {
        /// The underlying material error.
        #[from]
        source: MaterialError,
    },

    /// A value is out of range.
    #[error("invalid config: {reason}")]
    Invalid {
        /// Which value and why.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
///
/// Mirrors the structure of `flowsim-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FlowConfig {
    /// Listener and save location.
    #[serde(default)]
    pub server: ServerSection,

    /// Tick and broadcast rates.
    #[serde(default)]
    pub simulation: SimulationSection,

    /// Which world to run and where it comes from.
    #[serde(default)]
    pub world: WorldSection,

    /// Legal materials and their flow roles.
    #[serde(default)]
    pub materials: MaterialTable,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl FlowConfig {
    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Override deployment settings from `FLOWSIM_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override deployment settings from an arbitrary key lookup.
    ///
    /// Recognized keys are `FLOWSIM_HOST`, `FLOWSIM_PORT`, `FLOWSIM_LEVEL`
    /// and `FLOWSIM_SAVE_DIR`. A port that does not parse is ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("FLOWSIM_HOST") {
            self.server.host = val;
        }
        if let Some(port) = lookup("FLOWSIM_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = lookup("FLOWSIM_LEVEL") {
            self.world.level = Some(PathBuf::from(val));
        }
        if let Some(val) = lookup("FLOWSIM_SAVE_DIR") {
            self.server.save_dir = PathBuf::from(val);
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero or inconsistent rates or a
    /// non-positive scale, and [`ConfigError::Materials`] for an
    /// inconsistent material table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_hz == 0 || sim.snapshot_hz == 0 || sim.max_tick_hz == 0 {
            return Err(ConfigError::Invalid {
                reason: "tick_hz, snapshot_hz and max_tick_hz must be positive".to_owned(),
            });
        }
        if sim.tick_hz > sim.max_tick_hz {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "tick_hz {} exceeds max_tick_hz {}",
                    sim.tick_hz, sim.max_tick_hz
                ),
            });
        }
        if !(self.world.cm_per_pixel.is_finite() && self.world.cm_per_pixel > 0.0) {
            return Err(ConfigError::Invalid {
                reason: "world.cm_per_pixel must be positive".to_owned(),
            });
        }
        self.materials.validate()?;
        Ok(())
    }
}

/// Listener and save location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port. Serves `/ws`, `/health` and `/api/snapshot`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory `save` requests write into.
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            save_dir: default_save_dir(),
        }
    }
}

/// Tick and broadcast rates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationSection {
    /// Initial simulation rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Snapshot broadcast rate.
    #[serde(default = "default_snapshot_hz")]
    pub snapshot_hz: u32,

    /// Highest rate a `control` message may set.
    #[serde(default = "default_max_tick_hz")]
    pub max_tick_hz: u32,

    /// Start with the tick loop paused.
    #[serde(default)]
    pub start_paused: bool,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            snapshot_hz: default_snapshot_hz(),
            max_tick_hz: default_max_tick_hz(),
            start_paused: false,
        }
    }
}

/// Which world variant to build when no level says otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldVariant {
    /// Cell grid.
    #[default]
    Grid,
    /// Node/pipe network.
    Network,
}

/// Which world to run and where it comes from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorldSection {
    /// Variant for a fresh world. Ignored when `level` is set.
    #[serde(default)]
    pub variant: WorldVariant,

    /// Level file to load at startup.
    #[serde(default)]
    pub level: Option<PathBuf>,

    /// Height of a fresh grid.
    #[serde(default = "default_rows")]
    pub rows: usize,

    /// Width of a fresh grid.
    #[serde(default = "default_cols")]
    pub cols: usize,

    /// Scale of a fresh grid.
    #[serde(default = "default_cm_per_pixel")]
    pub cm_per_pixel: f64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            variant: WorldVariant::default(),
            level: None,
            rows: default_rows(),
            cols: default_cols(),
            cm_per_pixel: default_cm_per_pixel(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingSection {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    7777
}

fn default_save_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_tick_hz() -> u32 {
    50
}

const fn default_snapshot_hz() -> u32 {
    20
}

const fn default_max_tick_hz() -> u32 {
    1000
}

const fn default_rows() -> usize {
    32
}

const fn default_cols() -> usize {
    32
}

const fn default_cm_per_pixel() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_owned()
}
