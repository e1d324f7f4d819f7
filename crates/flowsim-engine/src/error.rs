//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can stop startup.

/// Top-level startup error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: flowsim_core::ConfigError,
    },

    /// The startup level could not be loaded.
    #[error("level error: {source}")]
    Level {
        /// The underlying level error.
        #[from]
        source: flowsim_world::LevelError,
    },

    /// The session server failed to start.
    #[error("server error: {source}")]
    Server {
        /// The underlying startup error.
        #[from]
        source: flowsim_observer::StartupError,
    },
}
