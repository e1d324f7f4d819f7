//! Error types for the `flowsim-world` crate.
//!
//! [`EditError`] maps one-to-one onto the wire [`ErrorCode`] taxonomy.
//! [`BatchError`] pins an [`EditError`] to the operation that raised it.

use flowsim_types::ErrorCode;

/// A single edit operation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// The operation is structurally invalid.
    #[error("{reason}")]
    BadRequest {
        /// What was wrong with the operation.
        reason: String,
    },

    /// The id already names a node or pipe.
    #[error("Entity id already exists: {0}")]
    IdConflict(String),

    /// The referenced id does not name a node or pipe.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// The material is not in the configured table.
    #[error("Unknown material: {0}")]
    InvalidMaterial(String),

    /// The coordinate lies outside the grid.
    #[error("Cell ({r}, {c}) is outside the {rows}x{cols} grid")]
    IndexOutOfBounds {
        /// Requested row.
        r: i64,
        /// Requested column.
        c: i64,
        /// Grid height.
        rows: usize,
        /// Grid width.
        cols: usize,
    },
}

impl EditError {
    /// Shorthand for [`EditError::BadRequest`].
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }

    /// The wire error code for this failure.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest { .. } => ErrorCode::BadRequest,
            Self::IdConflict(_) => ErrorCode::IdConflict,
            Self::UnknownEntity(_) => ErrorCode::UnknownEntity,
            Self::InvalidMaterial(_) => ErrorCode::InvalidMaterial,
            Self::IndexOutOfBounds { .. } => ErrorCode::IndexOutOfBounds,
        }
    }
}

/// A batch was rejected; the world is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("edit {index}: {error}")]
pub struct BatchError {
    /// Zero-based position of the failing operation.
    pub index: usize,
    /// Why it failed.
    pub error: EditError,
}

impl BatchError {
    /// The wire error code for this failure.
    pub const fn code(&self) -> ErrorCode {
        self.error.code()
    }
}

/// The material table is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaterialError {
    /// The fallback material is not declared.
    #[error("default material {0:?} is not declared")]
    UndeclaredDefault(String),

    /// A role set names a material that is not declared.
    #[error("{role} material {material:?} is not declared")]
    UndeclaredRole {
        /// Which role set (`solid`, `source`, `drain`, `flow_fraction`).
        role: &'static str,
        /// The offending material.
        material: String,
    },

    /// A flow fraction lies outside `[0, 1]`.
    #[error("flow fraction for {0:?} must be within [0, 1]")]
    FractionOutOfRange(String),
}

/// A level document could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum LevelError {
    /// Filesystem failure.
    #[error("level I/O failed: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The document is not valid level JSON.
    #[error("level JSON is malformed: {source}")]
    Json {
        /// The underlying parse error.
        #[from]
        source: serde_json::Error,
    },

    /// The document parsed but describes an invalid world.
    #[error("invalid level: {0}")]
    Invalid(String),
}
