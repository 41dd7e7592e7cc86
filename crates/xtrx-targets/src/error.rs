//! Error types for board operations.

use std::path::PathBuf;

/// Errors that can occur during board operations.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// I/O error reading/writing board files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Board file not found.
    #[error("board file not found: {}", path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Board name outside the supported set.
    #[error("unknown board '{0}' (expected fairwaves_cs, fairwaves_pro or limesdr)")]
    UnknownBoard(String),

    /// Validation error in a board definition.
    #[error("validation error: {detail}")]
    Validation {
        /// Description of the validation failure.
        detail: String,
    },
}

/// Result type for board operations.
pub type Result<T> = std::result::Result<T, TargetError>;
