//! Build errors.

use std::path::PathBuf;

use thiserror::Error;
use xtrx_core::{SocError, TimingError};
use xtrx_targets::TargetError;

/// Errors that can occur during the two-phase build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("composition failed: {0}")]
    Soc(#[from] SocError),

    #[error("board error: {0}")]
    Target(#[from] TargetError),

    #[error("timing validation failed: {0}")]
    Timing(#[from] TimingError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("phase mismatch: {reason}")]
    PhaseMismatch { reason: String },

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({}):\n{stderr}", describe_status(status))]
    ExternalTool {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{tool} did not produce {}", path.display())]
    MissingOutput { tool: String, path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;
