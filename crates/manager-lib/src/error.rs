//! Error types for the library seams
//!
//! Only run-aborting conditions are errors. Malformed services, labels and
//! missing metrics are recoverable and are reported as values instead.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to load the compose inventory as a whole
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("compose file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read compose file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse compose file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Failure talking to the container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },
}

/// Failure loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
