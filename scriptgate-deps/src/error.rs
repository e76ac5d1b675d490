//! Dependency cache error types

use scriptgate_core::RuntimeKind;
use std::path::PathBuf;
use thiserror::Error;

/// Dependency cache result type
pub type DepsResult<T> = std::result::Result<T, DepsError>;

/// Dependency cache errors
///
/// Install failures are contained to one dependency set: the staging
/// directory is removed and no other cache entry is touched.
#[derive(Debug, Error)]
pub enum DepsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to parse manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error("Package install failed for {runtime} set {key}: {log}")]
    InstallFailed {
        runtime: RuntimeKind,
        key: String,
        log: String,
    },

    #[error("Package install timed out after {seconds}s for {runtime} set {key}")]
    InstallTimeout {
        runtime: RuntimeKind,
        key: String,
        seconds: u64,
    },

    #[error("Package manager unavailable: {0}")]
    PackageManager(String),
}
