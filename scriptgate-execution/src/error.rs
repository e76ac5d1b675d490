//! Marshaling, execution, and gateway error types

use std::path::PathBuf;
use thiserror::Error;

use scriptgate_core::ScriptId;
use scriptgate_deps::DepsError;
use scriptgate_interfaces::{MediaError, StoreError};

/// Rejections raised while turning a parameter map into argv
///
/// All of these happen before any process is spawned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarshalError {
    #[error("missing required parameter '{name}'")]
    MissingParameter { name: String },

    #[error("parameter '{name}' expects {expected}, got '{value}'")]
    TypeMismatch {
        name: String,
        expected: String,
        value: String,
    },

    #[error("parameter '{name}' is not declared by the script")]
    UndeclaredParameter { name: String },
}

/// Faults in the execution machinery itself
///
/// A script failing or timing out is not an error here; those are
/// classified results carried in the run ledger.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger error: {0}")]
    Store(#[from] StoreError),

    #[error("script {script_id} has no running invocation")]
    NotRunning { script_id: ScriptId },
}

/// Request-path failures surfaced by the gateway service
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no script matches '{reference}'")]
    ScriptNotFound { reference: String },

    #[error("script '{name}' is not runnable: {reason}")]
    NotLoaded { name: String, reason: String },

    #[error("parameters must be a JSON object")]
    InvalidParams,

    #[error("script file missing on disk: {path}")]
    SourceMissing { path: PathBuf },

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Deps(#[from] DepsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
