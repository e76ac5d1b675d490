//! Core domain models and types for Scriptgate
//!
//! This crate contains the fundamental types used throughout the
//! Scriptgate system. It has minimal dependencies and defines the
//! domain language of the application: scripts, parameter schemas,
//! runtimes, and run outcomes.

pub mod error;
pub mod ids;
pub mod run;
pub mod runtime;
pub mod script;

// Re-export commonly used types at the crate root
pub use error::SchemaError;
pub use ids::{InvocationId, ScriptId};
pub use run::{ArtifactRef, RunInvocation, RunStatus};
pub use runtime::RuntimeKind;
pub use script::{parse_schema, LoadState, ParamSpec, ParamType, Schema, ScriptRecord};
