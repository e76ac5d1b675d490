//! Script execution for the gateway
//!
//! Turns a catalog record plus caller parameters into a supervised
//! child process: marshal the schema into argv, compose the dependency
//! environment, spawn under a timeout, classify the captured output,
//! and append exactly one row to the run ledger.

pub mod artifacts;
pub mod error;
pub mod executor;
pub mod marshal;
pub mod registry;
pub mod service;

pub use artifacts::ArtifactStore;
pub use error::{ExecutionError, GatewayError, MarshalError};
pub use executor::{CommandLine, ExecutionOutcome, ProcessExecutor, ProcessExecutorConfig};
pub use marshal::{build_cli_args, MarshaledCommand};
pub use registry::{RunningJobInfo, RunningRegistry};
pub use service::{ScriptGateway, ScriptSelector};
