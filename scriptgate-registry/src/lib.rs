//! # Scriptgate Registry
//!
//! Keeps the script catalog synchronized with the files on disk.
//!
//! A scan walks the configured script roots, picks out files that can
//! run standalone, and asks each changed script for its parameter
//! schema over the discovery protocol: the script is invoked with a
//! reserved sentinel flag and must print one JSON schema object to
//! stdout. Discovery failures degrade the one script and never abort
//! the rest of the scan. A scheduler drives repeated scans with
//! explicit start/stop.

pub mod discovery;
pub mod error;
pub mod scanner;
pub mod scheduler;

// Re-export commonly used types
pub use discovery::{DiscoveryFailure, SchemaProbe, SubprocessProbe, SCHEMA_SENTINEL};
pub use error::{RegistryError, RegistryResult};
pub use scanner::{ScanReport, ScannerConfig, ScriptScanner};
pub use scheduler::{ScanScheduler, ScanTask};
