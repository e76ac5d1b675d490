//! # Scriptgate Interfaces
//!
//! Collaborator contracts for the Scriptgate modular architecture.
//!
//! The pipeline core treats persistence, notification delivery, media
//! resolution and access policy as opaque services behind the narrow
//! traits defined here. Production deployments plug real backends in;
//! the in-memory implementations in [`memory`] back tests and the
//! single-process CLI.

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod services;

// Re-export commonly used types
pub use catalog::CatalogStore;
pub use error::StoreError;
pub use ledger::RunLedger;
pub use memory::{InMemoryCatalog, InMemoryLedger, LoggingNotifier, LocalMediaResolver, ScopedAccessChecker};
pub use services::{FileAccessChecker, MediaError, MediaResolver, Notifier};
