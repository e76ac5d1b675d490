//! # Scriptgate Deps
//!
//! Hash-addressed dependency cache manager.
//!
//! Scripts declare third-party packages through manifest files next to
//! the script. This crate discovers those manifests, canonicalizes them
//! into a [`DependencySet`], and installs each unique set exactly once
//! into an isolated directory named by the set's content hash. Installs
//! are staged and atomically promoted, so an addressable cache entry is
//! always a complete one.

pub mod error;
pub mod installer;
pub mod maintenance;
pub mod manifest;

// Re-export commonly used types
pub use error::{DepsError, DepsResult};
pub use installer::{
    execution_environment, BatchItem, BatchReport, BatchStatus, CacheEntry, DepsCacheManager,
    DepsCacheManagerConfig, InstallManifest, PackageManager, SystemPackageManager, MANIFEST_FILE,
};
pub use maintenance::{CacheStats, CleanupReport, RuntimeUsage};
pub use manifest::{discover_dependencies, Dependency, DependencySet};
