//! Registry error types

use thiserror::Error;

/// Scan-level failures; per-script discovery problems are recorded on
/// the catalog record instead of raised here
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Store(#[from] scriptgate_interfaces::StoreError),

    #[error("Scan scheduler is already running")]
    SchedulerRunning,
}

pub type RegistryResult<T> = Result<T, RegistryError>;
