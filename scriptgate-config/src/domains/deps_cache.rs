//! Dependency cache configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Dependency cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepsCacheConfig {
    /// Root directory of the hash-addressed cache tree
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Timeout for one package-manager invocation
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_install_timeout")]
    pub install_timeout: Duration,

    /// Age past which the eviction sweep removes an entry
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_retention")]
    pub retention: Duration,
}

impl Default for DepsCacheConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            install_timeout: default_install_timeout(),
            retention: default_retention(),
        }
    }
}

impl Validatable for DepsCacheConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.install_timeout.as_secs(),
            "install_timeout",
            self.domain_name(),
        )?;
        validate_positive(self.retention.as_secs(), "retention", self.domain_name())?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "deps_cache"
    }
}

// Default value functions
fn default_root() -> PathBuf {
    PathBuf::from(".deps_cache")
}

fn default_install_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_retention() -> Duration {
    Duration::from_secs(30 * 24 * 3600) // 30 days
}
