//! Script discovery and catalog configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Script discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directories scanned for scripts
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,

    /// Interval between background scan passes
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_scan_interval")]
    pub scan_interval: Duration,

    /// Timeout for one schema discovery probe
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_discovery_timeout")]
    pub discovery_timeout: Duration,

    /// Glob-style patterns excluded from the walk
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Whether successfully discovered schemas are mirrored to a
    /// sidecar file next to the script
    #[serde(default = "crate::domains::utils::default_true")]
    pub write_sidecar: bool,

    /// Whether `serve` keeps rescanning on the interval; off means one
    /// initial scan only
    #[serde(default = "crate::domains::utils::default_true")]
    pub watch: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            scan_interval: default_scan_interval(),
            discovery_timeout: default_discovery_timeout(),
            ignore_patterns: default_ignore_patterns(),
            write_sidecar: true,
            watch: true,
        }
    }
}

impl Validatable for RegistryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.roots.is_empty() {
            return Err(self.validation_error("roots cannot be empty"));
        }

        validate_positive(self.scan_interval.as_secs(), "scan_interval", self.domain_name())?;
        validate_positive(
            self.discovery_timeout.as_secs(),
            "discovery_timeout",
            self.domain_name(),
        )?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "registry"
    }
}

// Default value functions
fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("scripts")]
}

fn default_scan_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_discovery_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_ignore_patterns() -> Vec<String> {
    ["node_modules", "__pycache__", ".git", ".venv", "*.pyc", ".*"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
