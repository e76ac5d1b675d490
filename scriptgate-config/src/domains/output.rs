//! Output artifact configuration

use crate::error::ConfigResult;
use crate::validation::{validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory binary artifacts are persisted under
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Public base URL prepended to artifact locators, if artifacts
    /// are served over HTTP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            base_url: None,
        }
    }
}

impl Validatable for OutputConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(ref base_url) = self.base_url {
            validate_url(base_url, "base_url", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "output"
    }
}

// Default value functions
fn default_root() -> PathBuf {
    PathBuf::from("output")
}
