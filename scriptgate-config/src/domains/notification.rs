//! Run completion notification configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Whether notifications are delivered at all; per-script notify
    /// flags are ignored when disabled
    #[serde(default = "crate::domains::utils::default_true")]
    pub enabled: bool,

    /// Prefix prepended to every notification title
    #[serde(default = "default_title_prefix")]
    pub title_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title_prefix: default_title_prefix(),
        }
    }
}

impl Validatable for NotificationConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.title_prefix, "title_prefix", self.domain_name())?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "notification"
    }
}

// Default value functions
fn default_title_prefix() -> String {
    "scriptgate".to_string()
}
