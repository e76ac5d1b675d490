//! Domain-specific configuration modules

pub mod deps_cache;
pub mod execution;
pub mod logging;
pub mod notification;
pub mod output;
pub mod registry;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Scriptgate configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScriptgateConfig {
    /// Script discovery and catalog configuration
    #[serde(default)]
    pub registry: registry::RegistryConfig,

    /// Script execution configuration
    #[serde(default)]
    pub execution: execution::ExecutionConfig,

    /// Dependency cache configuration
    #[serde(default)]
    pub deps_cache: deps_cache::DepsCacheConfig,

    /// Output artifact configuration
    #[serde(default)]
    pub output: output::OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Notification configuration (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<notification::NotificationConfig>,
}

impl ScriptgateConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.registry.validate()?;
        self.execution.validate()?;
        self.deps_cache.validate()?;
        self.output.validate()?;
        self.logging.validate()?;

        if let Some(ref notification) = self.notification {
            notification.validate()?;
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = ScriptgateConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = ScriptgateConfig::default();
        assert!(config.validate_all().is_ok());
    }

    #[test]
    fn test_sample_generation_round_trips() {
        let sample = ScriptgateConfig::generate_sample();
        let parsed: ScriptgateConfig = serde_yaml::from_str(&sample).unwrap();
        assert!(parsed.validate_all().is_ok());
    }
}
