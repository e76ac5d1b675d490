//! Configuration loading and environment variable handling

use crate::domains::ScriptgateConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "SCRIPTGATE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<ScriptgateConfig> {
        let content = std::fs::read_to_string(path)?;
        let mut config: ScriptgateConfig = serde_yaml::from_str(&content)?;

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config)?;

        // Validate all domains
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<ScriptgateConfig> {
        let mut config = ScriptgateConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<ScriptgateConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut ScriptgateConfig) -> ConfigResult<()> {
        self.apply_registry_overrides(&mut config.registry)?;
        self.apply_execution_overrides(&mut config.execution)?;
        self.apply_deps_cache_overrides(&mut config.deps_cache)?;
        self.apply_output_overrides(&mut config.output)?;
        self.apply_logging_overrides(&mut config.logging)?;

        Ok(())
    }

    /// Apply registry config overrides
    fn apply_registry_overrides(
        &self,
        config: &mut crate::domains::registry::RegistryConfig,
    ) -> ConfigResult<()> {
        if let Ok(roots) = self.get_env_var("SCRIPT_ROOTS") {
            config.roots = roots.split(':').map(std::path::PathBuf::from).collect();
        }

        if let Ok(interval) = self.get_env_var("SCAN_INTERVAL_SECONDS") {
            config.scan_interval = self.parse_seconds("SCAN_INTERVAL_SECONDS", &interval)?;
        }

        if let Ok(timeout) = self.get_env_var("DISCOVERY_TIMEOUT_SECONDS") {
            config.discovery_timeout = self.parse_seconds("DISCOVERY_TIMEOUT_SECONDS", &timeout)?;
        }

        Ok(())
    }

    /// Apply execution config overrides
    fn apply_execution_overrides(
        &self,
        config: &mut crate::domains::execution::ExecutionConfig,
    ) -> ConfigResult<()> {
        if let Ok(timeout) = self.get_env_var("EXECUTION_TIMEOUT_SECONDS") {
            config.timeout = self.parse_seconds("EXECUTION_TIMEOUT_SECONDS", &timeout)?;
        }

        Ok(())
    }

    /// Apply dependency cache config overrides
    fn apply_deps_cache_overrides(
        &self,
        config: &mut crate::domains::deps_cache::DepsCacheConfig,
    ) -> ConfigResult<()> {
        if let Ok(root) = self.get_env_var("DEPS_CACHE_ROOT") {
            config.root = std::path::PathBuf::from(root);
        }

        if let Ok(timeout) = self.get_env_var("INSTALL_TIMEOUT_SECONDS") {
            config.install_timeout = self.parse_seconds("INSTALL_TIMEOUT_SECONDS", &timeout)?;
        }

        Ok(())
    }

    /// Apply output config overrides
    fn apply_output_overrides(
        &self,
        config: &mut crate::domains::output::OutputConfig,
    ) -> ConfigResult<()> {
        if let Ok(root) = self.get_env_var("OUTPUT_ROOT") {
            config.root = std::path::PathBuf::from(root);
        }

        if let Ok(base_url) = self.get_env_var("OUTPUT_BASE_URL") {
            config.base_url = Some(base_url);
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            use std::str::FromStr;
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            use std::str::FromStr;
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Parse a seconds value from an environment variable
    fn parse_seconds(&self, name: &str, value: &str) -> ConfigResult<std::time::Duration> {
        let seconds: u64 = value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))?;
        Ok(std::time::Duration::from_secs(seconds))
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::logging::LogLevel;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_from_env_defaults() {
        let config = ConfigLoader::with_prefix("SCRIPTGATE_TEST_A").from_env().unwrap();
        assert_eq!(config.registry.scan_interval, Duration::from_secs(5));
        assert_eq!(config.execution.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                ("SCRIPTGATE_TEST_B_LOG_LEVEL", Some("debug")),
                ("SCRIPTGATE_TEST_B_SCAN_INTERVAL_SECONDS", Some("17")),
                ("SCRIPTGATE_TEST_B_DEPS_CACHE_ROOT", Some("/var/cache/gate")),
            ],
            || {
                let config = ConfigLoader::with_prefix("SCRIPTGATE_TEST_B").from_env().unwrap();
                assert_eq!(config.logging.level, LogLevel::Debug);
                assert_eq!(config.registry.scan_interval, Duration::from_secs(17));
                assert_eq!(
                    config.deps_cache.root,
                    std::path::PathBuf::from("/var/cache/gate")
                );
            },
        );
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        temp_env::with_var(
            "SCRIPTGATE_TEST_C_EXECUTION_TIMEOUT_SECONDS",
            Some("soon"),
            || {
                let result = ConfigLoader::with_prefix("SCRIPTGATE_TEST_C").from_env();
                assert!(matches!(result, Err(ConfigError::EnvError(_))));
            },
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "registry:\n  scan_interval: 11\nexecution:\n  timeout: 120\n"
        )
        .unwrap();

        let config = ConfigLoader::with_prefix("SCRIPTGATE_TEST_D")
            .from_file(file.path())
            .unwrap();
        assert_eq!(config.registry.scan_interval, Duration::from_secs(11));
        assert_eq!(config.execution.timeout, Duration::from_secs(120));
        // Untouched domains keep defaults
        assert_eq!(config.deps_cache.install_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_from_file_rejects_invalid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "registry:\n  roots: []\n").unwrap();

        let result = ConfigLoader::with_prefix("SCRIPTGATE_TEST_E").from_file(file.path());
        assert!(matches!(result, Err(ConfigError::DomainError { .. })));
    }
}
