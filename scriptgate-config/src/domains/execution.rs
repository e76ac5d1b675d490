//! Script execution configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Script execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Wall-clock bound for one script run
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_timeout")]
    pub timeout: Duration,

    /// How long a killed process is given to actually exit
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_termination_grace")]
    pub termination_grace: Duration,

    /// Character bound on the stdout preview stored in the run ledger
    #[serde(default = "default_stdout_preview_chars")]
    pub stdout_preview_chars: usize,

    /// Character bound on diagnostic previews (discovery failures,
    /// stderr excerpts)
    #[serde(default = "default_diagnostic_preview_chars")]
    pub diagnostic_preview_chars: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            termination_grace: default_termination_grace(),
            stdout_preview_chars: default_stdout_preview_chars(),
            diagnostic_preview_chars: default_diagnostic_preview_chars(),
        }
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.timeout.as_secs(), "timeout", self.domain_name())?;
        validate_positive(
            self.termination_grace.as_secs(),
            "termination_grace",
            self.domain_name(),
        )?;
        validate_positive(
            self.stdout_preview_chars,
            "stdout_preview_chars",
            self.domain_name(),
        )?;

        if self.termination_grace >= self.timeout {
            return Err(self.validation_error("termination_grace must be shorter than timeout"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

// Default value functions
fn default_timeout() -> Duration {
    Duration::from_secs(600) // 10 minutes
}

fn default_termination_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_stdout_preview_chars() -> usize {
    1000
}

fn default_diagnostic_preview_chars() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_config_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.termination_grace, Duration::from_secs(5));
        assert_eq!(config.stdout_preview_chars, 1000);
    }

    #[test]
    fn test_execution_config_validation() {
        let mut config = ExecutionConfig::default();
        assert!(config.validate().is_ok());

        config.timeout = Duration::from_secs(0);
        assert!(config.validate().is_err());

        config = ExecutionConfig::default();
        config.termination_grace = Duration::from_secs(900);
        assert!(config.validate().is_err());
    }
}
