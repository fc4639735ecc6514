//! Event loop configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. User's `MUD_CONFIG_RS` file (compile-time)
//! 3. Library defaults
//!
//! ```rust,ignore
//! use mudnet_runtime::config::LoopConfig;
//!
//! let config = LoopConfig::from_env().name("ingest").error_limit(32);
//! let lp = Loop::with_config(config)?;
//! ```

pub mod defaults;

use std::time::Duration;

use mudnet_core::env::{env_get, env_get_bool, env_get_millis, env_get_str};

pub use crate::error::ConfigError;

/// Loop configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Name used in logs and error messages
    pub name: String,
    /// Keep the most recent N callback failures (0 = keep none)
    pub error_limit: usize,
    /// Escalate every callback failure out of `run`/`update`
    pub fatal_errors: bool,
    /// Warn when one loop pass takes longer than this
    pub slow_pass: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl LoopConfig {
    /// Compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `MUD_LOOP_NAME` - loop name
    /// - `MUD_ERROR_LIMIT` - recent failures retained
    /// - `MUD_FATAL_ERRORS` - escalate callback failures (0/1)
    /// - `MUD_SLOW_PASS_MS` - slow pass warning threshold
    pub fn from_env() -> Self {
        Self {
            name: env_get_str("MUD_LOOP_NAME", "loop"),
            error_limit: env_get("MUD_ERROR_LIMIT", defaults::ERROR_LIMIT),
            fatal_errors: env_get_bool("MUD_FATAL_ERRORS", defaults::FATAL_ERRORS),
            slow_pass: env_get_millis("MUD_SLOW_PASS_MS", defaults::SLOW_PASS_MS),
        }
    }

    /// Compile-time defaults only, no environment.
    pub fn new() -> Self {
        Self {
            name: "loop".to_string(),
            error_limit: defaults::ERROR_LIMIT,
            fatal_errors: defaults::FATAL_ERRORS,
            slow_pass: Duration::from_millis(defaults::SLOW_PASS_MS),
        }
    }

    // Builder methods

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn error_limit(mut self, n: usize) -> Self {
        self.error_limit = n;
        self
    }

    pub fn fatal_errors(mut self, fatal: bool) -> Self {
        self.fatal_errors = fatal;
        self
    }

    pub fn slow_pass(mut self, d: Duration) -> Self {
        self.slow_pass = d;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue("loop name must not be empty"));
        }
        if self.fatal_errors && self.error_limit > 0 {
            return Err(ConfigError::InvalidValue(
                "fatal_errors and error_limit are mutually exclusive",
            ));
        }
        if self.slow_pass.is_zero() {
            return Err(ConfigError::InvalidValue("slow_pass must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = LoopConfig::new();
        assert_eq!(config.name, "loop");
        assert_eq!(config.error_limit, defaults::ERROR_LIMIT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = LoopConfig::new()
            .name("ingest")
            .error_limit(8)
            .slow_pass(Duration::from_millis(5));
        assert_eq!(config.name, "ingest");
        assert_eq!(config.error_limit, 8);
        assert_eq!(config.slow_pass, Duration::from_millis(5));
    }

    #[test]
    fn test_validation() {
        assert!(LoopConfig::new().name("").validate().is_err());
        assert!(LoopConfig::new()
            .fatal_errors(true)
            .error_limit(4)
            .validate()
            .is_err());
        assert!(LoopConfig::new().slow_pass(Duration::ZERO).validate().is_err());
    }
}
