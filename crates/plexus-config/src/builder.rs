//! Configuration builder

use crate::error::Result;
use crate::types::{BatchMode, Config, StopPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host platform version
    pub fn platform_version(mut self, version: impl Into<String>) -> Self {
        self.config.runtime.platform_version = version.into();
        self
    }

    /// Set the hook timeout
    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.config.runtime.hook_timeout = timeout;
        self
    }

    /// Set the stop policy
    pub fn stop_policy(mut self, policy: StopPolicy) -> Self {
        self.config.runtime.stop_policy = policy;
        self
    }

    /// Set the batch mode
    pub fn batch_mode(mut self, mode: BatchMode) -> Self {
        self.config.runtime.batch_mode = mode;
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Add a plugin manifest
    pub fn add_plugin(mut self, manifest: impl Into<PathBuf>) -> Self {
        self.config.plugins.push(manifest.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        crate::validator::validate_config(&self.config)?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .platform_version("3.1.0")
            .hook_timeout(Duration::from_secs(2))
            .stop_policy(StopPolicy::Cascade)
            .build()
            .unwrap();

        assert_eq!(config.runtime.platform_version, "3.1.0");
        assert_eq!(config.runtime.hook_timeout, Duration::from_secs(2));
        assert_eq!(config.runtime.stop_policy, StopPolicy::Cascade);
    }

    #[test]
    fn test_builder_validates() {
        let result = ConfigBuilder::new().hook_timeout(Duration::ZERO).build();
        assert!(result.is_err());
    }
}
