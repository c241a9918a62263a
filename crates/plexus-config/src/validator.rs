//! Configuration validation

use crate::error::{ConfigError, Result};
use crate::Config;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["text", "json"];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_runtime(config)?;
    validate_logging(config)?;
    validate_plugins(config)?;
    Ok(())
}

fn validate_runtime(config: &Config) -> Result<()> {
    let runtime = &config.runtime;

    if runtime.hook_timeout.is_zero() {
        return Err(ConfigError::invalid("runtime.hook_timeout must be > 0"));
    }

    if runtime.hook_timeout.as_secs() > 600 {
        tracing::warn!("runtime.hook_timeout is very high (>10 minutes)");
    }

    if runtime.event_capacity == 0 {
        return Err(ConfigError::invalid("runtime.event_capacity must be > 0"));
    }

    if !runtime
        .platform_version
        .starts_with(|c: char| c.is_ascii_digit())
    {
        return Err(ConfigError::invalid(format!(
            "runtime.platform_version '{}' must start with a digit",
            runtime.platform_version
        )));
    }

    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::invalid(format!(
            "Invalid log level: {} (must be one of {})",
            config.logging.level,
            LOG_LEVELS.join(", ")
        )));
    }

    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::invalid(format!(
            "Invalid log format: {} (must be text or json)",
            config.logging.format
        )));
    }

    Ok(())
}

fn validate_plugins(config: &Config) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for manifest in &config.plugins {
        if !seen.insert(manifest) {
            return Err(ConfigError::invalid(format!(
                "Plugin manifest listed twice: {}",
                manifest.display()
            )));
        }
    }
    Ok(())
}
