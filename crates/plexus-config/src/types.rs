//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Lifecycle runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Plugin manifests to install at startup
    #[serde(default)]
    pub plugins: Vec<PathBuf>,
}

/// Lifecycle runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Version of the host platform, matched against plugin platform ranges
    #[serde(default = "default_platform_version")]
    pub platform_version: String,

    /// Upper bound for a single lifecycle hook invocation
    #[serde(default = "default_hook_timeout", with = "humantime_serde")]
    pub hook_timeout: Duration,

    /// What `stop` does when started plugins depend on the target
    #[serde(default)]
    pub stop_policy: StopPolicy,

    /// How batch operations react to individual failures
    #[serde(default)]
    pub batch_mode: BatchMode,

    /// Buffer size of the lifecycle event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            platform_version: default_platform_version(),
            hook_timeout: default_hook_timeout(),
            stop_policy: StopPolicy::default(),
            batch_mode: BatchMode::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_platform_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_hook_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_event_capacity() -> usize {
    256
}

/// Behaviour of `stop` when started dependents exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Refuse and report the dependents
    #[default]
    Refuse,
    /// Stop dependents first, in reverse dependency order
    Cascade,
}

/// Behaviour of batch operations on individual failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Abort on the first failure
    #[default]
    FailFast,
    /// Keep going and report every failure at the end
    BestEffort,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (text or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
