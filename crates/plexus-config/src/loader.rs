//! Configuration loading

use crate::error::{ConfigError, Result};
use crate::{Config, ConfigFormat};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    load_document(path)
}

/// Load any serde document from a file, detecting the format from its
/// extension and expanding environment variables
pub fn load_document<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let format = ConfigFormat::from_path(path)?;

    parse_document(&content, format)
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").expect("valid env var pattern")
    })
}

/// Expand environment variables in configuration string
/// Supports syntax: ${VAR} and ${VAR:-default}
pub fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in env_var_pattern().captures_iter(content) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let var_name = &cap[1];
        let default_value = cap.get(3).map(|m| m.as_str());

        let value = match (env::var(var_name), default_value) {
            (Ok(val), _) => val,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => return Err(ConfigError::MissingEnvVar(var_name.to_string())),
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);

    Ok(result)
}

/// Parse a serde document after expanding environment variables
pub fn parse_document<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> Result<T> {
    let expanded = expand_env_vars(content)?;

    let parsed = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse {
            format: "YAML",
            message: e.to_string(),
        })?,
        ConfigFormat::Toml => toml::from_str(&expanded).map_err(|e| ConfigError::Parse {
            format: "TOML",
            message: e.to_string(),
        })?,
        ConfigFormat::Json => serde_json::from_str(&expanded).map_err(|e| ConfigError::Parse {
            format: "JSON",
            message: e.to_string(),
        })?,
    };

    Ok(parsed)
}

/// Load configuration from a string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Config> {
    parse_document(content, format)
}

/// Load and validate configuration
///
/// Relative plugin manifest paths are resolved against the directory that
/// holds the configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let mut config = load_from_file(path)?;

    if let Some(base) = path.parent() {
        for manifest in &mut config.plugins {
            if manifest.is_relative() {
                *manifest = base.join(&*manifest);
            }
        }
    }

    crate::validator::validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BatchMode, StopPolicy};
    use std::io::Write;
    use std::time::Duration;

    const YAML_CONFIG: &str = r#"
runtime:
  platform_version: "2.4.0"
  hook_timeout: "5s"
  stop_policy: cascade
  batch_mode: best_effort

logging:
  level: "debug"

plugins:
  - "plugins/search.yaml"
"#;

    #[test]
    fn test_load_yaml() {
        let config = load_from_str(YAML_CONFIG, ConfigFormat::Yaml).unwrap();

        assert_eq!(config.runtime.platform_version, "2.4.0");
        assert_eq!(config.runtime.hook_timeout, Duration::from_secs(5));
        assert_eq!(config.runtime.stop_policy, StopPolicy::Cascade);
        assert_eq!(config.runtime.batch_mode, BatchMode::BestEffort);
        assert_eq!(config.runtime.event_capacity, 256);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.plugins.len(), 1);
    }

    #[test]
    fn test_load_toml_defaults() {
        let config = load_from_str("[runtime]\nhook_timeout = \"250ms\"\n", ConfigFormat::Toml).unwrap();
        assert_eq!(config.runtime.hook_timeout, Duration::from_millis(250));
        assert_eq!(config.runtime.stop_policy, StopPolicy::Refuse);
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_invalid_yaml() {
        let invalid = "runtime: [yaml";
        let result = load_from_str(invalid, ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_var_defaults() {
        let expanded = expand_env_vars("level: ${PLEXUS_TEST_UNSET_LEVEL:-warn}").unwrap();
        assert_eq!(expanded, "level: warn");

        let missing = expand_env_vars("level: ${PLEXUS_TEST_UNSET_LEVEL}");
        assert!(matches!(missing, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("PLEXUS_TEST_TIMEOUT", "12s");

        let config = load_from_str(
            "runtime:\n  hook_timeout: \"${PLEXUS_TEST_TIMEOUT}\"\n",
            ConfigFormat::Yaml,
        )
        .unwrap();
        assert_eq!(config.runtime.hook_timeout, Duration::from_secs(12));

        env::remove_var("PLEXUS_TEST_TIMEOUT");
    }

    #[test]
    fn test_load_config_resolves_manifest_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plexus.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "plugins:\n  - search.toml").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.plugins[0], dir.path().join("search.toml"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_from_file("/definitely/not/here.yaml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
