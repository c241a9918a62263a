//! Configuration errors

/// Result type alias using [`ConfigError`]
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Error raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Content could not be parsed
    #[error("Failed to parse {format}: {message}")]
    Parse {
        /// Format that was expected
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// Format could not be detected from the path
    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Environment variable referenced without default
    #[error("Environment variable '{0}' not set and no default provided")]
    MissingEnvVar(String),

    /// Semantically invalid value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Create an invalid-value error
    pub fn invalid(msg: impl std::fmt::Display) -> Self {
        Self::Invalid(msg.to_string())
    }
}
