//! Plugin error types

use std::fmt;

/// Error returned by a plugin's own lifecycle hooks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// Initialization failed
    #[error("Initialization failed: {0}")]
    InitError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An extension the hook tried to contribute was refused
    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),
}

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, PluginError>;

impl PluginError {
    /// Create a new initialization error
    pub fn init(msg: impl fmt::Display) -> Self {
        Self::InitError(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::ConfigError(msg.to_string())
    }

    /// Create a new runtime error
    pub fn runtime(msg: impl fmt::Display) -> Self {
        Self::RuntimeError(msg.to_string())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl fmt::Display) -> Self {
        Self::InvalidState(msg.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

/// Errors raised by the extension registry
///
/// These are returned synchronously to whoever attempted the registration
/// (usually a start hook) and never change the owner's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    /// No active extension point with this id
    #[error("Extension point not found: {0}")]
    PointNotFound(String),

    /// An active extension point with this id already exists
    #[error("Extension point already registered: {0}")]
    DuplicatePoint(String),

    /// The instance does not implement the point's contract
    #[error("Extension for '{point}' must implement {expected}, got {actual}")]
    ContractMismatch {
        /// Extension point id
        point: String,
        /// Contract declared by the point
        expected: String,
        /// Contract carried by the offered instance
        actual: String,
    },

    /// The point accepts a single implementation and already has one
    #[error("Extension point '{point}' allows a single implementation, already provided by '{existing_owner}'")]
    SingleImplementationViolation {
        /// Extension point id
        point: String,
        /// Owner of the enabled extension that is kept
        existing_owner: String,
    },

    /// The owner is not in a state that may contribute extensions
    #[error("Plugin '{owner}' may not register extensions for '{point}': plugin is not started")]
    RegistrationRejected {
        /// Extension point id
        point: String,
        /// Plugin that attempted the registration
        owner: String,
    },

    /// No matching extension registered for this owner
    #[error("Extension not found on '{point}' for plugin '{owner}'")]
    ExtensionNotFound {
        /// Extension point id
        point: String,
        /// Owner plugin id
        owner: String,
    },
}
