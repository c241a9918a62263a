//! Plugin runtime error types

use plexus_plugin_api::{
    ExtensionError, MalformedDependency, PluginError, PluginState, VersionConstraint,
};
use std::fmt;
use std::time::Duration;

/// Lifecycle hook that was being invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    /// `init`
    Init,
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `uninstall`
    Uninstall,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookKind::Init => "init",
            HookKind::Start => "start",
            HookKind::Stop => "stop",
            HookKind::Uninstall => "uninstall",
        };
        f.write_str(s)
    }
}

/// Plugin runtime error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginRuntimeError {
    /// Dependency token could not be parsed
    #[error(transparent)]
    MalformedDependency(#[from] MalformedDependency),

    /// Required dependencies form a loop
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// Plugins on the cycle; the first id is repeated at the end
        cycle: Vec<String>,
    },

    /// A required dependency is not installed
    #[error("Plugin '{plugin}' requires '{dependency}' which is not installed")]
    DependencyNotFound {
        /// Plugin declaring the dependency
        plugin: String,
        /// Missing dependency
        dependency: String,
    },

    /// An installed dependency has an unacceptable version
    #[error("Plugin '{plugin}' requires '{dependency}' {required}, found version {actual}")]
    IncompatibleDependency {
        /// Plugin declaring the dependency
        plugin: String,
        /// Dependency id
        dependency: String,
        /// Constraint declared by `plugin`
        required: VersionConstraint,
        /// Version that is installed
        actual: String,
    },

    /// A required dependency is installed but not running
    #[error("Plugin '{plugin}' cannot start: dependency '{dependency}' is {state}")]
    DependencyNotStarted {
        /// Plugin that was being started
        plugin: String,
        /// Blocking dependency
        dependency: String,
        /// State the dependency is in
        state: PluginState,
    },

    /// Plugin id already installed
    #[error("Plugin already exists: {0}")]
    DuplicateId(String),

    /// Plugin not found
    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    /// Operation not allowed in the plugin's current state
    #[error("Plugin '{plugin}' cannot {operation} while {state}")]
    InvalidStateTransition {
        /// Plugin id
        plugin: String,
        /// Operation that was requested
        operation: &'static str,
        /// State the plugin is in
        state: PluginState,
    },

    /// `stop` refused because started plugins depend on the target
    #[error("Plugin '{plugin}' is required by running plugins: {}", .dependents.join(", "))]
    DependentsActive {
        /// Plugin that was being stopped
        plugin: String,
        /// Started plugins requiring it
        dependents: Vec<String>,
    },

    /// Plugin does not support the host platform version
    #[error(
        "Plugin '{plugin}' supports platform {}..{}, host is {platform}",
        .min.as_deref().unwrap_or("*"),
        .max.as_deref().unwrap_or("*")
    )]
    IncompatiblePlatform {
        /// Plugin id
        plugin: String,
        /// Host platform version
        platform: String,
        /// Minimum supported version
        min: Option<String>,
        /// Maximum supported version
        max: Option<String>,
    },

    /// A lifecycle hook returned an error
    #[error("Plugin '{plugin}' {hook} hook failed: {source}")]
    LifecycleHook {
        /// Plugin id
        plugin: String,
        /// Hook that failed
        hook: HookKind,
        /// Error reported by the plugin
        #[source]
        source: PluginError,
    },

    /// A lifecycle hook exceeded its time budget
    #[error("Plugin '{plugin}' {hook} hook timed out after {timeout:?}")]
    Timeout {
        /// Plugin id
        plugin: String,
        /// Hook that timed out
        hook: HookKind,
        /// Configured budget
        timeout: Duration,
    },

    /// A lifecycle hook was cancelled
    #[error("Plugin '{plugin}' {hook} hook was cancelled")]
    Cancelled {
        /// Plugin id
        plugin: String,
        /// Hook that was cancelled
        hook: HookKind,
    },

    /// Extension registry error
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// Loader collaborator failed
    #[error("Loader failed for plugin '{plugin}': {message}")]
    Loader {
        /// Plugin id
        plugin: String,
        /// Loader message
        message: String,
    },

    /// Plugin manifest could not be loaded
    #[error("Invalid plugin manifest '{path}': {message}")]
    Manifest {
        /// Manifest path
        path: String,
        /// What went wrong
        message: String,
    },

    /// Best-effort batch finished with failures
    #[error("{} plugin(s) failed: {}", .failures.len(), summarize(.failures))]
    Batch {
        /// Every failure, keyed by plugin id
        failures: Vec<(String, PluginRuntimeError)>,
    },
}

fn summarize(failures: &[(String, PluginRuntimeError)]) -> String {
    failures
        .iter()
        .map(|(id, _)| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for plugin runtime operations
pub type Result<T> = std::result::Result<T, PluginRuntimeError>;

impl PluginRuntimeError {
    /// Create a new plugin not found error
    pub fn not_found(name: impl fmt::Display) -> Self {
        Self::PluginNotFound(name.to_string())
    }

    /// Create a new already exists error
    pub fn already_exists(name: impl fmt::Display) -> Self {
        Self::DuplicateId(name.to_string())
    }

    /// Create a new invalid state transition error
    pub fn invalid_state(
        plugin: impl fmt::Display,
        operation: &'static str,
        state: PluginState,
    ) -> Self {
        Self::InvalidStateTransition {
            plugin: plugin.to_string(),
            operation,
            state,
        }
    }

    /// Create a new loader error
    pub fn loader(plugin: impl fmt::Display, msg: impl fmt::Display) -> Self {
        Self::Loader {
            plugin: plugin.to_string(),
            message: msg.to_string(),
        }
    }

    /// Plugin ids this error is about, for rendering without re-deriving them
    pub fn plugin_ids(&self) -> Vec<&str> {
        match self {
            Self::CircularDependency { cycle } => cycle.iter().map(String::as_str).collect(),
            Self::DependencyNotFound { plugin, dependency }
            | Self::IncompatibleDependency {
                plugin, dependency, ..
            }
            | Self::DependencyNotStarted {
                plugin, dependency, ..
            } => vec![plugin.as_str(), dependency.as_str()],
            Self::DependentsActive { plugin, dependents } => std::iter::once(plugin.as_str())
                .chain(dependents.iter().map(String::as_str))
                .collect(),
            Self::DuplicateId(plugin) | Self::PluginNotFound(plugin) => vec![plugin.as_str()],
            Self::InvalidStateTransition { plugin, .. }
            | Self::IncompatiblePlatform { plugin, .. }
            | Self::LifecycleHook { plugin, .. }
            | Self::Timeout { plugin, .. }
            | Self::Cancelled { plugin, .. }
            | Self::Loader { plugin, .. } => vec![plugin.as_str()],
            Self::Batch { failures } => failures.iter().map(|(id, _)| id.as_str()).collect(),
            Self::MalformedDependency(_) | Self::Extension(_) | Self::Manifest { .. } => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_plugin_api::ConstraintOp;

    #[test]
    fn test_error_creation() {
        let err = PluginRuntimeError::not_found("test");
        assert!(matches!(err, PluginRuntimeError::PluginNotFound(_)));

        let err = PluginRuntimeError::already_exists("test");
        assert!(matches!(err, PluginRuntimeError::DuplicateId(_)));
    }

    #[test]
    fn test_error_display() {
        let err = PluginRuntimeError::PluginNotFound("auth".to_string());
        assert_eq!(err.to_string(), "Plugin not found: auth");

        let err = PluginRuntimeError::CircularDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");

        let err = PluginRuntimeError::IncompatibleDependency {
            plugin: "a".into(),
            dependency: "b".into(),
            required: VersionConstraint::new(ConstraintOp::Ge, "2.0.0"),
            actual: "1.5.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "Plugin 'a' requires 'b' >=2.0.0, found version 1.5.0"
        );
    }

    #[test]
    fn test_plugin_ids() {
        let err = PluginRuntimeError::DependentsActive {
            plugin: "db".into(),
            dependents: vec!["api".into(), "jobs".into()],
        };
        assert_eq!(err.plugin_ids(), vec!["db", "api", "jobs"]);
    }
}
