//! Core plugin trait and types

use crate::context::PluginContext;
use crate::dependency::DependencySpec;
use crate::error::Result;
use crate::version::compare_versions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle hooks a plugin implements
///
/// Hooks take `&self` because the runtime may keep waiting on (or give up on)
/// an invocation independently of the plugin; keep mutable state behind
/// interior mutability. Extensions are registered from [`start`](Self::start)
/// through [`PluginContext::register_extension`] and are withdrawn by the
/// runtime when the plugin stops.
#[async_trait]
pub trait Plugin: Send + Sync + fmt::Debug {
    /// Prepare the plugin; called once after installation
    async fn init(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Start the plugin and contribute its extensions
    async fn start(&self, ctx: &PluginContext) -> Result<()>;

    /// Stop the plugin (graceful shutdown)
    async fn stop(&self, ctx: &PluginContext) -> Result<()>;

    /// Release anything the plugin persisted before it is removed
    async fn uninstall(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Health check
    ///
    /// Returns the current health status of the plugin.
    async fn health_check(&self) -> Result<HealthStatus> {
        Ok(HealthStatus::Healthy)
    }
}

/// Plugin health status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message")]
pub enum HealthStatus {
    /// Plugin is healthy and operating normally
    Healthy,

    /// Plugin is degraded but still functioning
    Degraded(String),

    /// Plugin is unhealthy and not functioning
    Unhealthy(String),
}

impl HealthStatus {
    /// Check if the plugin is healthy
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Get the health message if any
    pub fn message(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(msg) | HealthStatus::Unhealthy(msg) => Some(msg),
        }
    }
}

/// Static description of an installable plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Globally unique id
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Plugin version
    pub version: String,

    /// Plugin description
    #[serde(default)]
    pub description: String,

    /// Plugin author
    #[serde(default)]
    pub author: String,

    /// Oldest platform version the plugin runs on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_platform_version: Option<String>,

    /// Newest platform version the plugin runs on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_platform_version: Option<String>,

    /// Dependencies in declaration order
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,

    /// Initial configuration
    #[serde(default)]
    pub configuration: HashMap<String, String>,
}

impl PluginDescriptor {
    /// Create new plugin descriptor
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            version: version.into(),
            description: String::new(),
            author: String::new(),
            min_platform_version: None,
            max_platform_version: None,
            dependencies: Vec::new(),
            configuration: HashMap::new(),
        }
    }

    /// Set display name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set author
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Restrict the platform versions this plugin accepts
    pub fn platform_range(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min_platform_version = min.map(String::from);
        self.max_platform_version = max.map(String::from);
        self
    }

    /// Add a parsed dependency
    pub fn dependency(mut self, dependency: DependencySpec) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Parse and add dependency tokens
    pub fn depends_on<I, S>(
        mut self,
        tokens: I,
    ) -> std::result::Result<Self, crate::dependency::MalformedDependency>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in tokens {
            self.dependencies.push(DependencySpec::parse(token.as_ref())?);
        }
        Ok(self)
    }

    /// Set a configuration entry
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    /// Dependencies that must be running before this plugin starts
    pub fn required_dependencies(&self) -> impl Iterator<Item = &DependencySpec> {
        self.dependencies.iter().filter(|d| !d.optional)
    }

    /// Whether a host at `platform` lies inside the plugin's platform range
    ///
    /// Both bounds are inclusive and compared leniently, so a missing bound
    /// never excludes anything.
    pub fn supports_platform(&self, platform: &str) -> bool {
        let above_min = self
            .min_platform_version
            .as_deref()
            .map_or(true, |min| compare_versions(platform, min) != Ordering::Less);
        let below_max = self
            .max_platform_version
            .as_deref()
            .map_or(true, |max| compare_versions(platform, max) != Ordering::Greater);
        above_min && below_max
    }
}

/// Plugin lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Installed but not initialized
    Installed,

    /// Initialized but not started
    Initialized,

    /// Started and running
    Started,

    /// Stopped; may be restarted or uninstalled
    Stopped,

    /// A hook or dependency check failed; the cause is kept on the record
    Failed,

    /// Removed from the runtime
    Uninstalled,
}

impl PluginState {
    /// Whether the state machine allows `self -> next`
    ///
    /// A failed start attempt from `Stopped` also lands in `Failed`, so that a
    /// plugin whose dependency is down never appears restartable.
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Installed, Initialized)
                | (Initialized, Started)
                | (Started, Stopped)
                | (Stopped, Started)
                | (Stopped, Uninstalled)
                | (Installed | Initialized | Started | Stopped, Failed)
                | (Failed, Stopped)
                | (Failed, Uninstalled)
        )
    }

    /// Check if the plugin is started
    pub fn is_started(&self) -> bool {
        matches!(self, PluginState::Started)
    }

    /// Check if the plugin is stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, PluginState::Stopped)
    }

    /// Check if the plugin has failed
    pub fn is_failed(&self) -> bool {
        matches!(self, PluginState::Failed)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Installed => "installed",
            PluginState::Initialized => "initialized",
            PluginState::Started => "started",
            PluginState::Stopped => "stopped",
            PluginState::Failed => "failed",
            PluginState::Uninstalled => "uninstalled",
        };
        f.write_str(s)
    }
}

/// Opaque reference to the isolation unit a loader assigned to a plugin
#[derive(Clone)]
pub struct IsolationHandle {
    loader: String,
    token: Arc<dyn Any + Send + Sync>,
}

impl IsolationHandle {
    /// Create a handle owned by `loader`
    pub fn new<T: Any + Send + Sync>(loader: impl Into<String>, token: T) -> Self {
        Self {
            loader: loader.into(),
            token: Arc::new(token),
        }
    }

    /// Handle for plugins compiled into the host
    pub fn in_process() -> Self {
        Self::new("in-process", ())
    }

    /// Name of the loader that produced this handle
    pub fn loader(&self) -> &str {
        &self.loader
    }

    /// Loader-specific payload
    pub fn token<T: Any>(&self) -> Option<&T> {
        self.token.downcast_ref()
    }
}

impl fmt::Debug for IsolationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationHandle")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = PluginDescriptor::new("search", "1.2.0")
            .author("Plexus Team")
            .depends_on(["index>=2.0", "?telemetry"])
            .unwrap()
            .config("shards", "4");

        assert_eq!(descriptor.name, "search");
        assert_eq!(descriptor.dependencies.len(), 2);
        assert_eq!(descriptor.required_dependencies().count(), 1);
        assert_eq!(descriptor.configuration["shards"], "4");
    }

    #[test]
    fn test_supports_platform() {
        let open = PluginDescriptor::new("a", "1.0");
        assert!(open.supports_platform("0.1"));

        let ranged = PluginDescriptor::new("b", "1.0").platform_range(Some("2.0"), Some("2.4"));
        assert!(ranged.supports_platform("2.0.0"));
        assert!(ranged.supports_platform("2.4.0-SNAPSHOT"));
        assert!(!ranged.supports_platform("1.9.9"));
        assert!(!ranged.supports_platform("2.5"));
    }

    #[test]
    fn test_descriptor_rejects_bad_token() {
        assert!(PluginDescriptor::new("a", "1.0").depends_on(["b=>1"]).is_err());
    }

    #[test]
    fn test_state_machine() {
        use PluginState::*;
        assert!(Installed.can_transition_to(Initialized));
        assert!(Stopped.can_transition_to(Started));
        assert!(Failed.can_transition_to(Stopped));
        assert!(Failed.can_transition_to(Uninstalled));
        assert!(!Failed.can_transition_to(Started));
        assert!(!Installed.can_transition_to(Started));
        assert!(!Started.can_transition_to(Uninstalled));
        assert!(!Uninstalled.can_transition_to(Installed));
    }

    #[test]
    fn test_plugin_state() {
        let state = PluginState::Started;
        assert!(state.is_started());
        assert!(!state.is_stopped());
        assert!(!state.is_failed());
        assert_eq!(state.to_string(), "started");
        assert_eq!(serde_json::to_string(&PluginState::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert_eq!(HealthStatus::Degraded("slow".into()).message(), Some("slow"));
    }

    #[test]
    fn test_isolation_handle_token() {
        let handle = IsolationHandle::new("dylib", 42u32);
        assert_eq!(handle.loader(), "dylib");
        assert_eq!(handle.token::<u32>(), Some(&42));
        assert!(handle.token::<String>().is_none());
    }
}
