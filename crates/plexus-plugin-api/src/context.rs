//! Context handed to plugin lifecycle hooks

use crate::error::ExtensionError;
use crate::extension::{ExtensionHandle, ExtensionRegistrar};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-invocation context for a lifecycle hook
///
/// Carries the plugin's configuration, a registrar scoped to the plugin, and
/// the cancellation signal for this invocation. Hooks that run for a long
/// time should watch [`cancelled`](Self::cancelled): the runtime stops
/// waiting on timeout or cancellation, but cannot interrupt a hook that
/// ignores the signal.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    configuration: HashMap<String, String>,
    registrar: Arc<dyn ExtensionRegistrar>,
    cancellation: CancellationToken,
}

impl PluginContext {
    /// Create a new plugin context
    pub fn new(
        plugin_id: impl Into<String>,
        configuration: HashMap<String, String>,
        registrar: Arc<dyn ExtensionRegistrar>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            configuration,
            registrar,
            cancellation,
        }
    }

    /// Id of the plugin this context belongs to
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Full configuration map
    pub fn configuration(&self) -> &HashMap<String, String> {
        &self.configuration
    }

    /// Get a configuration value
    pub fn config(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).map(String::as_str)
    }

    /// Contribute an extension owned by this plugin
    pub fn register_extension(
        &self,
        point_id: &str,
        handle: ExtensionHandle,
        priority: i32,
    ) -> Result<(), ExtensionError> {
        self.registrar
            .register_extension(point_id, &self.plugin_id, handle, priority)
    }

    /// Withdraw an extension owned by this plugin
    pub fn unregister_extension(
        &self,
        point_id: &str,
        handle: &ExtensionHandle,
    ) -> Result<(), ExtensionError> {
        self.registrar
            .unregister_extension(point_id, &self.plugin_id, handle)
    }

    /// Whether the runtime has given up on this invocation
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once the runtime gives up on this invocation
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("configuration", &self.configuration)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}
