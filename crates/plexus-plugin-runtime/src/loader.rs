//! Plugin loaders
//!
//! A loader turns a descriptor into a runnable hook object plus an opaque
//! [`IsolationHandle`], and releases that handle again on uninstall. How the
//! code is fetched or isolated is up to the loader; the runtime only ever
//! sees the trait.

use crate::error::{PluginRuntimeError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use plexus_plugin_api::{IsolationHandle, Plugin, PluginDescriptor};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Hook object and isolation unit produced by a loader
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    /// Lifecycle hooks
    pub plugin: Arc<dyn Plugin>,

    /// Isolation unit to release on uninstall
    pub isolation: IsolationHandle,
}

/// Source of plugin code
#[async_trait]
pub trait PluginLoader: Send + Sync + fmt::Debug {
    /// Name recorded on the isolation handles this loader produces
    fn name(&self) -> &str;

    /// Produce the hooks for `descriptor`
    async fn load(&self, descriptor: &PluginDescriptor) -> Result<LoadedPlugin>;

    /// Release an isolation unit after the plugin was uninstalled
    async fn release(&self, _plugin_id: &str, _isolation: IsolationHandle) -> Result<()> {
        Ok(())
    }
}

/// Factory producing the hook object for a statically linked plugin
pub type PluginFactory = Arc<dyn Fn(&PluginDescriptor) -> Arc<dyn Plugin> + Send + Sync>;

/// Loader for plugins compiled into the host
///
/// Factories are keyed by plugin id. The isolation handle carries the id
/// as its token.
#[derive(Default)]
pub struct StaticLoader {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl StaticLoader {
    /// Loader name recorded on isolation handles
    pub const NAME: &'static str = "static";

    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `plugin_id`
    pub fn register<F>(&self, plugin_id: impl Into<String>, factory: F) -> &Self
    where
        F: Fn(&PluginDescriptor) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.write().insert(plugin_id.into(), Arc::new(factory));
        self
    }

    /// Register a single shared instance for `plugin_id`
    pub fn register_instance(&self, plugin_id: impl Into<String>, plugin: Arc<dyn Plugin>) -> &Self {
        self.register(plugin_id, move |_| Arc::clone(&plugin))
    }

    /// Whether a factory exists for `plugin_id`
    pub fn contains(&self, plugin_id: &str) -> bool {
        self.factories.read().contains_key(plugin_id)
    }
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<String> = self.factories.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("StaticLoader").field("plugins", &ids).finish()
    }
}

#[async_trait]
impl PluginLoader for StaticLoader {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn load(&self, descriptor: &PluginDescriptor) -> Result<LoadedPlugin> {
        let factory = self
            .factories
            .read()
            .get(&descriptor.id)
            .cloned()
            .ok_or_else(|| PluginRuntimeError::loader(&descriptor.id, "no static factory registered"))?;

        Ok(LoadedPlugin {
            plugin: factory(descriptor),
            isolation: IsolationHandle::new(Self::NAME, descriptor.id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_plugin_api::testing::MockPlugin;

    #[tokio::test]
    async fn test_static_loader() {
        let loader = StaticLoader::new();
        loader.register("cache", |_| -> Arc<dyn Plugin> { Arc::new(MockPlugin::new()) });
        loader.register_instance("search", Arc::new(MockPlugin::new()));

        let loaded = loader.load(&PluginDescriptor::new("cache", "1.0")).await.unwrap();
        assert_eq!(loaded.isolation.loader(), "static");
        assert_eq!(loaded.isolation.token::<String>().map(String::as_str), Some("cache"));
        assert!(loader.contains("search"));
        assert!(!loader.contains("ghost"));
    }

    #[tokio::test]
    async fn test_static_loader_unknown_plugin() {
        let loader = StaticLoader::new();
        let err = loader.load(&PluginDescriptor::new("ghost", "1.0")).await.unwrap_err();
        assert!(matches!(err, PluginRuntimeError::Loader { ref plugin, .. } if plugin == "ghost"));
    }
}
