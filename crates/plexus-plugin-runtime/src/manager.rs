//! Plugin manager for high-level plugin operations
//!
//! The manager drives plugins through their lifecycle: it consults the
//! resolver, runs hooks with a time budget, commits state transitions and
//! keeps the extension registry in step with them.

use crate::error::{HookKind, PluginRuntimeError, Result};
use crate::events::LifecycleEvent;
use crate::extensions::ExtensionRegistry;
use crate::hooks::run_hook;
use crate::loader::{PluginLoader, StaticLoader};
use crate::manifest::load_manifest;
use crate::registry::{PluginEntry, PluginInfo, PluginRegistry};
use crate::resolver::resolve_from;
use plexus_config::{BatchMode, RuntimeConfig, StopPolicy};
use plexus_plugin_api::{
    ExtensionRegistrar, HealthStatus, IsolationHandle, Plugin, PluginContext, PluginDescriptor,
    PluginState,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Manager settings
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerOptions {
    /// Host platform version checked against plugin platform ranges
    pub platform_version: String,

    /// Budget for a single hook invocation
    pub hook_timeout: Duration,

    /// What [`PluginManager::stop`] does when started dependents exist
    pub stop_policy: StopPolicy,

    /// How batch operations react to individual failures
    pub batch_mode: BatchMode,

    /// Lifecycle event buffer per subscriber
    pub event_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for ManagerOptions {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            platform_version: config.platform_version.clone(),
            hook_timeout: config.hook_timeout,
            stop_policy: config.stop_policy,
            batch_mode: config.batch_mode,
            event_capacity: config.event_capacity,
        }
    }
}

struct ManagerInner {
    registry: PluginRegistry,
    extensions: ExtensionRegistry,
    loader: Arc<dyn PluginLoader>,
    options: ManagerOptions,
}

/// Plugin lifecycle manager
///
/// Cheap to clone; clones drive the same set of plugins. Operations on
/// different plugins run concurrently, operations on the same plugin are
/// applied one at a time.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

impl PluginManager {
    /// Create a manager that installs plugins through `loader`
    pub fn new(loader: Arc<dyn PluginLoader>, options: ManagerOptions) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                registry: PluginRegistry::new(options.event_capacity),
                extensions: ExtensionRegistry::new(),
                loader,
                options,
            }),
        }
    }

    /// Create a manager from runtime configuration
    pub fn from_config(loader: Arc<dyn PluginLoader>, config: &RuntimeConfig) -> Self {
        Self::new(loader, ManagerOptions::from(config))
    }

    /// Settings in use
    pub fn options(&self) -> &ManagerOptions {
        &self.inner.options
    }

    /// Extension registry kept in step with plugin states
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.inner.extensions
    }

    /// Underlying plugin registry
    pub fn registry(&self) -> &PluginRegistry {
        &self.inner.registry
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.registry.subscribe()
    }

    /// Load `descriptor` through the loader and register it
    ///
    /// # Errors
    ///
    /// - [`PluginRuntimeError::IncompatiblePlatform`] if the host version is
    ///   outside the plugin's platform range
    /// - [`PluginRuntimeError::DuplicateId`] if the id is taken
    /// - [`PluginRuntimeError::Loader`] if the loader fails
    pub async fn install(&self, descriptor: PluginDescriptor) -> Result<()> {
        self.check_platform(&descriptor)?;

        if self.inner.registry.contains(&descriptor.id) {
            return Err(PluginRuntimeError::already_exists(&descriptor.id));
        }

        let loaded = self.inner.loader.load(&descriptor).await?;
        let id = descriptor.id.clone();
        let entry = PluginEntry::new(descriptor, loaded.plugin, loaded.isolation.clone());

        if let Err(e) = self.inner.registry.insert(entry) {
            // Lost a race for the same id
            if let Err(release) = self.inner.loader.release(&id, loaded.isolation).await {
                warn!(plugin = %id, error = %release, "Failed to release isolation unit");
            }
            return Err(e);
        }

        Ok(())
    }

    /// Install every plugin declared in a manifest, returning their ids
    pub async fn install_manifest(&self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for descriptor in load_manifest(path)? {
            let id = descriptor.id.clone();
            self.install(descriptor).await?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Register a plugin whose hooks are already in hand
    pub fn register(&self, descriptor: PluginDescriptor, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.check_platform(&descriptor)?;
        let entry = PluginEntry::new(descriptor, plugin, IsolationHandle::in_process());
        self.inner.registry.insert(entry).map(|_| ())
    }

    /// Run the init hook of an installed plugin
    pub async fn initialize(&self, id: &str) -> Result<()> {
        let entry = self.inner.registry.get(id)?;
        let _op = entry.op_lock.lock().await;
        self.initialize_locked(&entry).await
    }

    async fn initialize_locked(&self, entry: &PluginEntry) -> Result<()> {
        let state = entry.state();
        if state != PluginState::Installed {
            return Err(PluginRuntimeError::invalid_state(entry.id(), "initialize", state));
        }

        match self.invoke(entry, HookKind::Init).await {
            Ok(()) => {
                self.inner
                    .registry
                    .commit(entry, "initialize", PluginState::Initialized, None)?;
                Ok(())
            }
            Err(e) => Err(self.fail(entry, "initialize", e)),
        }
    }

    /// Start a plugin whose required dependencies are running
    ///
    /// Dependencies are not started implicitly. If one is missing, has an
    /// incompatible version or is not started, the plugin moves to `Failed`
    /// with the blocking dependency as its cause.
    pub async fn start(&self, id: &str) -> Result<()> {
        let entry = self.inner.registry.get(id)?;
        let _op = entry.op_lock.lock().await;
        self.start_locked(&entry).await
    }

    async fn start_locked(&self, entry: &PluginEntry) -> Result<()> {
        let id = entry.id();
        let state = entry.state();
        if !matches!(state, PluginState::Initialized | PluginState::Stopped) {
            return Err(PluginRuntimeError::invalid_state(id, "start", state));
        }

        let descriptors = self.inner.registry.descriptors();
        if let Err(e) = resolve_from(&descriptors, &[id]) {
            return Err(self.fail(entry, "start", e));
        }

        if let Err(e) = self.inner.registry.claim_start(entry) {
            return Err(self.fail(entry, "start", e));
        }

        self.inner.extensions.admit(id);

        match self.invoke(entry, HookKind::Start).await {
            Ok(()) => {
                if let Err(e) = self
                    .inner
                    .registry
                    .commit(entry, "start", PluginState::Started, None)
                {
                    self.inner.extensions.revoke(id);
                    return Err(e);
                }
                Ok(())
            }
            Err(e) => {
                self.inner.extensions.revoke(id);
                Err(self.fail(entry, "start", e))
            }
        }
    }

    /// Stop a plugin using the configured stop policy
    pub async fn stop(&self, id: &str) -> Result<()> {
        self.stop_with(id, self.inner.options.stop_policy).await
    }

    /// Stop a plugin
    ///
    /// With [`StopPolicy::Refuse`] the call fails if started plugins require
    /// `id`. With [`StopPolicy::Cascade`] those plugins are stopped first,
    /// dependents before their dependencies.
    pub async fn stop_with(&self, id: &str, policy: StopPolicy) -> Result<()> {
        let entry = self.inner.registry.get(id)?;
        let state = entry.state();
        if state != PluginState::Started {
            return Err(PluginRuntimeError::invalid_state(id, "stop", state));
        }

        if policy == StopPolicy::Cascade {
            let dependents = self.inner.registry.stop_order(id);
            if !dependents.is_empty() {
                info!(plugin = %id, dependents = ?dependents, "Stopping dependents first");
            }
            for dependent in dependents {
                let dependent = self.inner.registry.get(&dependent)?;
                let _op = dependent.op_lock.lock().await;
                if dependent.state() == PluginState::Started {
                    self.stop_locked(&dependent).await?;
                }
            }
        }

        let _op = entry.op_lock.lock().await;
        self.stop_locked(&entry).await
    }

    async fn stop_locked(&self, entry: &PluginEntry) -> Result<()> {
        let id = entry.id();
        self.inner.registry.claim_stop(entry)?;

        let outcome = self.invoke(entry, HookKind::Stop).await;
        let purged = self.inner.extensions.revoke(id);
        debug!(plugin = %id, purged, "Extensions withdrawn");

        match outcome {
            Ok(()) => {
                self.inner
                    .registry
                    .commit(entry, "stop", PluginState::Stopped, None)?;
                Ok(())
            }
            Err(e) => Err(self.fail(entry, "stop", e)),
        }
    }

    /// Remove a stopped or failed plugin
    ///
    /// Runs the uninstall hook, has the loader release the isolation unit,
    /// then deletes the record.
    pub async fn uninstall(&self, id: &str) -> Result<()> {
        let entry = self.inner.registry.get(id)?;
        let _op = entry.op_lock.lock().await;

        let state = entry.state();
        if !matches!(state, PluginState::Stopped | PluginState::Failed) {
            return Err(PluginRuntimeError::invalid_state(id, "uninstall", state));
        }

        if let Err(e) = self.invoke(&entry, HookKind::Uninstall).await {
            return Err(self.fail(&entry, "uninstall", e));
        }

        self.inner.extensions.revoke(id);

        if entry.isolation.loader() != IsolationHandle::in_process().loader() {
            if let Err(e) = self
                .inner
                .loader
                .release(id, entry.isolation.clone())
                .await
            {
                warn!(plugin = %id, error = %e, "Failed to release isolation unit");
            }
        }

        self.inner
            .registry
            .commit(&entry, "uninstall", PluginState::Uninstalled, None)?;
        self.inner.registry.remove(id);

        Ok(())
    }

    /// Move a failed plugin back to `Stopped` so it can be restarted
    pub async fn reset(&self, id: &str) -> Result<()> {
        let entry = self.inner.registry.get(id)?;
        let _op = entry.op_lock.lock().await;

        let state = entry.state();
        if state != PluginState::Failed {
            return Err(PluginRuntimeError::invalid_state(id, "reset", state));
        }

        self.inner.extensions.revoke(id);
        self.inner
            .registry
            .commit(&entry, "reset", PluginState::Stopped, None)?;
        Ok(())
    }

    /// Cancel the hook currently running for `id`
    ///
    /// Returns whether a hook was in flight. The interrupted operation fails
    /// with [`PluginRuntimeError::Cancelled`] and the plugin moves to `Failed`.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let entry = self.inner.registry.get(id)?;
        let inflight = entry.inflight.lock();
        match inflight.as_ref() {
            Some(token) => {
                info!(plugin = %id, "Cancelling lifecycle hook");
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the configuration handed to the plugin's hooks
    pub fn update_configuration(
        &self,
        id: &str,
        configuration: HashMap<String, String>,
    ) -> Result<()> {
        let entry = self.inner.registry.get(id)?;
        entry.status.write().configuration = configuration;
        debug!(plugin = %id, "Configuration updated");
        Ok(())
    }

    /// Initialize and start every installed plugin
    pub async fn start_all(&self) -> Result<()> {
        let ids: Vec<String> = self
            .inner
            .registry
            .descriptors()
            .into_iter()
            .map(|d| d.id)
            .collect();
        self.start_many(&ids).await
    }

    /// Start `ids` in dependency order
    ///
    /// Installed plugins are initialized first and started ones are skipped.
    /// A resolver error aborts the batch before any hook runs.
    pub async fn start_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        let roots: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
        let candidates: HashSet<&str> = roots.iter().copied().collect();

        let descriptors = self.inner.registry.descriptors();
        let order: Vec<String> = resolve_from(&descriptors, &roots)?
            .into_iter()
            .filter(|id| candidates.contains(id.as_str()))
            .collect();

        info!(count = order.len(), "Starting plugins");

        let mut failures = Vec::new();
        for id in order {
            match self.bring_up(&id).await {
                Ok(()) => {}
                Err(e) if self.inner.options.batch_mode == BatchMode::FailFast => return Err(e),
                Err(e) => {
                    warn!(plugin = %id, error = %e, "Failed to start plugin");
                    failures.push((id, e));
                }
            }
        }

        batch_result(failures)
    }

    async fn bring_up(&self, id: &str) -> Result<()> {
        let entry = self.inner.registry.get(id)?;
        let _op = entry.op_lock.lock().await;

        match entry.state() {
            PluginState::Started => Ok(()),
            PluginState::Installed => {
                self.initialize_locked(&entry).await?;
                self.start_locked(&entry).await
            }
            _ => self.start_locked(&entry).await,
        }
    }

    /// Stop every started plugin, dependents first
    pub async fn stop_all(&self) -> Result<()> {
        let ids: Vec<String> = self
            .list_by_state(PluginState::Started)
            .into_iter()
            .map(|info| info.descriptor.id)
            .collect();
        self.stop_many(&ids).await
    }

    /// Stop the started plugins among `ids` in reverse dependency order
    pub async fn stop_many<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        let roots: Vec<&str> = ids
            .iter()
            .map(AsRef::as_ref)
            .filter(|id| {
                self.inner
                    .registry
                    .get(id)
                    .map(|entry| entry.state() == PluginState::Started)
                    .unwrap_or(false)
            })
            .collect();
        let candidates: HashSet<&str> = roots.iter().copied().collect();

        let descriptors = self.inner.registry.descriptors();
        let mut order: Vec<String> = resolve_from(&descriptors, &roots)?
            .into_iter()
            .filter(|id| candidates.contains(id.as_str()))
            .collect();
        order.reverse();

        info!(count = order.len(), "Stopping plugins");

        let mut failures = Vec::new();
        for id in order {
            let result = match self.inner.registry.get(&id) {
                Ok(entry) if entry.state() == PluginState::Started => self.stop(&id).await,
                Ok(_) => Ok(()),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {}
                Err(e) if self.inner.options.batch_mode == BatchMode::FailFast => return Err(e),
                Err(e) => {
                    warn!(plugin = %id, error = %e, "Failed to stop plugin");
                    failures.push((id, e));
                }
            }
        }

        batch_result(failures)
    }

    /// Activation order of every installed plugin
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        crate::resolver::resolve_order(&self.inner.registry.descriptors())
    }

    /// Snapshot of one plugin
    pub fn get(&self, id: &str) -> Option<PluginInfo> {
        self.inner.registry.get(id).ok().map(|entry| entry.info())
    }

    /// Snapshot of every plugin, sorted by id
    pub fn list(&self) -> Vec<PluginInfo> {
        self.inner.registry.snapshot()
    }

    /// Plugins currently in `state`
    pub fn list_by_state(&self, state: PluginState) -> Vec<PluginInfo> {
        self.list()
            .into_iter()
            .filter(|info| info.state == state)
            .collect()
    }

    /// Installed plugins that declare a required dependency on `id`
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        self.inner.registry.dependents_of(id)
    }

    /// Check if a plugin exists
    pub fn exists(&self, id: &str) -> bool {
        self.inner.registry.contains(id)
    }

    /// Health of every started plugin
    ///
    /// A check that errors or exceeds the hook timeout reports `Unhealthy`.
    pub async fn health_check_all(&self) -> Vec<(String, HealthStatus)> {
        let mut results = Vec::new();

        for info in self.list_by_state(PluginState::Started) {
            let id = info.descriptor.id;
            let Ok(entry) = self.inner.registry.get(&id) else {
                continue;
            };

            let status = match tokio::time::timeout(
                self.inner.options.hook_timeout,
                entry.plugin.health_check(),
            )
            .await
            {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => HealthStatus::Unhealthy(e.to_string()),
                Err(_) => HealthStatus::Unhealthy("health check timed out".to_string()),
            };
            results.push((id, status));
        }

        results
    }

    /// Get plugin statistics
    pub fn stats(&self) -> PluginStats {
        let plugins = self.list();
        let count = |state: PluginState| plugins.iter().filter(|p| p.state == state).count();

        PluginStats {
            total: plugins.len(),
            installed: count(PluginState::Installed),
            initialized: count(PluginState::Initialized),
            started: count(PluginState::Started),
            stopped: count(PluginState::Stopped),
            failed: count(PluginState::Failed),
            extension_points: self.inner.extensions.points().len(),
        }
    }

    fn check_platform(&self, descriptor: &PluginDescriptor) -> Result<()> {
        let platform = &self.inner.options.platform_version;
        if !descriptor.supports_platform(platform) {
            return Err(PluginRuntimeError::IncompatiblePlatform {
                plugin: descriptor.id.clone(),
                platform: platform.clone(),
                min: descriptor.min_platform_version.clone(),
                max: descriptor.max_platform_version.clone(),
            });
        }
        Ok(())
    }

    async fn invoke(&self, entry: &PluginEntry, hook: HookKind) -> Result<()> {
        let token = CancellationToken::new();
        *entry.inflight.lock() = Some(token.clone());

        let registrar: Arc<dyn ExtensionRegistrar> =
            Arc::new(self.inner.extensions.scoped(entry.id(), token.clone()));
        let configuration = entry.status.read().configuration.clone();
        let ctx = PluginContext::new(entry.id(), configuration, registrar, token.clone());

        debug!(plugin = %entry.id(), hook = %hook, "Invoking hook");
        let result = run_hook(
            Arc::clone(&entry.plugin),
            hook,
            ctx,
            token,
            self.inner.options.hook_timeout,
        )
        .await;

        *entry.inflight.lock() = None;
        result
    }

    // Record `cause` on the plugin and hand it back to the caller
    fn fail(
        &self,
        entry: &PluginEntry,
        operation: &'static str,
        cause: PluginRuntimeError,
    ) -> PluginRuntimeError {
        error!(plugin = %entry.id(), operation, error = %cause, "Plugin failed");

        if let Err(e) = self
            .inner
            .registry
            .commit(entry, operation, PluginState::Failed, Some(cause.clone()))
        {
            warn!(plugin = %entry.id(), error = %e, "Could not record failure");
        }
        cause
    }
}

fn batch_result(failures: Vec<(String, PluginRuntimeError)>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(PluginRuntimeError::Batch { failures })
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(Arc::new(StaticLoader::new()), ManagerOptions::default())
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.inner.registry)
            .field("extensions", &self.inner.extensions)
            .field("loader", &self.inner.loader)
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Plugin statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PluginStats {
    /// Total number of plugins
    pub total: usize,

    /// Installed, not yet initialized
    pub installed: usize,

    /// Initialized, never started
    pub initialized: usize,

    /// Running plugins
    pub started: usize,

    /// Stopped plugins
    pub stopped: usize,

    /// Failed plugins
    pub failed: usize,

    /// Declared extension points
    pub extension_points: usize,
}
