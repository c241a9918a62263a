//! Plugin records and their bookkeeping
//!
//! The registry owns one [`PluginEntry`] per installed plugin. State lives
//! behind a short-lived `parking_lot` lock on each entry; lifecycle
//! operations on the same plugin are serialized by the entry's async
//! operation lock, which is the only lock held while a hook runs.
//!
//! Decisions that span several plugins (may this plugin start, may that one
//! stop) are taken as *claims* under an exclusive registry gate, while
//! single-plugin commits take the gate shared. A claim therefore sees every
//! plugin's state as of one instant, and a dependency can never be stopped
//! between a dependent's check and its start. Installs and removals also
//! take the gate exclusively, so the descriptor set handed to the resolver
//! is the membership of one instant.

use crate::error::{PluginRuntimeError, Result};
use crate::events::LifecycleEvent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use plexus_plugin_api::{IsolationHandle, Plugin, PluginDescriptor, PluginState};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug)]
pub(crate) struct Status {
    pub(crate) state: PluginState,
    pub(crate) failure: Option<PluginRuntimeError>,
    pub(crate) configuration: HashMap<String, String>,
    pub(crate) last_started_at: Option<DateTime<Utc>>,
    // Set by a successful claim, cleared by the next commit
    pub(crate) starting: bool,
    pub(crate) stopping: bool,
}

/// Installed plugin
pub struct PluginEntry {
    pub(crate) descriptor: PluginDescriptor,
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) isolation: IsolationHandle,
    pub(crate) installed_at: DateTime<Utc>,
    pub(crate) status: RwLock<Status>,
    pub(crate) op_lock: tokio::sync::Mutex<()>,
    pub(crate) inflight: Mutex<Option<CancellationToken>>,
}

impl PluginEntry {
    pub(crate) fn new(
        descriptor: PluginDescriptor,
        plugin: Arc<dyn Plugin>,
        isolation: IsolationHandle,
    ) -> Self {
        let configuration = descriptor.configuration.clone();
        Self {
            descriptor,
            plugin,
            isolation,
            installed_at: Utc::now(),
            status: RwLock::new(Status {
                state: PluginState::Installed,
                failure: None,
                configuration,
                last_started_at: None,
                starting: false,
                stopping: false,
            }),
            op_lock: tokio::sync::Mutex::new(()),
            inflight: Mutex::new(None),
        }
    }

    /// Plugin id
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    /// Static description
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Current state
    pub fn state(&self) -> PluginState {
        self.status.read().state
    }

    /// Point-in-time copy of the record
    pub fn info(&self) -> PluginInfo {
        let status = self.status.read();
        PluginInfo {
            descriptor: self.descriptor.clone(),
            state: status.state,
            failure: status.failure.as_ref().map(ToString::to_string),
            configuration: status.configuration.clone(),
            installed_at: self.installed_at,
            last_started_at: status.last_started_at,
            loader: self.isolation.loader().to_string(),
        }
    }
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("id", &self.descriptor.id)
            .field("version", &self.descriptor.version)
            .field("state", &self.state())
            .field("installed_at", &self.installed_at)
            .finish()
    }
}

/// Snapshot of a plugin record
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    /// Static description
    pub descriptor: PluginDescriptor,

    /// Lifecycle state
    pub state: PluginState,

    /// Cause of the last failure, while the plugin is failed
    pub failure: Option<String>,

    /// Current configuration
    pub configuration: HashMap<String, String>,

    /// When the plugin was installed
    pub installed_at: DateTime<Utc>,

    /// When the plugin last reached `Started`
    pub last_started_at: Option<DateTime<Utc>>,

    /// Loader that owns the plugin's isolation unit
    pub loader: String,
}

/// Store of installed plugins
#[derive(Debug)]
pub struct PluginRegistry {
    plugins: DashMap<String, Arc<PluginEntry>>,
    gate: RwLock<()>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl PluginRegistry {
    /// Create an empty registry whose event channel buffers `event_capacity`
    /// events per subscriber
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            plugins: DashMap::new(),
            gate: RwLock::new(()),
            events,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Whether `id` is installed
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// Look up a plugin
    pub fn get(&self, id: &str) -> Result<Arc<PluginEntry>> {
        self.plugins
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PluginRuntimeError::not_found(id))
    }

    /// Descriptors of every installed plugin, as of one instant
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        let _gate = self.gate.read();
        self.plugins
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Consistent snapshot of every record, sorted by id
    pub fn snapshot(&self) -> Vec<PluginInfo> {
        let _gate = self.gate.write();
        let mut infos: Vec<PluginInfo> = self.plugins.iter().map(|entry| entry.info()).collect();
        infos.sort_by(|a, b| a.descriptor.id.cmp(&b.descriptor.id));
        infos
    }

    pub(crate) fn insert(&self, entry: PluginEntry) -> Result<Arc<PluginEntry>> {
        use dashmap::mapref::entry::Entry;

        let id = entry.descriptor.id.clone();
        let entry = Arc::new(entry);

        {
            let _gate = self.gate.write();
            match self.plugins.entry(id.clone()) {
                Entry::Occupied(_) => return Err(PluginRuntimeError::already_exists(&id)),
                Entry::Vacant(vacant) => {
                    vacant.insert(Arc::clone(&entry));
                }
            }
        }

        info!(plugin = %id, version = %entry.descriptor.version, "Plugin installed");
        self.publish(LifecycleEvent::new(&id, None, PluginState::Installed));
        Ok(entry)
    }

    pub(crate) fn remove(&self, id: &str) {
        let _gate = self.gate.write();
        self.plugins.remove(id);
    }

    /// Move `entry` to `to`, recording `failure` as the cause
    ///
    /// A failed plugin that fails again keeps its state and only has its
    /// cause replaced.
    pub(crate) fn commit(
        &self,
        entry: &PluginEntry,
        operation: &'static str,
        to: PluginState,
        failure: Option<PluginRuntimeError>,
    ) -> Result<PluginState> {
        let from = {
            let _gate = self.gate.read();
            let mut status = entry.status.write();
            let from = status.state;

            let refailing = from == PluginState::Failed && to == PluginState::Failed;
            if !refailing && !from.can_transition_to(to) {
                return Err(PluginRuntimeError::invalid_state(entry.id(), operation, from));
            }

            status.state = to;
            status.failure = failure;
            status.starting = false;
            status.stopping = false;
            if to == PluginState::Started {
                status.last_started_at = Some(Utc::now());
            }

            if refailing {
                return Ok(from);
            }
            from
        };

        info!(plugin = %entry.id(), from = %from, to = %to, "Plugin state changed");
        self.publish(LifecycleEvent::new(entry.id(), Some(from), to));
        Ok(from)
    }

    /// Reserve `entry` for starting
    ///
    /// Every required dependency must be `Started` and not on its way down.
    pub(crate) fn claim_start(&self, entry: &PluginEntry) -> Result<()> {
        let _gate = self.gate.write();

        let state = entry.status.read().state;
        if !matches!(state, PluginState::Initialized | PluginState::Stopped) {
            return Err(PluginRuntimeError::invalid_state(entry.id(), "start", state));
        }

        for dep in entry.descriptor.required_dependencies() {
            let Some(dependency) = self.plugins.get(&dep.target) else {
                return Err(PluginRuntimeError::DependencyNotFound {
                    plugin: entry.id().to_string(),
                    dependency: dep.target.clone(),
                });
            };

            let status = dependency.status.read();
            if status.state != PluginState::Started || status.stopping {
                return Err(PluginRuntimeError::DependencyNotStarted {
                    plugin: entry.id().to_string(),
                    dependency: dep.target.clone(),
                    state: status.state,
                });
            }
        }

        entry.status.write().starting = true;
        Ok(())
    }

    /// Reserve `entry` for stopping
    ///
    /// Refused while any plugin requiring it is started or starting.
    pub(crate) fn claim_stop(&self, entry: &PluginEntry) -> Result<()> {
        let _gate = self.gate.write();

        let state = entry.status.read().state;
        if state != PluginState::Started {
            return Err(PluginRuntimeError::invalid_state(entry.id(), "stop", state));
        }

        let mut dependents = self.active_dependents(entry.id());
        if !dependents.is_empty() {
            dependents.sort();
            return Err(PluginRuntimeError::DependentsActive {
                plugin: entry.id().to_string(),
                dependents,
            });
        }

        entry.status.write().stopping = true;
        Ok(())
    }

    /// Started plugins that transitively require `id`, in the order they
    /// have to be stopped
    pub(crate) fn stop_order(&self, id: &str) -> Vec<String> {
        fn visit(
            registry: &PluginRegistry,
            id: &str,
            seen: &mut HashSet<String>,
            order: &mut Vec<String>,
        ) {
            for dependent in registry.active_dependents(id) {
                if seen.insert(dependent.clone()) {
                    visit(registry, &dependent, seen, order);
                    order.push(dependent);
                }
            }
        }

        let mut seen = HashSet::new();
        let mut order = Vec::new();
        visit(self, id, &mut seen, &mut order);
        order
    }

    /// Plugins whose descriptors require `id`, in any state
    pub fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut dependents: Vec<String> = self
            .plugins
            .iter()
            .filter(|entry| entry.descriptor.required_dependencies().any(|d| d.target == id))
            .map(|entry| entry.key().clone())
            .collect();
        dependents.sort();
        dependents
    }

    fn active_dependents(&self, id: &str) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|entry| entry.descriptor.required_dependencies().any(|d| d.target == id))
            .filter(|entry| {
                let status = entry.status.read();
                status.state == PluginState::Started || status.starting
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn publish(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}
