//! Lifecycle events published by the plugin manager

use chrono::{DateTime, Utc};
use plexus_plugin_api::PluginState;
use serde::Serialize;

/// A committed state transition
///
/// `from` is `None` for the transition that creates the record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    /// Plugin id
    pub plugin_id: String,

    /// Previous state
    pub from: Option<PluginState>,

    /// New state
    pub to: PluginState,

    /// When the transition was committed
    pub at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub(crate) fn new(plugin_id: impl Into<String>, from: Option<PluginState>, to: PluginState) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            from,
            to,
            at: Utc::now(),
        }
    }
}
