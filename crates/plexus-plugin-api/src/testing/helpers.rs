//! Test helpers for exercising plugins without a runtime

use crate::context::PluginContext;
use crate::error::ExtensionError;
use crate::extension::{ExtensionHandle, ExtensionRegistrar};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Extension registered through a [`RecordingRegistrar`]
#[derive(Debug, Clone)]
pub struct RecordedExtension {
    /// Extension point id
    pub point: String,
    /// Owner plugin id
    pub owner: String,
    /// Registered handle
    pub handle: ExtensionHandle,
    /// Priority
    pub priority: i32,
}

/// Registrar that accepts everything and remembers it
#[derive(Debug, Clone, Default)]
pub struct RecordingRegistrar {
    records: Arc<Mutex<Vec<RecordedExtension>>>,
}

impl RecordingRegistrar {
    /// Create an empty registrar
    pub fn new() -> Self {
        Self::default()
    }

    /// Extensions currently registered
    pub fn extensions(&self) -> Vec<RecordedExtension> {
        self.records.lock().unwrap().clone()
    }
}

impl ExtensionRegistrar for RecordingRegistrar {
    fn register_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: ExtensionHandle,
        priority: i32,
    ) -> Result<(), ExtensionError> {
        self.records.lock().unwrap().push(RecordedExtension {
            point: point_id.to_string(),
            owner: owner.to_string(),
            handle,
            priority,
        });
        Ok(())
    }

    fn unregister_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: &ExtensionHandle,
    ) -> Result<(), ExtensionError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| !(r.point == point_id && r.owner == owner && r.handle == *handle));
        if records.len() == before {
            return Err(ExtensionError::ExtensionNotFound {
                point: point_id.to_string(),
                owner: owner.to_string(),
            });
        }
        Ok(())
    }
}

/// Build a context for `plugin_id` backed by `registrar`
pub fn test_context(
    plugin_id: &str,
    configuration: HashMap<String, String>,
    registrar: RecordingRegistrar,
) -> PluginContext {
    PluginContext::new(
        plugin_id,
        configuration,
        Arc::new(registrar),
        CancellationToken::new(),
    )
}
