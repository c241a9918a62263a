//! Plugin manifests
//!
//! A manifest declares one plugin, or several under a `plugins` key, in
//! YAML, TOML or JSON. Dependency entries use the usual token grammar and
//! are validated while the manifest is parsed.
//!
//! ```yaml
//! plugins:
//!   - id: search
//!     version: 1.4.0
//!     dependencies: ["index>=2.0", "?telemetry"]
//!     configuration:
//!       shards: "4"
//! ```

use crate::error::{PluginRuntimeError, Result};
use plexus_config::ConfigFormat;
use plexus_plugin_api::PluginDescriptor;
use serde_json::Value;
use std::path::Path;

/// Load the descriptors declared in a manifest file
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<PluginDescriptor>> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let document: Value = plexus_config::load_document(path).map_err(|e| invalid(&label, e))?;
    into_descriptors(document).map_err(|e| invalid(&label, e))
}

/// Load several manifests, keeping declaration order
pub fn load_manifests<I, P>(paths: I) -> Result<Vec<PluginDescriptor>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut descriptors = Vec::new();
    for path in paths {
        descriptors.extend(load_manifest(path)?);
    }
    Ok(descriptors)
}

/// Parse manifest content that did not come from a file
pub fn parse_manifest(content: &str, format: ConfigFormat) -> Result<Vec<PluginDescriptor>> {
    let document: Value =
        plexus_config::parse_document(content, format).map_err(|e| invalid("<inline>", e))?;
    into_descriptors(document).map_err(|e| invalid("<inline>", e))
}

// Each entry is decoded on its own so a bad field is reported with the
// plugin it belongs to.
fn into_descriptors(document: Value) -> std::result::Result<Vec<PluginDescriptor>, String> {
    let entries = match document {
        Value::Object(mut map) if map.contains_key("plugins") => match map.remove("plugins") {
            Some(Value::Array(entries)) => entries,
            _ => return Err("`plugins` must be a list of plugin descriptors".to_string()),
        },
        single => vec![single],
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let id = entry.get("id").and_then(Value::as_str).map(str::to_string);
            serde_json::from_value(entry).map_err(|e| match id {
                Some(id) => format!("plugin '{id}': {e}"),
                None => format!("plugin #{}: {e}", index + 1),
            })
        })
        .collect()
}

fn invalid(path: &str, message: impl std::fmt::Display) -> PluginRuntimeError {
    PluginRuntimeError::Manifest {
        path: path.to_string(),
        message: message.to_string(),
    }
}
