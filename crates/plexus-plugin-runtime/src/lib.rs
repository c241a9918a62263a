//! # Plexus Plugin Runtime
//!
//! Runtime and lifecycle management for Plexus plugins.
//!
//! ## Features
//!
//! - **Dependency Resolution**: activation order from dependency declarations
//! - **Lifecycle Management**: install, initialize, start, stop, uninstall
//! - **Extension Registry**: prioritized extensions kept in step with plugin state
//! - **Loaders**: pluggable sources of plugin code, with a static loader built in
//!
//! ## Example
//!
//! ```rust,no_run
//! use plexus_plugin_runtime::prelude::*;
//! use std::sync::Arc;
//!
//! pub trait Formatter: Send + Sync {
//!     fn format(&self, input: &str) -> String;
//! }
//!
//! # async fn example(plugin: Arc<dyn Plugin>) -> plexus_plugin_runtime::Result<()> {
//! let manager = PluginManager::default();
//! manager
//!     .extensions()
//!     .register_extension_point(ExtensionPoint::new::<dyn Formatter>("formatter"))?;
//!
//! manager.register(PluginDescriptor::new("upper", "1.0.0"), plugin)?;
//! manager.start_all().await?;
//!
//! for formatter in manager.extensions().query::<dyn Formatter>("formatter")? {
//!     println!("{}", formatter.format("hello"));
//! }
//!
//! manager.stop_all().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod events;
pub mod extensions;
mod hooks;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod resolver;

pub use error::{HookKind, PluginRuntimeError, Result};
pub use events::LifecycleEvent;
pub use extensions::{ExtensionRecord, ExtensionRegistry};
pub use loader::{LoadedPlugin, PluginFactory, PluginLoader, StaticLoader};
pub use manager::{ManagerOptions, PluginManager, PluginStats};
pub use manifest::{load_manifest, load_manifests, parse_manifest};
pub use registry::{PluginEntry, PluginInfo, PluginRegistry};
pub use resolver::{resolve_for, resolve_from, resolve_order};

// Re-export plugin API types for convenience
pub use plexus_plugin_api::{
    ExtensionError, ExtensionHandle, ExtensionPoint, HealthStatus, Plugin, PluginContext,
    PluginDescriptor, PluginError, PluginState,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::error::{PluginRuntimeError, Result};
    pub use crate::extensions::ExtensionRegistry;
    pub use crate::loader::{PluginLoader, StaticLoader};
    pub use crate::manager::{ManagerOptions, PluginManager};
    pub use plexus_config::{BatchMode, StopPolicy};
    pub use plexus_plugin_api::prelude::*;
}
