//! # Plexus Plugin API
//!
//! This crate provides the SDK for writing plugins that extend a Plexus host.
//!
//! ## Concepts
//!
//! - **Plugins**: installable units with an id, a version and lifecycle hooks
//! - **Dependencies**: `['?']id[op version]` tokens declaring what a plugin needs
//! - **Extension points**: contract slots declared by the host
//! - **Extensions**: prioritized implementations contributed by running plugins
//!
//! ## Example
//!
//! ```rust,no_run
//! use plexus_plugin_api::prelude::*;
//! use std::sync::Arc;
//!
//! pub trait Formatter: Send + Sync {
//!     fn format(&self, input: &str) -> String;
//! }
//!
//! struct Upper;
//! impl Formatter for Upper {
//!     fn format(&self, input: &str) -> String { input.to_uppercase() }
//! }
//!
//! #[derive(Debug)]
//! struct UpperPlugin;
//!
//! #[async_trait]
//! impl Plugin for UpperPlugin {
//!     async fn start(&self, ctx: &PluginContext) -> Result<(), PluginError> {
//!         let formatter: Arc<dyn Formatter> = Arc::new(Upper);
//!         ctx.register_extension("formatter", ExtensionHandle::new(formatter), 10)?;
//!         Ok(())
//!     }
//!
//!     async fn stop(&self, _ctx: &PluginContext) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod context;
pub mod dependency;
pub mod error;
pub mod extension;
pub mod plugin;
pub mod version;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types
pub use context::PluginContext;
pub use dependency::{
    satisfies_constraint, ConstraintOp, DependencySpec, MalformedDependency, VersionConstraint,
};
pub use error::{ExtensionError, PluginError};
pub use extension::{ContractId, ExtensionHandle, ExtensionPoint, ExtensionRegistrar};
pub use plugin::{HealthStatus, IsolationHandle, Plugin, PluginDescriptor, PluginState};
pub use version::compare_versions;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::context::PluginContext;
    pub use crate::dependency::DependencySpec;
    pub use crate::error::{ExtensionError, PluginError};
    pub use crate::extension::{ExtensionHandle, ExtensionPoint};
    pub use crate::plugin::{HealthStatus, Plugin, PluginDescriptor, PluginState};
    pub use async_trait::async_trait;
}
