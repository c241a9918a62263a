//! # Example Greeter Plugin
//!
//! Demonstrates how a plugin contributes an extension to a host-declared
//! extension point from its start hook.
//!
//! ## Configuration
//!
//! - `greeting`: word put in front of the name (default `Hello`)
//! - `priority`: extension priority, higher wins (default `0`)
//! - `shout`: `true` to upper-case the greeting
//!
//! ## Example
//!
//! ```rust,no_run
//! use example_greeter::{Greeter, GreeterPlugin, GREETER_POINT};
//! use plexus_plugin_runtime::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> plexus_plugin_runtime::Result<()> {
//! let manager = PluginManager::default();
//! manager
//!     .extensions()
//!     .register_extension_point(ExtensionPoint::new::<dyn Greeter>(GREETER_POINT))?;
//!
//! manager.register(GreeterPlugin::descriptor(), Arc::new(GreeterPlugin::new()))?;
//! manager.start_all().await?;
//!
//! if let Some(greeter) = manager.extensions().highest::<dyn Greeter>(GREETER_POINT)? {
//!     println!("{}", greeter.greet("world"));
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use plexus_plugin_api::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Extension point id the host declares for greeters
pub const GREETER_POINT: &str = "greeter";

/// Contract of the greeter extension point
pub trait Greeter: Send + Sync {
    /// Greet `name`
    fn greet(&self, name: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    greeting: String,
    priority: i32,
    shout: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            greeting: "Hello".to_string(),
            priority: 0,
            shout: false,
        }
    }
}

impl Settings {
    fn from_context(ctx: &PluginContext) -> Result<Self, PluginError> {
        let mut settings = Settings::default();

        if let Some(greeting) = ctx.config("greeting") {
            if greeting.trim().is_empty() {
                return Err(PluginError::config("greeting must not be empty"));
            }
            settings.greeting = greeting.to_string();
        }

        if let Some(priority) = ctx.config("priority") {
            settings.priority = priority
                .parse()
                .map_err(|e| PluginError::config(format!("invalid priority '{priority}': {e}")))?;
        }

        if let Some(shout) = ctx.config("shout") {
            settings.shout = shout
                .parse()
                .map_err(|e| PluginError::config(format!("invalid shout flag '{shout}': {e}")))?;
        }

        Ok(settings)
    }
}

struct ConfiguredGreeter {
    greeting: String,
    shout: bool,
}

impl Greeter for ConfiguredGreeter {
    fn greet(&self, name: &str) -> String {
        let line = format!("{}, {name}!", self.greeting);
        if self.shout {
            line.to_uppercase()
        } else {
            line
        }
    }
}

/// Plugin contributing a configurable [`Greeter`]
#[derive(Debug, Default)]
pub struct GreeterPlugin {
    settings: Mutex<Settings>,
}

impl GreeterPlugin {
    /// Plugin id
    pub const ID: &'static str = "example-greeter";

    /// Create a new greeter plugin
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor for registering this plugin with a host
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(Self::ID, env!("CARGO_PKG_VERSION"))
            .name("Example Greeter")
            .description("Contributes a greeter extension")
            .author("Plexus Team")
    }
}

#[async_trait]
impl Plugin for GreeterPlugin {
    async fn init(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        let settings = Settings::from_context(ctx)?;
        debug!(
            plugin = %ctx.plugin_id(),
            greeting = %settings.greeting,
            priority = settings.priority,
            "Greeter plugin initialized"
        );
        *self.settings.lock() = settings;
        Ok(())
    }

    async fn start(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        // Configuration may have changed since init
        let settings = Settings::from_context(ctx)?;
        *self.settings.lock() = settings.clone();

        let greeter: Arc<dyn Greeter> = Arc::new(ConfiguredGreeter {
            greeting: settings.greeting,
            shout: settings.shout,
        });
        ctx.register_extension(GREETER_POINT, ExtensionHandle::new(greeter), settings.priority)?;

        info!(plugin = %ctx.plugin_id(), "Greeter plugin started");
        Ok(())
    }

    async fn stop(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        info!(plugin = %ctx.plugin_id(), "Greeter plugin stopped");
        Ok(())
    }
}
