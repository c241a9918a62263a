//! Mock implementations for testing

use crate::context::PluginContext;
use crate::extension::ExtensionHandle;
use crate::plugin::Plugin;
use crate::PluginError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hook selector for [`MockPlugin`] behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockHook {
    /// `init`
    Init,
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `uninstall`
    Uninstall,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockHook>,
    failures: HashMap<MockHook, String>,
    delays: HashMap<MockHook, (Duration, bool)>,
    contributions: Vec<(String, ExtensionHandle, i32)>,
}

/// Scriptable plugin for lifecycle tests
///
/// Clones share state, so a test can keep one clone to inspect calls after
/// handing another to the runtime.
#[derive(Clone, Default)]
pub struct MockPlugin {
    state: Arc<Mutex<MockState>>,
}

impl MockPlugin {
    /// Create a new mock plugin whose hooks all succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `hook` fail with `message`
    pub fn failing_on(self, hook: MockHook, message: impl Into<String>) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(hook, message.into());
        self
    }

    /// Make `hook` wait for `delay`, giving up early when cancelled
    pub fn delayed(self, hook: MockHook, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(hook, (delay, true));
        self
    }

    /// Make `hook` wait for `delay` and ignore cancellation
    pub fn stubborn(self, hook: MockHook, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(hook, (delay, false));
        self
    }

    /// Register `handle` on `point` every time the plugin starts
    pub fn contributing(self, point: impl Into<String>, handle: ExtensionHandle, priority: i32) -> Self {
        self.state
            .lock()
            .unwrap()
            .contributions
            .push((point.into(), handle, priority));
        self
    }

    /// Hooks invoked so far, in order
    pub fn calls(&self) -> Vec<MockHook> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of times `hook` was invoked
    pub fn call_count(&self, hook: MockHook) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|h| **h == hook)
            .count()
    }

    async fn run(&self, hook: MockHook, ctx: &PluginContext) -> Result<(), PluginError> {
        let (delay, failure) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(hook);
            (state.delays.get(&hook).copied(), state.failures.get(&hook).cloned())
        };

        if let Some((delay, cooperative)) = delay {
            if cooperative {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancelled() => {
                        return Err(PluginError::runtime("cancelled"));
                    }
                }
            } else {
                tokio::time::sleep(delay).await;
            }
        }

        match failure {
            Some(message) => Err(PluginError::runtime(message)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for MockPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockPlugin")
            .field("calls", &self.calls())
            .finish()
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    async fn init(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        self.run(MockHook::Init, ctx).await
    }

    async fn start(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        self.run(MockHook::Start, ctx).await?;

        let contributions = self.state.lock().unwrap().contributions.clone();
        for (point, handle, priority) in contributions {
            ctx.register_extension(&point, handle, priority)?;
        }
        Ok(())
    }

    async fn stop(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        self.run(MockHook::Stop, ctx).await
    }

    async fn uninstall(&self, ctx: &PluginContext) -> Result<(), PluginError> {
        self.run(MockHook::Uninstall, ctx).await
    }
}
