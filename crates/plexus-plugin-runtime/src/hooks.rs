//! Bounded invocation of lifecycle hooks

use crate::error::{HookKind, PluginRuntimeError, Result};
use plexus_plugin_api::{Plugin, PluginContext, PluginError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Run one hook of `plugin` on its own task
///
/// The caller stops waiting when `timeout` elapses or `token` is cancelled.
/// On timeout the token is cancelled so a cooperative hook can wind down; a
/// hook that ignores the token keeps running detached until it returns.
pub(crate) async fn run_hook(
    plugin: Arc<dyn Plugin>,
    hook: HookKind,
    ctx: PluginContext,
    token: CancellationToken,
    timeout: Duration,
) -> Result<()> {
    let plugin_id = ctx.plugin_id().to_string();

    let task = tokio::spawn(async move {
        match hook {
            HookKind::Init => plugin.init(&ctx).await,
            HookKind::Start => plugin.start(&ctx).await,
            HookKind::Stop => plugin.stop(&ctx).await,
            HookKind::Uninstall => plugin.uninstall(&ctx).await,
        }
    });

    tokio::select! {
        biased;

        _ = token.cancelled() => Err(PluginRuntimeError::Cancelled {
            plugin: plugin_id,
            hook,
        }),

        joined = tokio::time::timeout(timeout, task) => match joined {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(source))) => Err(PluginRuntimeError::LifecycleHook {
                plugin: plugin_id,
                hook,
                source,
            }),
            Ok(Err(join_error)) => Err(PluginRuntimeError::LifecycleHook {
                plugin: plugin_id,
                hook,
                source: PluginError::runtime(format!("hook panicked: {join_error}")),
            }),
            Err(_) => {
                token.cancel();
                Err(PluginRuntimeError::Timeout {
                    plugin: plugin_id,
                    hook,
                    timeout,
                })
            }
        },
    }
}
