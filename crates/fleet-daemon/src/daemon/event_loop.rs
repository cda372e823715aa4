//! Main daemon event loop

use crate::daemon::{graceful_shutdown, start_socket_server};
use crate::plugin::{PluginContext, PluginRegistry};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Per-plugin budget for shutdown()
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the main daemon event loop.
///
/// This function:
/// 1. Initializes all plugins via the registry
/// 2. Spawns each plugin's run() method in its own task
/// 3. Starts the host socket server when `socket_path` is given
/// 4. Waits for cancellation signal
/// 5. Performs graceful shutdown of all plugins
pub async fn run(
    registry: &mut PluginRegistry,
    ctx: &PluginContext,
    socket_path: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<()> {
    info!("Initializing {} plugin(s)", registry.len());
    registry
        .init_all(ctx)
        .await
        .context("Failed to initialize plugins")?;

    let plugins = registry.take_plugins();
    info!("Starting {} plugin task(s)", plugins.len());

    let mut plugin_tasks: Vec<JoinHandle<()>> = Vec::new();
    for (metadata, plugin_arc) in plugins.clone() {
        let plugin_name = metadata.name;
        let cancel_clone = cancel.clone();

        let task = tokio::spawn(async move {
            info!("Plugin {plugin_name} run() starting");
            let mut plugin = plugin_arc.lock().await;

            match plugin.run(cancel_clone).await {
                Ok(()) => info!("Plugin {plugin_name} run() completed"),
                Err(e) => error!("Plugin {plugin_name} run() failed: {e}"),
            }
        });
        plugin_tasks.push(task);
    }

    // Handlers are registered by now, so host events can flow
    let _socket = match socket_path {
        Some(path) => start_socket_server(
            path,
            ctx.accounts.clone(),
            ctx.listeners.clone(),
            cancel.clone(),
        )
        .await
        .context("Failed to start host socket server")?,
        None => None,
    };

    info!("Daemon event loop running. Waiting for cancellation signal...");
    cancel.cancelled().await;
    info!("Cancellation signal received. Beginning shutdown...");

    graceful_shutdown(plugins, SHUTDOWN_TIMEOUT)
        .await
        .context("Plugin shutdown encountered errors")?;

    for task in plugin_tasks {
        if let Err(e) = task.await {
            error!("Plugin task panicked: {e}");
        }
    }

    info!("Daemon event loop shutdown complete");
    Ok(())
}
