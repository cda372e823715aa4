//! Graceful shutdown coordination for plugins

use crate::plugin::{PluginMetadata, SharedPlugin};
use anyhow::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Perform graceful shutdown of all plugins.
///
/// Calls shutdown() on each plugin with a timeout. If a plugin exceeds the
/// timeout it is logged as a warning and shutdown continues for the rest.
/// The timeout also covers waiting for the plugin's run() to release it.
pub async fn graceful_shutdown(
    plugins: Vec<(PluginMetadata, SharedPlugin)>,
    shutdown_timeout: Duration,
) -> Result<()> {
    info!(
        "Beginning graceful shutdown of {} plugin(s) (timeout: {:?})",
        plugins.len(),
        shutdown_timeout
    );

    let mut success_count = 0;
    let mut timeout_count = 0;
    let mut error_count = 0;

    for (metadata, plugin_arc) in plugins {
        let plugin_name = metadata.name;
        info!("Shutting down plugin: {plugin_name}");

        let result = timeout(shutdown_timeout, async {
            let mut plugin = plugin_arc.lock().await;
            plugin.shutdown().await
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Plugin {plugin_name} shut down cleanly");
                success_count += 1;
            }
            Ok(Err(e)) => {
                error!("Plugin {plugin_name} shutdown failed: {e}");
                error_count += 1;
            }
            Err(_) => {
                warn!("Plugin {plugin_name} shutdown timed out after {shutdown_timeout:?}");
                timeout_count += 1;
            }
        }
    }

    info!(
        "Graceful shutdown complete: {success_count} success, {timeout_count} timeout, {error_count} error"
    );

    if error_count > 0 {
        anyhow::bail!("{error_count} plugin(s) failed to shut down cleanly");
    }
    Ok(())
}
