//! fleet-daemon - plugin host for a multi-account bot fleet

use anyhow::{Context, Result};
use clap::Parser;
use fleet_core::config::{ConfigOverrides, resolve_config};
use fleet_daemon::adapter::{AccountDirectory, AdapterRegistry, OneBotAdapter, onebot};
use fleet_daemon::daemon;
use fleet_daemon::daemon::socket::SOCKET_FILE;
use fleet_daemon::events::ListenerRegistry;
use fleet_daemon::plugin::{PluginContext, PluginRegistry};
use fleet_daemon::plugins::leave_duplicate::LeaveDuplicatePlugin;
use fleet_daemon::plugins::req_forward::ReqForwardPlugin;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// fleet-daemon - duplicate-membership arbitration and request forwarding
#[derive(Parser, Debug)]
#[command(name = "fleet-daemon")]
#[command(about = "Plugin host for a multi-account bot fleet")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Host socket path (default: <home>/.fleet/fleet-daemon.sock)
    #[arg(long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Do not listen for host events on a socket
    #[arg(long, conflicts_with = "socket")]
    no_socket: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn plugin_enabled(ctx: &PluginContext, name: &str) -> bool {
    ctx.plugin_config(name)
        .and_then(|t| t.get("enabled"))
        .and_then(|v| v.as_bool())
        .unwrap_or(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    fleet_core::logging::init(args.verbose);

    info!("fleet-daemon starting...");

    let home_dir = fleet_core::home::get_home_dir().context("Failed to determine home directory")?;

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        data_dir: args.data_dir.clone(),
    };
    let config = resolve_config(&overrides, &home_dir).context("Failed to resolve configuration")?;
    if let Some(path) = &args.config {
        info!("Loaded config from: {}", path.display());
    }

    let data_dir = config.data_dir(&home_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
    info!("Data directory: {}", data_dir.display());

    let mut adapters = AdapterRegistry::new();
    if config.accounts_for(onebot::PLATFORM).next().is_some() {
        let onebot = OneBotAdapter::from_config(&config).context("Failed to set up OneBot adapter")?;
        adapters.register(onebot);
        info!("Registered OneBot v11 adapter");
    }
    info!("Platforms: {:?}", adapters.list_platforms());

    let plugin_ctx = PluginContext::new(
        Arc::new(config),
        Arc::new(adapters),
        Arc::new(AccountDirectory::new()),
        Arc::new(ListenerRegistry::new()),
        data_dir,
    );

    let mut registry = PluginRegistry::new();
    if plugin_enabled(&plugin_ctx, "leave_duplicate") {
        registry.register(LeaveDuplicatePlugin::new());
        info!("Registered leave_duplicate plugin");
    }
    if plugin_enabled(&plugin_ctx, "req_forward") {
        registry.register(ReqForwardPlugin::new());
        info!("Registered req_forward plugin");
    }
    info!("Registered {} plugin(s)", registry.len());

    let socket_path = if args.no_socket {
        None
    } else {
        Some(
            args.socket
                .clone()
                .unwrap_or_else(|| fleet_core::home::runtime_dir(&home_dir).join(SOCKET_FILE)),
        )
    };

    let cancel_token = CancellationToken::new();
    let cancel_for_signals = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_signal().await {
            error!("Failed to install signal handlers: {e}");
        }
        cancel_for_signals.cancel();
    });

    daemon::run(&mut registry, &plugin_ctx, socket_path, cancel_token)
        .await
        .context("Daemon event loop failed")?;

    info!("fleet-daemon shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
