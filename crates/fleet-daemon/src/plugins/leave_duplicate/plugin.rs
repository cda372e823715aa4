//! leave_duplicate plugin implementation

use super::config::LeaveDuplicateConfig;
use super::coordinator::{Coordinator, RunOutcome, Trigger};
use crate::events::{BotEvent, EventKind, FnHandler};
use crate::plugin::{Capability, Plugin, PluginContext, PluginError, PluginMetadata};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Makes redundant accounts leave groups shared by several accounts of the
/// same platform
pub struct LeaveDuplicatePlugin {
    config: LeaveDuplicateConfig,
    coordinator: Option<Coordinator>,
}

impl LeaveDuplicatePlugin {
    pub fn new() -> Self {
        Self {
            config: LeaveDuplicateConfig::default(),
            coordinator: None,
        }
    }

    /// Inject config for testing; init() otherwise parses it from the context
    pub fn with_config(mut self, config: LeaveDuplicateConfig) -> Self {
        self.config = config;
        self
    }

    /// Coordinator created during init(), for on-demand runs
    pub fn coordinator(&self) -> Option<&Coordinator> {
        self.coordinator.as_ref()
    }

    fn register_handlers(ctx: &PluginContext, coordinator: &Coordinator) {
        let c = coordinator.clone();
        ctx.listeners.register(
            EventKind::Connected,
            Arc::new(FnHandler::new("leave_duplicate.connected", move |event| {
                if let BotEvent::Connected { account } = event {
                    c.trigger(Trigger::Connected(account));
                }
                Box::pin(async { Ok(()) })
            })),
        );

        let c = coordinator.clone();
        ctx.listeners.register(
            EventKind::Disconnected,
            Arc::new(FnHandler::new("leave_duplicate.disconnected", move |event| {
                if let BotEvent::Disconnected { account } = event {
                    c.trigger(Trigger::Disconnected(account));
                }
                Box::pin(async { Ok(()) })
            })),
        );

        let c = coordinator.clone();
        ctx.listeners.register(
            EventKind::GroupJoined,
            Arc::new(FnHandler::new("leave_duplicate.group_joined", move |event| {
                if let BotEvent::GroupJoined { account, group } = event {
                    c.trigger(Trigger::Joined { account, group });
                }
                Box::pin(async { Ok(()) })
            })),
        );

        let c = coordinator.clone();
        ctx.listeners.register(
            EventKind::ArbitrateRequested,
            Arc::new(FnHandler::new("leave_duplicate.arbitrate", move |event| {
                let c = c.clone();
                Box::pin(async move {
                    if let BotEvent::ArbitrateRequested { platform } = event {
                        match c.arbitrate_now(&platform).await {
                            RunOutcome::Completed(report) => info!(
                                "Manual arbitration for {platform}: {} entries, {} leaves",
                                report.entries_planned, report.execution.leaves_succeeded
                            ),
                            other => debug!("Manual arbitration for {platform}: {other:?}"),
                        }
                    }
                    Ok(())
                })
            })),
        );
    }
}

impl Default for LeaveDuplicatePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for LeaveDuplicatePlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "leave_duplicate",
            version: env!("CARGO_PKG_VERSION"),
            description: "Keep one account per group when several accounts of a platform share it",
            capabilities: vec![Capability::DuplicateArbitration, Capability::EventListener],
        }
    }

    async fn init(&mut self, ctx: &PluginContext) -> Result<(), PluginError> {
        if let Some(table) = ctx.plugin_config("leave_duplicate") {
            self.config = LeaveDuplicateConfig::from_toml(table)?;
        }

        if !self.config.enabled {
            info!("leave_duplicate is disabled");
            return Ok(());
        }

        let coordinator = Coordinator::new(
            ctx.adapters.clone(),
            ctx.accounts.clone(),
            self.config.clone(),
        );
        Self::register_handlers(ctx, &coordinator);
        self.coordinator = Some(coordinator);

        if ctx.adapters.is_empty() {
            warn!("leave_duplicate enabled but no platform adapters are registered");
        }
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<(), PluginError> {
        // All work is event driven
        cancel.cancelled().await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), PluginError> {
        if let Some(coordinator) = &self.coordinator {
            coordinator.shutdown();
        }
        Ok(())
    }
}
