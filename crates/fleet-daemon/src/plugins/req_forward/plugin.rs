//! req_forward plugin implementation

use super::config::ReqForwardConfig;
use super::forwarder::RequestForwarder;
use super::store::{JsonFileRequestStore, RequestStore};
use crate::events::{BotEvent, EventKind, FnHandler};
use crate::plugin::{Capability, Plugin, PluginContext, PluginError, PluginMetadata};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// File under the data directory holding request records
pub const STORE_FILE: &str = "req_forward.json";

/// Forwards friend requests and group invites to a moderator channel
pub struct ReqForwardPlugin {
    config: ReqForwardConfig,
    store: Option<Arc<dyn RequestStore>>,
    forwarder: Option<Arc<RequestForwarder>>,
}

impl ReqForwardPlugin {
    pub fn new() -> Self {
        Self {
            config: ReqForwardConfig::default(),
            store: None,
            forwarder: None,
        }
    }

    /// Inject config for testing; init() otherwise parses it from the context
    pub fn with_config(mut self, config: ReqForwardConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `store` instead of the JSON file under the data directory
    pub fn with_store(mut self, store: Arc<dyn RequestStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn forwarder(&self) -> Option<&Arc<RequestForwarder>> {
        self.forwarder.as_ref()
    }

    fn register_handlers(ctx: &PluginContext, forwarder: &Arc<RequestForwarder>) {
        let f = forwarder.clone();
        ctx.listeners.register(
            EventKind::FriendRequest,
            Arc::new(FnHandler::new("req_forward.friend_request", move |event| {
                let f = f.clone();
                Box::pin(async move {
                    if let BotEvent::FriendRequest {
                        account,
                        user_id,
                        identifier,
                    } = event
                    {
                        f.on_friend_request(&account, &user_id, &identifier, Utc::now())
                            .await?;
                    }
                    Ok::<(), PluginError>(())
                })
            })),
        );

        let f = forwarder.clone();
        ctx.listeners.register(
            EventKind::GuildInvite,
            Arc::new(FnHandler::new("req_forward.guild_invite", move |event| {
                let f = f.clone();
                Box::pin(async move {
                    if let BotEvent::GuildInvite {
                        account,
                        user_id,
                        group,
                        identifier,
                    } = event
                    {
                        f.on_guild_invite(&account, &user_id, &group, &identifier, Utc::now())
                            .await?;
                    }
                    Ok::<(), PluginError>(())
                })
            })),
        );

        let f = forwarder.clone();
        ctx.listeners.register(
            EventKind::ConfirmCommand,
            Arc::new(FnHandler::new("req_forward.confirm", move |event| {
                let f = f.clone();
                Box::pin(async move {
                    if let BotEvent::ConfirmCommand {
                        account,
                        user_id,
                        request_id,
                        superuser,
                        reply_to,
                    } = event
                    {
                        f.handle_confirm_command(
                            &account,
                            &user_id,
                            &request_id,
                            superuser,
                            &reply_to,
                            Utc::now(),
                        )
                        .await;
                    }
                    Ok(())
                })
            })),
        );
    }
}

impl Default for ReqForwardPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for ReqForwardPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: "req_forward",
            version: env!("CARGO_PKG_VERSION"),
            description: "Forward friend requests and group invites for confirmation",
            capabilities: vec![Capability::RequestForward, Capability::EventListener],
        }
    }

    async fn init(&mut self, ctx: &PluginContext) -> Result<(), PluginError> {
        if let Some(table) = ctx.plugin_config("req_forward") {
            self.config = ReqForwardConfig::from_toml(table)?;
        }

        if !self.config.enabled {
            info!("req_forward is disabled");
            return Ok(());
        }

        let store = match &self.store {
            Some(store) => store.clone(),
            None => {
                let path = ctx.data_dir().join(STORE_FILE);
                debug!("req_forward store at {}", path.display());
                Arc::new(JsonFileRequestStore::new(path)) as Arc<dyn RequestStore>
            }
        };

        match &self.config.target {
            Some(target) => info!("Forwarding requests to {target}"),
            None => warn!("req_forward has no target, requests are recorded only"),
        }

        let forwarder = Arc::new(RequestForwarder::new(
            store,
            ctx.adapters.clone(),
            ctx.accounts.clone(),
            self.config.clone(),
        ));
        Self::register_handlers(ctx, &forwarder);
        self.forwarder = Some(forwarder);
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<(), PluginError> {
        let (Some(forwarder), Some(period)) = (self.forwarder.clone(), self.config.sweep_interval)
        else {
            cancel.cancelled().await;
            return Ok(());
        };

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = forwarder.sweep(Utc::now()).await {
                        warn!("Failed to purge expired requests: {e}");
                    }
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}
