//! Listener registry: handlers per event kind, invoked concurrently

use super::{BotEvent, EventKind};
use crate::plugin::PluginError;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Something that reacts to host events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn handle(&self, event: BotEvent) -> Result<(), PluginError>;
}

type HandlerFn = dyn Fn(BotEvent) -> BoxFuture<'static, Result<(), PluginError>> + Send + Sync;

/// Closure-backed handler
pub struct FnHandler {
    name: String,
    func: Box<HandlerFn>,
}

impl FnHandler {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(BotEvent) -> BoxFuture<'static, Result<(), PluginError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl EventHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: BotEvent) -> Result<(), PluginError> {
        (self.func)(event).await
    }
}

/// Outcome of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Handlers keyed by event kind.
///
/// Every handler runs in its own task: an error or panic in one handler is
/// logged and does not affect the others.
#[derive(Default)]
pub struct ListenerRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<dyn EventHandler>>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        debug!("Registering handler {} for {kind:?}", handler.name());
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(handler);
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invoke every handler registered for the event's kind and wait for all
    /// of them.
    pub async fn dispatch(&self, event: BotEvent) -> DispatchReport {
        let kind = event.kind();
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut report = DispatchReport {
            invoked: handlers.len(),
            failed: 0,
        };
        if handlers.is_empty() {
            debug!("No handlers for {kind:?}");
            return report;
        }

        let mut tasks = JoinSet::new();
        for handler in handlers {
            let event = event.clone();
            tasks.spawn(async move {
                let result = handler.handle(event).await;
                (handler.name().to_string(), result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    warn!("Handler {name} failed on {kind:?}: {e}");
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Handler task for {kind:?} panicked: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
