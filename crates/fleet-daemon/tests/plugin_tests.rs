use fleet_core::config::Config;
use fleet_daemon::adapter::{AccountDirectory, AdapterRegistry};
use fleet_daemon::events::{EventKind, ListenerRegistry};
use fleet_daemon::plugin::{
    Capability, Plugin, PluginContext, PluginError, PluginMetadata, PluginRegistry, PluginState,
};
use fleet_daemon::plugins::leave_duplicate::LeaveDuplicatePlugin;
use fleet_daemon::plugins::req_forward::ReqForwardPlugin;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Plugins
// ============================================================================

struct MockPlugin {
    name: &'static str,
    capabilities: Vec<Capability>,
    fail_init: bool,
}

impl MockPlugin {
    fn new(name: &'static str, capabilities: Vec<Capability>) -> Self {
        Self {
            name,
            capabilities,
            fail_init: false,
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            fail_init: true,
            ..Self::new(name, vec![])
        }
    }
}

impl Plugin for MockPlugin {
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: self.name,
            version: "1.0.0",
            description: "Mock plugin for testing",
            capabilities: self.capabilities.clone(),
        }
    }

    async fn init(&mut self, _ctx: &PluginContext) -> Result<(), PluginError> {
        if self.fail_init {
            return Err(PluginError::Init {
                message: format!("{} refused to start", self.name),
                source: None,
            });
        }
        Ok(())
    }

    async fn run(&mut self, cancel: CancellationToken) -> Result<(), PluginError> {
        cancel.cancelled().await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn create_test_context(config: &str) -> PluginContext {
    let config: Config = fleet_core::toml::from_str(config).unwrap();
    PluginContext::new(
        Arc::new(config),
        Arc::new(AdapterRegistry::new()),
        Arc::new(AccountDirectory::new()),
        Arc::new(ListenerRegistry::new()),
        PathBuf::from("/tmp/fleet-test-data"),
    )
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn test_registry_init_marks_states() {
    let ctx = create_test_context("");
    let mut registry = PluginRegistry::new();
    registry.register(MockPlugin::new("first", vec![Capability::EventListener]));
    registry.register(MockPlugin::new(
        "second",
        vec![Capability::Custom("audit".to_string())],
    ));
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.state_of("first"), Some(PluginState::Created));

    registry.init_all(&ctx).await.unwrap();
    assert_eq!(registry.state_of("first"), Some(PluginState::Initialized));
    assert_eq!(registry.state_of("second"), Some(PluginState::Initialized));
    assert!(registry.state_of("missing").is_none());

    let listeners = registry.get_by_capability(&Capability::EventListener);
    assert_eq!(listeners.len(), 1);
    assert_eq!(listeners[0].0.name, "first");
}

#[tokio::test]
async fn test_registry_init_stops_at_failure() {
    let ctx = create_test_context("");
    let mut registry = PluginRegistry::new();
    registry.register(MockPlugin::new("ok", vec![]));
    registry.register(MockPlugin::failing("broken"));
    registry.register(MockPlugin::new("later", vec![]));

    let err = registry.init_all(&ctx).await.unwrap_err();
    assert!(matches!(err, PluginError::Init { .. }));
    assert_eq!(registry.state_of("ok"), Some(PluginState::Initialized));
    assert_eq!(registry.state_of("broken"), Some(PluginState::Failed));
    assert_eq!(registry.state_of("later"), Some(PluginState::Created));
}

#[tokio::test]
async fn test_take_plugins_empties_registry() {
    let mut registry = PluginRegistry::new();
    registry.register(MockPlugin::new("a", vec![]));
    registry.register(MockPlugin::new("b", vec![]));

    let plugins = registry.take_plugins();
    let names: Vec<_> = plugins.iter().map(|(m, _)| m.name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(registry.is_empty());
}

// ============================================================================
// Bundled plugins
// ============================================================================

#[tokio::test]
async fn test_bundled_plugins_register_handlers() {
    let ctx = create_test_context("");
    let mut registry = PluginRegistry::new();
    registry.register(LeaveDuplicatePlugin::new());
    registry.register(ReqForwardPlugin::new());
    registry.init_all(&ctx).await.unwrap();

    for kind in [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::GroupJoined,
        EventKind::ArbitrateRequested,
        EventKind::FriendRequest,
        EventKind::GuildInvite,
        EventKind::ConfirmCommand,
    ] {
        assert_eq!(ctx.listeners.handler_count(kind), 1, "{kind:?}");
    }

    let (meta, _) = registry.get_by_name("leave_duplicate").unwrap();
    assert!(meta.capabilities.contains(&Capability::DuplicateArbitration));
    let (meta, _) = registry.get_by_name("req_forward").unwrap();
    assert!(meta.capabilities.contains(&Capability::RequestForward));
}

#[tokio::test]
async fn test_disabled_plugins_register_nothing() {
    let ctx = create_test_context(
        r#"
[plugins.leave_duplicate]
enabled = false

[plugins.req_forward]
enabled = false
"#,
    );
    let mut leave = LeaveDuplicatePlugin::new();
    leave.init(&ctx).await.unwrap();
    assert!(leave.coordinator().is_none());

    let mut forward = ReqForwardPlugin::new();
    forward.init(&ctx).await.unwrap();
    assert!(forward.forwarder().is_none());

    assert_eq!(ctx.listeners.handler_count(EventKind::Connected), 0);
    assert_eq!(ctx.listeners.handler_count(EventKind::FriendRequest), 0);
}

#[tokio::test]
async fn test_invalid_plugin_config_fails_init() {
    let ctx = create_test_context(
        r#"
[plugins.req_forward]
target = "onebot11:channel:1"
"#,
    );
    let mut forward = ReqForwardPlugin::new();
    let err = forward.init(&ctx).await.unwrap_err();
    assert!(matches!(err, PluginError::Config { .. }));
}
