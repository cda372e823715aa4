use crate::adapter::{AccountDirectory, AdapterRegistry};
use crate::events::ListenerRegistry;
use fleet_core::config::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Shared services available to plugins during init and runtime
#[derive(Clone)]
pub struct PluginContext {
    /// Application configuration
    pub config: Arc<Config>,
    /// Platform adapters keyed by platform tag
    pub adapters: Arc<AdapterRegistry>,
    /// Accounts currently connected to the host
    pub accounts: Arc<AccountDirectory>,
    /// Event handler registration
    pub listeners: Arc<ListenerRegistry>,
    /// Directory for persisted plugin data
    pub data_dir: PathBuf,
}

impl PluginContext {
    pub fn new(
        config: Arc<Config>,
        adapters: Arc<AdapterRegistry>,
        accounts: Arc<AccountDirectory>,
        listeners: Arc<ListenerRegistry>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            adapters,
            accounts,
            listeners,
            data_dir,
        }
    }

    /// Get a plugin's configuration section by name.
    /// Returns None if the plugin has no config section.
    pub fn plugin_config(&self, name: &str) -> Option<&toml::Table> {
        self.config.plugin_config(name)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
