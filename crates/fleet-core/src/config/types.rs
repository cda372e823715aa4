//! Configuration types

use crate::schema::Account;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Core configuration
    #[serde(default)]
    pub core: CoreConfig,
    /// Accounts the daemon can reach directly: [[accounts]]
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Plugin-specific configuration sections: [plugins.<name>]
    #[serde(default)]
    pub plugins: HashMap<String, toml::Table>,
}

/// Core configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Directory for persisted plugin data (request records).
    /// Defaults to `<home>/.fleet/data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Connection details for one bot account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub platform: String,
    /// Protocol endpoint (e.g. OneBot HTTP API base URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl AccountConfig {
    pub fn account(&self) -> Account {
        Account::new(self.id.clone(), self.platform.clone())
    }
}

impl Config {
    /// Get a plugin's configuration section by name.
    /// Returns None if the plugin has no config section.
    pub fn plugin_config(&self, name: &str) -> Option<&toml::Table> {
        self.plugins.get(name)
    }

    /// Resolved data directory.
    pub fn data_dir(&self, home_dir: &Path) -> PathBuf {
        self.core
            .data_dir
            .clone()
            .unwrap_or_else(|| crate::home::runtime_dir(home_dir).join("data"))
    }

    /// Configured accounts of one platform, in file order.
    pub fn accounts_for(&self, platform: &str) -> impl Iterator<Item = &AccountConfig> {
        self.accounts.iter().filter(move |a| a.platform == platform)
    }
}
