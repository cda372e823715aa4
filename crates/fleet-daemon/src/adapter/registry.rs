//! Adapter registry keyed by platform tag

use super::traits::{ErasedPlatformAdapter, PlatformAdapter};
use fleet_core::Account;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of platform adapters
///
/// One adapter serves every account of its platform. Registering a second
/// adapter for the same tag replaces the first.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ErasedPlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter under its own platform tag
    pub fn register<A: PlatformAdapter + 'static>(&mut self, adapter: A) {
        self.register_shared(Arc::new(adapter));
    }

    /// Register an adapter that is already shared (e.g. a mock kept by a test)
    pub fn register_shared(&mut self, adapter: Arc<dyn ErasedPlatformAdapter>) {
        self.adapters.insert(adapter.platform().to_string(), adapter);
    }

    /// Adapter for a platform tag
    pub fn get(&self, platform: &str) -> Option<Arc<dyn ErasedPlatformAdapter>> {
        self.adapters.get(platform).cloned()
    }

    /// Adapter serving `account`
    pub fn for_account(&self, account: &Account) -> Option<Arc<dyn ErasedPlatformAdapter>> {
        self.get(&account.platform)
    }

    /// Adapter for `platform` if it can make accounts leave groups
    pub fn leave_capable(&self, platform: &str) -> Option<Arc<dyn ErasedPlatformAdapter>> {
        self.get(platform).filter(|a| a.supports_leave())
    }

    /// List registered platform tags
    pub fn list_platforms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has_platform(&self, platform: &str) -> bool {
        self.adapters.contains_key(platform)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
