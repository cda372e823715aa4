//! Directory of currently connected accounts

use fleet_core::Account;
use indexmap::IndexSet;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Connected accounts in connection order.
///
/// Iteration order is stable: the first account to connect is listed first.
/// The planner relies on that order to break ties.
#[derive(Debug, Default)]
pub struct AccountDirectory {
    accounts: RwLock<IndexSet<Account>>,
}

impl AccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection. Reconnecting keeps the original position.
    ///
    /// Returns false if the account was already connected.
    pub fn connect(&self, account: Account) -> bool {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let added = accounts.insert(account.clone());
        if added {
            debug!("Account {account} connected ({} total)", accounts.len());
        }
        added
    }

    /// Record a disconnection. Returns false if the account was unknown.
    pub fn disconnect(&self, account: &Account) -> bool {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let removed = accounts.shift_remove(account);
        if removed {
            debug!("Account {account} disconnected ({} left)", accounts.len());
        }
        removed
    }

    pub fn contains(&self, account: &Account) -> bool {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(account)
    }

    /// All connected accounts of one platform, in connection order
    pub fn list_platform(&self, platform: &str) -> Vec<Account> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|a| a.platform == platform)
            .cloned()
            .collect()
    }

    /// All connected accounts in the same family as `account`, itself included
    /// when connected.
    pub fn list_same_platform(&self, account: &Account) -> Vec<Account> {
        self.list_platform(&account.platform)
    }

    pub fn len(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
