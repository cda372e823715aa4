//! Parallel membership fetch for one account family

use super::planner::MembershipSnapshot;
use crate::adapter::ErasedPlatformAdapter;
use fleet_core::Account;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches the memberships of many accounts concurrently.
///
/// An account whose fetch fails, times out, or is unsupported is left out
/// of the snapshot; it is never treated as being in zero groups.
#[derive(Debug, Clone)]
pub struct MembershipFetcher {
    adapter: Arc<dyn ErasedPlatformAdapter>,
    timeout: Duration,
}

impl MembershipFetcher {
    pub fn new(adapter: Arc<dyn ErasedPlatformAdapter>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }

    /// Snapshot of every account that answered, in input order
    pub async fn fetch_all(&self, accounts: &[Account]) -> MembershipSnapshot {
        let fetches = accounts.iter().map(|account| async move {
            let result = tokio::time::timeout(self.timeout, self.adapter.fetch_memberships(account)).await;
            (account, result)
        });

        let mut snapshot = MembershipSnapshot::new();
        for (account, result) in join_all(fetches).await {
            match result {
                Ok(Ok(Some(groups))) => snapshot.insert(account.clone(), groups),
                Ok(Ok(None)) => debug!("Membership listing not supported for {account}"),
                Ok(Err(e)) => warn!("Failed to fetch groups of {account}: {e}"),
                Err(_) => warn!(
                    "Fetching groups of {account} timed out after {:?}",
                    self.timeout
                ),
            }
        }
        snapshot
    }
}
