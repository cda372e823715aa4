//! In-memory platform adapter for testing

use super::traits::{AdapterError, PlatformAdapter};
use fleet_core::{Account, GroupRef, NotifyTarget, RequestKind};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Record of adapter calls for test assertions
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    FetchMemberships(Account),
    LeaveGroup(Account, GroupRef),
    SendNotification(Account, NotifyTarget, String),
    ListTextChannels(Account, GroupRef),
    ProcessRequest(Account, RequestKind, String, bool),
}

#[derive(Debug, Default)]
struct MockState {
    memberships: IndexMap<String, Vec<GroupRef>>,
    channels: HashMap<String, Vec<GroupRef>>,
    unsupported: HashSet<String>,
    fail_fetch: HashSet<String>,
    panic_fetch: HashSet<String>,
    fail_leave: HashSet<String>,
    fail_notify: HashSet<NotifyTarget>,
    fail_notify_from: HashSet<String>,
    fail_process: bool,
    process_result: Option<bool>,
    supports_leave: bool,
    latency: Duration,
    calls: Vec<MockCall>,
}

/// Mock adapter. Keeps per-account membership lists; a successful leave
/// removes the membership, so a later fetch sees the new state.
///
/// Clones share state, so a test can keep one handle and register another.
#[derive(Debug, Clone)]
pub struct MockAdapter {
    platform: String,
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            state: Arc::new(Mutex::new(MockState {
                supports_leave: true,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the groups an account belongs to
    pub fn set_memberships(&self, account_id: &str, groups: Vec<GroupRef>) {
        self.state()
            .memberships
            .insert(account_id.to_string(), groups);
    }

    /// Current groups of an account
    pub fn memberships(&self, account_id: &str) -> Vec<GroupRef> {
        self.state()
            .memberships
            .get(account_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Text channels returned for a guild
    pub fn set_channels(&self, guild_id: &str, channels: Vec<GroupRef>) {
        self.state().channels.insert(guild_id.to_string(), channels);
    }

    /// Membership fetch for this account reports "unsupported"
    pub fn set_unsupported(&self, account_id: &str) {
        self.state().unsupported.insert(account_id.to_string());
    }

    pub fn fail_fetch_for(&self, account_id: &str) {
        self.state().fail_fetch.insert(account_id.to_string());
    }

    /// Fetching `account_id` panics, as a buggy adapter would
    pub fn panic_fetch_for(&self, account_id: &str) {
        self.state().panic_fetch.insert(account_id.to_string());
    }

    pub fn fail_leave_for(&self, account_id: &str) {
        self.state().fail_leave.insert(account_id.to_string());
    }

    pub fn fail_notify_to(&self, target: NotifyTarget) {
        self.state().fail_notify.insert(target);
    }

    /// Every notification sent by `account_id` fails
    pub fn fail_notify_from(&self, account_id: &str) {
        self.state().fail_notify_from.insert(account_id.to_string());
    }

    pub fn set_fail_process(&self, fail: bool) {
        self.state().fail_process = fail;
    }

    /// Result reported by `process_request` (default: unknown)
    pub fn set_process_result(&self, result: Option<bool>) {
        self.state().process_result = result;
    }

    pub fn set_supports_leave(&self, supports: bool) {
        self.state().supports_leave = supports;
    }

    /// Delay applied to every call before it takes effect
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Get a copy of the call log for assertions
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Leave calls as (account id, group) pairs
    pub fn leave_calls(&self) -> Vec<(String, GroupRef)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::LeaveGroup(account, group) => Some((account.id, group)),
                _ => None,
            })
            .collect()
    }

    /// Notification calls as (sender id, target, text)
    pub fn notify_calls(&self) -> Vec<(String, NotifyTarget, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::SendNotification(account, target, text) => {
                    Some((account.id, target, text))
                }
                _ => None,
            })
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::FetchMemberships(_)))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Log a call and return the configured latency
    fn log_call(&self, call: MockCall) -> Duration {
        let mut state = self.state();
        state.calls.push(call);
        state.latency
    }

    async fn delay(latency: Duration) {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn supports_leave(&self) -> bool {
        self.state().supports_leave
    }

    async fn fetch_memberships(
        &self,
        account: &Account,
    ) -> Result<Option<Vec<GroupRef>>, AdapterError> {
        let latency = self.log_call(MockCall::FetchMemberships(account.clone()));
        Self::delay(latency).await;

        if self.state().panic_fetch.contains(&account.id) {
            panic!("mock fetch panic for {account}");
        }
        let state = self.state();
        if state.fail_fetch.contains(&account.id) {
            return Err(AdapterError::request(format!(
                "mock fetch failure for {account}"
            )));
        }
        if state.unsupported.contains(&account.id) {
            return Ok(None);
        }
        Ok(Some(
            state
                .memberships
                .get(&account.id)
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn leave_group(&self, account: &Account, group: &GroupRef) -> Result<(), AdapterError> {
        let latency = self.log_call(MockCall::LeaveGroup(account.clone(), group.clone()));
        Self::delay(latency).await;

        let mut state = self.state();
        if state.fail_leave.contains(&account.id) {
            return Err(AdapterError::request(format!(
                "mock leave failure for {account} in {group}"
            )));
        }
        if let Some(groups) = state.memberships.get_mut(&account.id) {
            groups.retain(|g| g != group);
        }
        Ok(())
    }

    async fn send_notification(
        &self,
        account: &Account,
        target: &NotifyTarget,
        text: &str,
    ) -> Result<(), AdapterError> {
        let latency = self.log_call(MockCall::SendNotification(
            account.clone(),
            target.clone(),
            text.to_string(),
        ));
        Self::delay(latency).await;

        let state = self.state();
        if state.fail_notify.contains(target) || state.fail_notify_from.contains(&account.id) {
            return Err(AdapterError::request(format!(
                "mock notify failure for {target}"
            )));
        }
        Ok(())
    }

    async fn list_text_channels(
        &self,
        account: &Account,
        guild: &GroupRef,
    ) -> Result<Vec<GroupRef>, AdapterError> {
        let latency = self.log_call(MockCall::ListTextChannels(account.clone(), guild.clone()));
        Self::delay(latency).await;

        Ok(self
            .state()
            .channels
            .get(&guild.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn process_request(
        &self,
        account: &Account,
        kind: RequestKind,
        identifier: &str,
        approve: bool,
    ) -> Result<Option<bool>, AdapterError> {
        let latency = self.log_call(MockCall::ProcessRequest(
            account.clone(),
            kind,
            identifier.to_string(),
            approve,
        ));
        Self::delay(latency).await;

        let state = self.state();
        if state.fail_process {
            return Err(AdapterError::request("mock process failure"));
        }
        Ok(state.process_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_leave_removes_membership() {
        let mock = MockAdapter::new("onebot11");
        let a = Account::new("a", "onebot11");
        mock.set_memberships("a", vec![GroupRef::group("1"), GroupRef::group("2")]);

        mock.leave_group(&a, &GroupRef::group("1")).await.unwrap();

        assert_eq!(mock.memberships("a"), vec![GroupRef::group("2")]);
        let fetched = mock.fetch_memberships(&a).await.unwrap().unwrap();
        assert_eq!(fetched, vec![GroupRef::group("2")]);
        assert_eq!(mock.leave_calls(), vec![("a".to_string(), GroupRef::group("1"))]);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mock = MockAdapter::new("onebot11");
        let a = Account::new("a", "onebot11");
        mock.set_memberships("a", vec![GroupRef::group("1")]);
        mock.fail_fetch_for("a");
        mock.fail_leave_for("a");
        mock.fail_notify_to(NotifyTarget::Group {
            group_id: "1".into(),
        });

        assert!(mock.fetch_memberships(&a).await.is_err());
        assert!(mock.leave_group(&a, &GroupRef::group("1")).await.is_err());
        assert_eq!(mock.memberships("a").len(), 1);
        let target = NotifyTarget::Group {
            group_id: "1".into(),
        };
        assert!(mock.send_notification(&a, &target, "hi").await.is_err());
        // Failed calls are still logged
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_account_returns_none() {
        let mock = MockAdapter::new("onebot11");
        mock.set_unsupported("a");
        let result = mock
            .fetch_memberships(&Account::new("a", "onebot11"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_process_request_result() {
        let mock = MockAdapter::new("onebot11");
        let a = Account::new("a", "onebot11");
        assert_eq!(
            mock.process_request(&a, RequestKind::Friend, "flag", true)
                .await
                .unwrap(),
            None
        );
        mock.set_process_result(Some(false));
        assert_eq!(
            mock.process_request(&a, RequestKind::Friend, "flag", true)
                .await
                .unwrap(),
            Some(false)
        );
        mock.set_fail_process(true);
        assert!(
            mock.process_request(&a, RequestKind::Friend, "flag", true)
                .await
                .is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let mock = MockAdapter::new("onebot11");
        mock.set_latency(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        mock.fetch_memberships(&Account::new("a", "onebot11"))
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
