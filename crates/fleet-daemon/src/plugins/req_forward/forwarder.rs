//! Request recording, forwarding, and confirmation

use super::config::ReqForwardConfig;
use super::store::{RequestStore, StoreError};
use crate::adapter::{AccountDirectory, AdapterRegistry, ErasedPlatformAdapter};
use crate::plugin::PluginError;
use chrono::{DateTime, Utc};
use fleet_core::text::{format_duration, mask_middle};
use fleet_core::{Account, GroupRef, NotifyTarget, RequestKind, RequestRecord};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Command users send to confirm a forwarded request
pub const CONFIRM_COMMAND: &str = "confirm-req";

const MAX_ID_ATTEMPTS: usize = 5;

/// Result of a confirmation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Missing, already confirmed, or expired
    NotFound,
    NoPermission,
    /// The platform call errored or the origin account is gone
    Failed,
    Approved,
    /// The platform reported that approval did not go through
    Rejected,
    /// Approval was sent but the platform does not report the result
    Unknown,
}

impl ConfirmOutcome {
    /// Reply text for the user who sent the command
    pub fn message(&self) -> &'static str {
        match self {
            ConfirmOutcome::NotFound => "Request not found",
            ConfirmOutcome::NoPermission => "You are not allowed to confirm this request",
            ConfirmOutcome::Failed => "Confirming the request failed, please contact the maintainer",
            ConfirmOutcome::Approved => "Request approved",
            ConfirmOutcome::Rejected => "Request approval failed",
            ConfirmOutcome::Unknown => {
                "Approval sent. Please check whether it took effect; if not, retry or contact the maintainer"
            }
        }
    }

    fn from_platform(result: Option<bool>) -> Self {
        match result {
            Some(true) => ConfirmOutcome::Approved,
            Some(false) => ConfirmOutcome::Rejected,
            None => ConfirmOutcome::Unknown,
        }
    }
}

fn store_error(context: &str, e: StoreError) -> PluginError {
    PluginError::Runtime {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Records incoming requests, announces them, and applies confirmations
pub struct RequestForwarder {
    store: Arc<dyn RequestStore>,
    adapters: Arc<AdapterRegistry>,
    accounts: Arc<AccountDirectory>,
    config: ReqForwardConfig,
}

impl RequestForwarder {
    pub fn new(
        store: Arc<dyn RequestStore>,
        adapters: Arc<AdapterRegistry>,
        accounts: Arc<AccountDirectory>,
        config: ReqForwardConfig,
    ) -> Self {
        Self {
            store,
            adapters,
            accounts,
            config,
        }
    }

    /// Record a friend request and forward a notice
    pub async fn on_friend_request(
        &self,
        account: &Account,
        user_id: &str,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RequestRecord, PluginError> {
        let record = RequestRecord::new(RequestKind::Friend, account.clone(), user_id, identifier, now);
        let record = self.persist(record).await?;
        info!(
            "Friend request from {user_id}, identifier: {identifier}, request id: {}",
            record.id
        );
        self.forward(&self.friend_notice(&record)).await;
        Ok(record)
    }

    /// Record a group invite and forward a notice.
    ///
    /// Invites into private scenes are ignored and yield `None`.
    pub async fn on_guild_invite(
        &self,
        account: &Account,
        user_id: &str,
        group: &GroupRef,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RequestRecord>, PluginError> {
        if group.is_private {
            debug!("Ignoring invite into private scene {group}");
            return Ok(None);
        }
        let record = RequestRecord::new(RequestKind::GuildInvite, account.clone(), user_id, identifier, now)
            .with_group(group.id.clone());
        let record = self.persist(record).await?;
        info!(
            "Guild invite request to {group} from {user_id}, identifier: {identifier}, request id: {}",
            record.id
        );
        self.forward(&self.invite_notice(&record)).await;
        Ok(Some(record))
    }

    /// Insert, regenerating the id on the rare collision
    async fn persist(&self, mut record: RequestRecord) -> Result<RequestRecord, PluginError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            match self.store.insert(record.clone()).await {
                Ok(()) => return Ok(record),
                Err(StoreError::Duplicate { .. }) => {
                    record.id = fleet_core::schema::generate_request_id();
                }
                Err(e) => return Err(store_error("failed to save request", e)),
            }
        }
        Err(PluginError::Runtime {
            message: format!("no free request id after {MAX_ID_ATTEMPTS} attempts"),
            source: None,
        })
    }

    fn window_text(&self) -> String {
        format_duration(self.config.expire.to_std().unwrap_or_default())
    }

    pub fn friend_notice(&self, record: &RequestRecord) -> String {
        format!(
            "Friend request from user {}. To approve it, send the following within {}:\n{CONFIRM_COMMAND} {}",
            record.requesting_user,
            self.window_text(),
            record.id
        )
    }

    pub fn invite_notice(&self, record: &RequestRecord) -> String {
        let group = record
            .group_id
            .as_deref()
            .map(|id| mask_middle(id, 2, 2, '*'))
            .unwrap_or_default();
        format!(
            "Group invite ({group}) from user {}. To approve it, send the following within {}:\n{CONFIRM_COMMAND} {}",
            record.requesting_user,
            self.window_text(),
            record.id
        )
    }

    /// Send `text` to the moderator target. Connected accounts of the target's
    /// platform are tried in turn, members of the target group first, until
    /// one delivers. Returns whether it was delivered.
    async fn forward(&self, text: &str) -> bool {
        let Some(target) = &self.config.target else {
            return false;
        };
        let Some(adapter) = self.adapters.get(&target.platform) else {
            warn!("No adapter for {} to forward the request", target.platform);
            return false;
        };
        let senders = self.accounts.list_platform(&target.platform);
        if senders.is_empty() {
            warn!("No connected {} account to forward the request", target.platform);
            return false;
        }

        for sender in rank_senders(adapter.as_ref(), &target.target, senders).await {
            match adapter.send_notification(&sender, &target.target, text).await {
                Ok(()) => {
                    debug!("Forwarded request to {target} as {sender}");
                    return true;
                }
                Err(e) => warn!("Failed to forward request to {target} as {sender}: {e}"),
            }
        }
        false
    }

    /// Try to approve request `request_id` on behalf of `user_id`
    pub async fn confirm(
        &self,
        request_id: &str,
        user_id: &str,
        superuser: bool,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        let mut record = match self.store.get(request_id).await {
            Ok(Some(record)) if record.is_actionable(now, self.config.expire) => record,
            Ok(_) => return ConfirmOutcome::NotFound,
            Err(e) => {
                warn!("Failed to load request {request_id}: {e}");
                return ConfirmOutcome::Failed;
            }
        };

        if record.requesting_user != user_id && !superuser && !self.config.is_superuser(user_id) {
            return ConfirmOutcome::NoPermission;
        }

        let origin = &record.origin_account;
        let Some(adapter) = self.adapters.for_account(origin) else {
            warn!("No adapter for {origin} to confirm request {request_id}");
            return ConfirmOutcome::Failed;
        };
        if !self.accounts.contains(origin) {
            warn!("Account {origin} is not connected, cannot confirm request {request_id}");
            return ConfirmOutcome::Failed;
        }

        let result = match adapter
            .process_request(origin, record.kind, &record.identifier, true)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to confirm request {request_id}: {e}");
                return ConfirmOutcome::Failed;
            }
        };

        if result != Some(false) {
            record.confirm(now);
            if let Err(e) = self.store.update(&record).await {
                warn!("Failed to mark request {request_id} confirmed: {e}");
            }
        }
        ConfirmOutcome::from_platform(result)
    }

    /// Confirm and reply to the commanding user with the outcome
    pub async fn handle_confirm_command(
        &self,
        account: &Account,
        user_id: &str,
        request_id: &str,
        superuser: bool,
        reply_to: &NotifyTarget,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        let outcome = self.confirm(request_id, user_id, superuser, now).await;
        debug!("Confirmation of {request_id} by {user_id}: {outcome:?}");

        match self.adapters.for_account(account) {
            Some(adapter) => {
                if let Err(e) = adapter.send_notification(account, reply_to, outcome.message()).await {
                    warn!("Failed to reply to {reply_to} as {account}: {e}");
                }
            }
            None => warn!("No adapter for {account} to reply on"),
        }
        outcome
    }

    /// Remove expired records
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.store.purge_expired(now, self.config.expire).await?;
        if removed > 0 {
            debug!("Purged {removed} expired request(s)");
        }
        Ok(removed)
    }
}

/// Group or guild an account must be in to post to `target`
fn target_scope(target: &NotifyTarget) -> Option<&str> {
    match target {
        NotifyTarget::Group { group_id } => Some(group_id.as_str()),
        NotifyTarget::Channel { guild_id, .. } => Some(guild_id.as_str()),
        NotifyTarget::Private { .. } => None,
    }
}

/// Order `senders` so accounts that can see `target` come first, keeping
/// connection order within each half
async fn rank_senders(
    adapter: &dyn ErasedPlatformAdapter,
    target: &NotifyTarget,
    senders: Vec<Account>,
) -> Vec<Account> {
    let Some(scope) = target_scope(target) else {
        return senders;
    };

    let visible = join_all(senders.iter().map(|sender| async move {
        match adapter.fetch_memberships(sender).await {
            Ok(Some(groups)) => groups.iter().any(|g| g.id == scope),
            Ok(None) => false,
            Err(e) => {
                debug!("Could not list groups of {sender}: {e}");
                false
            }
        }
    }))
    .await;

    let (members, others): (Vec<_>, Vec<_>) = senders
        .into_iter()
        .zip(visible)
        .partition(|(_, visible)| *visible);
    members
        .into_iter()
        .chain(others)
        .map(|(sender, _)| sender)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{MockAdapter, MockCall};
    use crate::plugins::req_forward::MemoryRequestStore;
    use fleet_core::{ForwardTarget, RequestStatus};

    struct Fixture {
        forwarder: RequestForwarder,
        mock: MockAdapter,
        store: Arc<MemoryRequestStore>,
        bot: Account,
    }

    fn fixture(target: Option<&str>) -> Fixture {
        let mock = MockAdapter::new("onebot11");
        let mut adapters = AdapterRegistry::new();
        adapters.register(mock.clone());
        let accounts = Arc::new(AccountDirectory::new());
        let bot = Account::new("100", "onebot11");
        accounts.connect(bot.clone());

        let store = Arc::new(MemoryRequestStore::new());
        let config = ReqForwardConfig {
            target: target.map(|t| t.parse::<ForwardTarget>().unwrap()),
            superusers: vec!["root".into()],
            ..Default::default()
        };
        let forwarder = RequestForwarder::new(store.clone(), Arc::new(adapters), accounts, config);
        Fixture {
            forwarder,
            mock,
            store,
            bot,
        }
    }

    #[tokio::test]
    async fn test_friend_request_is_recorded_and_forwarded() {
        let f = fixture(Some("onebot11:555"));
        let now = Utc::now();
        let record = f
            .forwarder
            .on_friend_request(&f.bot, "42", "flag-1", now)
            .await
            .unwrap();

        assert_eq!(record.status, RequestStatus::Pending);
        assert_eq!(f.store.get(&record.id).await.unwrap(), Some(record.clone()));

        let notices = f.mock.notify_calls();
        assert_eq!(notices.len(), 1);
        let (sender, target, text) = &notices[0];
        assert_eq!(sender, "100");
        assert_eq!(
            target,
            &NotifyTarget::Group {
                group_id: "555".into()
            }
        );
        assert!(text.contains("42"));
        assert!(text.contains("30 minutes"));
        assert!(text.ends_with(&format!("confirm-req {}", record.id)));
    }

    #[tokio::test]
    async fn test_forward_prefers_member_of_target_group() {
        let f = fixture(Some("onebot11:555"));
        let member = Account::new("200", "onebot11");
        f.mock.set_memberships("100", vec![GroupRef::group("1")]);
        f.mock.set_memberships("200", vec![GroupRef::group("555")]);
        f.forwarder.accounts.connect(member);

        f.forwarder
            .on_friend_request(&f.bot, "42", "flag", Utc::now())
            .await
            .unwrap();

        let senders: Vec<String> = f.mock.notify_calls().into_iter().map(|(s, _, _)| s).collect();
        assert_eq!(senders, vec!["200".to_string()]);
    }

    #[tokio::test]
    async fn test_forward_falls_through_failing_sender() {
        let f = fixture(Some("onebot11:555"));
        f.mock.set_memberships("100", vec![GroupRef::group("555")]);
        f.mock.set_memberships("200", vec![GroupRef::group("1")]);
        f.forwarder.accounts.connect(Account::new("200", "onebot11"));
        f.mock.fail_notify_from("100");

        f.forwarder
            .on_friend_request(&f.bot, "42", "flag", Utc::now())
            .await
            .unwrap();

        let senders: Vec<String> = f.mock.notify_calls().into_iter().map(|(s, _, _)| s).collect();
        assert_eq!(senders, vec!["100".to_string(), "200".to_string()]);
    }

    #[tokio::test]
    async fn test_invite_notice_masks_group() {
        let f = fixture(Some("onebot11:private:9"));
        let record = f
            .forwarder
            .on_guild_invite(&f.bot, "42", &GroupRef::group("123456789"), "flag", Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.group_id.as_deref(), Some("123456789"));
        let text = &f.mock.notify_calls()[0].2;
        assert!(text.contains("12*****89"));
        assert!(!text.contains("123456789"));
    }

    #[tokio::test]
    async fn test_without_target_nothing_is_sent() {
        let f = fixture(None);
        f.forwarder
            .on_friend_request(&f.bot, "42", "flag", Utc::now())
            .await
            .unwrap();
        assert!(f.mock.calls().is_empty());
        assert_eq!(f.store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_confirm_by_requester() {
        let f = fixture(None);
        let now = Utc::now();
        let record = f.forwarder.on_friend_request(&f.bot, "42", "flag-1", now).await.unwrap();

        let outcome = f.forwarder.confirm(&record.id, "42", false, now).await;
        assert_eq!(outcome, ConfirmOutcome::Unknown);
        assert!(f.mock.calls().contains(&MockCall::ProcessRequest(
            f.bot.clone(),
            RequestKind::Friend,
            "flag-1".into(),
            true
        )));
        let stored = f.store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Confirmed);

        // Second attempt finds nothing
        assert_eq!(
            f.forwarder.confirm(&record.id, "42", false, now).await,
            ConfirmOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_confirm_permissions() {
        let f = fixture(None);
        let now = Utc::now();
        let record = f.forwarder.on_friend_request(&f.bot, "42", "flag", now).await.unwrap();

        assert_eq!(
            f.forwarder.confirm(&record.id, "43", false, now).await,
            ConfirmOutcome::NoPermission
        );
        assert_eq!(
            f.forwarder.confirm(&record.id, "root", false, now).await,
            ConfirmOutcome::Unknown
        );
    }

    #[tokio::test]
    async fn test_confirm_expired_and_missing() {
        let f = fixture(None);
        let now = Utc::now();
        let record = f.forwarder.on_friend_request(&f.bot, "42", "flag", now).await.unwrap();

        let later = now + chrono::Duration::minutes(31);
        assert_eq!(
            f.forwarder.confirm(&record.id, "42", false, later).await,
            ConfirmOutcome::NotFound
        );
        assert_eq!(
            f.forwarder.confirm("nope", "42", true, now).await,
            ConfirmOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_platform_rejection_keeps_record_pending() {
        let f = fixture(None);
        f.mock.set_process_result(Some(false));
        let now = Utc::now();
        let record = f.forwarder.on_friend_request(&f.bot, "42", "flag", now).await.unwrap();

        assert_eq!(
            f.forwarder.confirm(&record.id, "42", false, now).await,
            ConfirmOutcome::Rejected
        );
        let stored = f.store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn test_adapter_failure_reports_failed() {
        let f = fixture(None);
        f.mock.set_fail_process(true);
        let now = Utc::now();
        let record = f.forwarder.on_friend_request(&f.bot, "42", "flag", now).await.unwrap();
        assert_eq!(
            f.forwarder.confirm(&record.id, "42", false, now).await,
            ConfirmOutcome::Failed
        );
    }

    #[tokio::test]
    async fn test_handle_confirm_command_replies() {
        let f = fixture(None);
        f.mock.set_process_result(Some(true));
        let now = Utc::now();
        let record = f.forwarder.on_friend_request(&f.bot, "42", "flag", now).await.unwrap();
        let reply_to = NotifyTarget::Private {
            user_id: "42".into(),
        };

        let outcome = f
            .forwarder
            .handle_confirm_command(&f.bot, "42", &record.id, false, &reply_to, now)
            .await;
        assert_eq!(outcome, ConfirmOutcome::Approved);
        let replies = f.mock.notify_calls();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1, reply_to);
        assert_eq!(replies[0].2, "Request approved");
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let f = fixture(None);
        let now = Utc::now();
        f.forwarder.on_friend_request(&f.bot, "1", "a", now).await.unwrap();
        f.forwarder
            .on_friend_request(&f.bot, "2", "b", now + chrono::Duration::minutes(20))
            .await
            .unwrap();
        let removed = f.forwarder.sweep(now + chrono::Duration::minutes(35)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(f.store.len().await.unwrap(), 1);
    }
}
