//! Friend / guild-invite request records
//!
//! A record is created when a request event fires and forwarded to the
//! moderator channel. It can be confirmed while it is fresh: the expiry
//! window is measured from `last_modified` and checked lazily when someone
//! tries to confirm.

use crate::schema::Account;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of generated request ids.
pub const REQUEST_ID_LEN: usize = 8;

/// Default soft-expiry window.
pub const DEFAULT_EXPIRE_MINUTES: i64 = 30;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a request id: 8 distinct alphanumeric characters.
pub fn generate_request_id() -> String {
    let mut rng = rand::thread_rng();
    ID_ALPHABET
        .choose_multiple(&mut rng, REQUEST_ID_LEN)
        .map(|&b| b as char)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Friend,
    GuildInvite,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Friend => write!(f, "friend"),
            RequestKind::GuildInvite => write!(f, "guild_invite"),
        }
    }
}

/// A forwarded request awaiting confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub status: RequestStatus,
    pub kind: RequestKind,
    /// Account that received the request and must apply the confirmation
    pub origin_account: Account,
    /// User who sent the request
    pub requesting_user: String,
    /// Platform handle needed to approve the request (OneBot `flag`, ...)
    pub identifier: String,
    /// Invited group, for guild invites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl RequestRecord {
    /// New pending record with a fresh id.
    pub fn new(
        kind: RequestKind,
        origin_account: Account,
        requesting_user: impl Into<String>,
        identifier: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_request_id(),
            status: RequestStatus::Pending,
            kind,
            origin_account,
            requesting_user: requesting_user.into(),
            identifier: identifier.into(),
            group_id: None,
            created_at: now,
            last_modified: now,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// True once `window` has passed since the last modification.
    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_modified > window
    }

    /// Pending and not expired.
    pub fn is_actionable(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status == RequestStatus::Pending && !self.is_expired(now, window)
    }

    pub fn confirm(&mut self, now: DateTime<Utc>) {
        self.status = RequestStatus::Confirmed;
        self.last_modified = now;
    }
}
