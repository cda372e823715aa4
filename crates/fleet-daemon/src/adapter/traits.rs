//! Adapter trait for platform operations

use fleet_core::{Account, GroupRef, NotifyTarget, RequestKind};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors reported by a platform adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{operation} is not supported on platform {platform}")]
    Unsupported {
        operation: &'static str,
        platform: String,
    },

    #[error("no connection details for account {account}")]
    UnknownAccount { account: String },

    #[error("request failed: {message}")]
    Request {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("API call {action} failed with retcode {retcode}: {message}")]
    Api {
        action: String,
        retcode: i64,
        message: String,
    },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
}

impl AdapterError {
    pub fn request(message: impl Into<String>) -> Self {
        AdapterError::Request {
            message: message.into(),
            source: None,
        }
    }
}

/// Operations the daemon needs from a chat platform.
///
/// Uses RPITIT (Return Position Impl Trait in Traits) with explicit Send bounds.
pub trait PlatformAdapter: Send + Sync + std::fmt::Debug {
    /// Platform tag served by this adapter (e.g. `"onebot11"`)
    fn platform(&self) -> &str;

    /// Whether accounts on this platform can leave groups at all
    fn supports_leave(&self) -> bool {
        true
    }

    /// Groups `account` currently belongs to.
    ///
    /// `Ok(None)` means the platform cannot enumerate memberships for this
    /// account.
    fn fetch_memberships(
        &self,
        account: &Account,
    ) -> impl Future<Output = Result<Option<Vec<GroupRef>>, AdapterError>> + Send;

    /// Make `account` leave `group`
    fn leave_group(
        &self,
        account: &Account,
        group: &GroupRef,
    ) -> impl Future<Output = Result<(), AdapterError>> + Send;

    /// Send a text message to `target` as `account`
    fn send_notification(
        &self,
        account: &Account,
        target: &NotifyTarget,
        text: &str,
    ) -> impl Future<Output = Result<(), AdapterError>> + Send;

    /// Text sub-channels of a guild visible to `account`. Default: none.
    fn list_text_channels(
        &self,
        _account: &Account,
        _guild: &GroupRef,
    ) -> impl Future<Output = Result<Vec<GroupRef>, AdapterError>> + Send {
        async { Ok(Vec::new()) }
    }

    /// Approve or reject a pending friend / invite request.
    ///
    /// `Some(false)` means the platform rejected the approval, `None` means
    /// the outcome is unknown.
    fn process_request(
        &self,
        _account: &Account,
        _kind: RequestKind,
        _identifier: &str,
        _approve: bool,
    ) -> impl Future<Output = Result<Option<bool>, AdapterError>> + Send {
        let platform = self.platform().to_string();
        async move {
            Err(AdapterError::Unsupported {
                operation: "process_request",
                platform,
            })
        }
    }
}

/// Object-safe version of PlatformAdapter for type erasure.
///
/// Implemented automatically for every [`PlatformAdapter`]; the registry
/// stores `Arc<dyn ErasedPlatformAdapter>`.
pub trait ErasedPlatformAdapter: Send + Sync + std::fmt::Debug {
    fn platform(&self) -> &str;

    fn supports_leave(&self) -> bool;

    fn fetch_memberships<'a>(
        &'a self,
        account: &'a Account,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<GroupRef>>, AdapterError>> + Send + 'a>>;

    fn leave_group<'a>(
        &'a self,
        account: &'a Account,
        group: &'a GroupRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>>;

    fn send_notification<'a>(
        &'a self,
        account: &'a Account,
        target: &'a NotifyTarget,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>>;

    fn list_text_channels<'a>(
        &'a self,
        account: &'a Account,
        guild: &'a GroupRef,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<GroupRef>, AdapterError>> + Send + 'a>>;

    fn process_request<'a>(
        &'a self,
        account: &'a Account,
        kind: RequestKind,
        identifier: &'a str,
        approve: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Option<bool>, AdapterError>> + Send + 'a>>;
}

impl<T: PlatformAdapter> ErasedPlatformAdapter for T {
    fn platform(&self) -> &str {
        PlatformAdapter::platform(self)
    }

    fn supports_leave(&self) -> bool {
        PlatformAdapter::supports_leave(self)
    }

    fn fetch_memberships<'a>(
        &'a self,
        account: &'a Account,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<GroupRef>>, AdapterError>> + Send + 'a>>
    {
        Box::pin(PlatformAdapter::fetch_memberships(self, account))
    }

    fn leave_group<'a>(
        &'a self,
        account: &'a Account,
        group: &'a GroupRef,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(PlatformAdapter::leave_group(self, account, group))
    }

    fn send_notification<'a>(
        &'a self,
        account: &'a Account,
        target: &'a NotifyTarget,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AdapterError>> + Send + 'a>> {
        Box::pin(PlatformAdapter::send_notification(self, account, target, text))
    }

    fn list_text_channels<'a>(
        &'a self,
        account: &'a Account,
        guild: &'a GroupRef,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<GroupRef>, AdapterError>> + Send + 'a>> {
        Box::pin(PlatformAdapter::list_text_channels(self, account, guild))
    }

    fn process_request<'a>(
        &'a self,
        account: &'a Account,
        kind: RequestKind,
        identifier: &'a str,
        approve: bool,
    ) -> Pin<Box<dyn Future<Output = Result<Option<bool>, AdapterError>> + Send + 'a>> {
        Box::pin(PlatformAdapter::process_request(
            self, account, kind, identifier, approve,
        ))
    }
}
