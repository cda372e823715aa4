//! Host events and listener dispatch

mod listener;

pub use listener::{DispatchReport, EventHandler, FnHandler, ListenerRegistry};

use fleet_core::{Account, GroupRef, NotifyTarget};
use serde::{Deserialize, Serialize};

/// Kind of a [`BotEvent`], used as the registration key for handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    GroupJoined,
    FriendRequest,
    GuildInvite,
    ConfirmCommand,
    ArbitrateRequested,
}

/// An event reported by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    Connected {
        account: Account,
    },
    Disconnected {
        account: Account,
    },
    GroupJoined {
        account: Account,
        group: GroupRef,
    },
    FriendRequest {
        account: Account,
        user_id: String,
        identifier: String,
    },
    GuildInvite {
        account: Account,
        user_id: String,
        group: GroupRef,
        identifier: String,
    },
    /// A user asked to confirm a forwarded request
    ConfirmCommand {
        account: Account,
        user_id: String,
        request_id: String,
        #[serde(default)]
        superuser: bool,
        reply_to: NotifyTarget,
    },
    /// Operator asked for an immediate arbitration run
    ArbitrateRequested {
        platform: String,
    },
}

impl BotEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BotEvent::Connected { .. } => EventKind::Connected,
            BotEvent::Disconnected { .. } => EventKind::Disconnected,
            BotEvent::GroupJoined { .. } => EventKind::GroupJoined,
            BotEvent::FriendRequest { .. } => EventKind::FriendRequest,
            BotEvent::GuildInvite { .. } => EventKind::GuildInvite,
            BotEvent::ConfirmCommand { .. } => EventKind::ConfirmCommand,
            BotEvent::ArbitrateRequested { .. } => EventKind::ArbitrateRequested,
        }
    }

    /// Account the event happened on, if any
    pub fn account(&self) -> Option<&Account> {
        match self {
            BotEvent::Connected { account }
            | BotEvent::Disconnected { account }
            | BotEvent::GroupJoined { account, .. }
            | BotEvent::FriendRequest { account, .. }
            | BotEvent::GuildInvite { account, .. }
            | BotEvent::ConfirmCommand { account, .. } => Some(account),
            BotEvent::ArbitrateRequested { .. } => None,
        }
    }
}
