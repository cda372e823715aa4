//! Shared-space reference (group, guild, or guild sub-channel)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a space a bot account can be a member of and can leave.
///
/// Two refs are equal iff their `id` matches and, for channel refs, their
/// `parent_id` matches too. The flags do not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: String,
    /// Owning guild for sub-channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_channel: bool,
    /// Top-level guild that contains channels
    #[serde(default)]
    pub is_guild: bool,
}

impl GroupRef {
    /// A plain group chat.
    pub fn group(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            is_private: false,
            is_channel: false,
            is_guild: false,
        }
    }

    /// A guild that owns sub-channels.
    pub fn guild(id: impl Into<String>) -> Self {
        Self {
            is_guild: true,
            ..Self::group(id)
        }
    }

    /// A sub-channel of `guild_id`.
    pub fn channel(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            id: channel_id.into(),
            parent_id: Some(guild_id.into()),
            is_private: false,
            is_channel: true,
            is_guild: false,
        }
    }

    /// A private (one-to-one) scene.
    pub fn private(id: impl Into<String>) -> Self {
        Self {
            is_private: true,
            ..Self::group(id)
        }
    }

    fn scope(&self) -> Option<&str> {
        if self.is_channel {
            self.parent_id.as_deref()
        } else {
            None
        }
    }
}

impl PartialEq for GroupRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.scope() == other.scope()
    }
}

impl Eq for GroupRef {}

impl Hash for GroupRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.scope().hash(state);
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope() {
            Some(parent) => write!(f, "{parent}/{}", self.id),
            None => write!(f, "{}", self.id),
        }
    }
}
