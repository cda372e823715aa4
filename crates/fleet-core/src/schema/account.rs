//! Bot account reference

use serde::{Deserialize, Serialize};
use std::fmt;

/// A logged-in bot account as reported by the transport layer.
///
/// `platform` is the protocol/adapter tag (e.g. `"onebot11"`). Accounts with
/// the same tag form an account family: only they can share a literal group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    /// Account id on its platform (QQ number, bot user id, ...)
    pub id: String,
    /// Platform / adapter tag
    pub platform: String,
}

impl Account {
    pub fn new(id: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
        }
    }

    /// True when both accounts belong to the same account family.
    pub fn same_family(&self, other: &Account) -> bool {
        self.platform == other.platform
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.id)
    }
}
