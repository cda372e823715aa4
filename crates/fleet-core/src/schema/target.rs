//! Message destinations
//!
//! [`NotifyTarget`] is a destination reachable by a specific account;
//! [`ForwardTarget`] adds the platform tag so the configured moderator
//! channel can be parsed from a single config string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A destination that can receive a text message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyTarget {
    Group { group_id: String },
    Channel { guild_id: String, channel_id: String },
    Private { user_id: String },
}

impl fmt::Display for NotifyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyTarget::Group { group_id } => write!(f, "group:{group_id}"),
            NotifyTarget::Channel {
                guild_id,
                channel_id,
            } => write!(f, "channel:{guild_id}:{channel_id}"),
            NotifyTarget::Private { user_id } => write!(f, "private:{user_id}"),
        }
    }
}

/// Errors from parsing a target string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("target is missing a platform tag")]
    MissingPlatform,

    #[error("target syntax error: {message}")]
    Syntax { message: String },
}

/// A [`NotifyTarget`] on a specific platform.
///
/// Syntax: `<platform>[:private|:channel][:<parent_id>]:<target_id>`
///
/// ```
/// use fleet_core::schema::{ForwardTarget, NotifyTarget};
///
/// let t: ForwardTarget = "onebot11:123456".parse().unwrap();
/// assert_eq!(t.platform, "onebot11");
/// assert_eq!(t.target, NotifyTarget::Group { group_id: "123456".into() });
///
/// let t: ForwardTarget = "qqguild:channel:9:42".parse().unwrap();
/// assert_eq!(
///     t.target,
///     NotifyTarget::Channel { guild_id: "9".into(), channel_id: "42".into() }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub platform: String,
    pub target: NotifyTarget,
}

impl FromStr for ForwardTarget {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = s.split(':').collect();

        let platform = parts.remove(0).trim();
        if platform.is_empty() {
            return Err(TargetParseError::MissingPlatform);
        }
        if parts.is_empty() {
            return Err(TargetParseError::Syntax {
                message: "expected a target id after the platform".to_string(),
            });
        }

        let private = parts[0] == "private";
        let channel = parts[0] == "channel";
        if private || channel {
            parts.remove(0);
        }

        let (parent, target_id) = match parts.as_slice() {
            [parent, id] if !parent.is_empty() && !id.is_empty() => {
                (Some(parent.to_string()), id.to_string())
            }
            [id] if !id.is_empty() => (None, id.to_string()),
            _ => {
                return Err(TargetParseError::Syntax {
                    message: format!(
                        "expected [<parent_id>:]<target_id>, got {} part(s)",
                        parts.len()
                    ),
                });
            }
        };

        let target = match (channel, private, parent) {
            (true, _, Some(guild_id)) => NotifyTarget::Channel {
                guild_id,
                channel_id: target_id,
            },
            (true, _, None) => {
                return Err(TargetParseError::Syntax {
                    message: "channel targets need a parent guild id".to_string(),
                });
            }
            (false, _, Some(_)) => {
                return Err(TargetParseError::Syntax {
                    message: "only channel targets take a parent id".to_string(),
                });
            }
            (false, true, None) => NotifyTarget::Private { user_id: target_id },
            (false, false, None) => NotifyTarget::Group {
                group_id: target_id,
            },
        };

        Ok(Self {
            platform: platform.to_string(),
            target,
        })
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            NotifyTarget::Group { group_id } => write!(f, "{}:{group_id}", self.platform),
            NotifyTarget::Channel {
                guild_id,
                channel_id,
            } => write!(f, "{}:channel:{guild_id}:{channel_id}", self.platform),
            NotifyTarget::Private { user_id } => write!(f, "{}:private:{user_id}", self.platform),
        }
    }
}
