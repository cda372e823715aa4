//! Where to post the courtesy notice for a group

use crate::adapter::ErasedPlatformAdapter;
use fleet_core::{Account, GroupRef, NotifyTarget};
use tracing::warn;

/// Destinations reachable by `account` for `group`, in preference order.
///
/// A plain group is its own target. A guild expands to its text
/// sub-channels (empty if they cannot be listed). A channel targets itself
/// within its guild.
pub async fn resolve_notify_targets(
    adapter: &dyn ErasedPlatformAdapter,
    account: &Account,
    group: &GroupRef,
) -> Vec<NotifyTarget> {
    if group.is_private {
        return Vec::new();
    }

    if group.is_channel {
        return match &group.parent_id {
            Some(guild_id) => vec![NotifyTarget::Channel {
                guild_id: guild_id.clone(),
                channel_id: group.id.clone(),
            }],
            None => Vec::new(),
        };
    }

    if group.is_guild {
        return match adapter.list_text_channels(account, group).await {
            Ok(channels) => channels
                .into_iter()
                .map(|channel| NotifyTarget::Channel {
                    guild_id: group.id.clone(),
                    channel_id: channel.id,
                })
                .collect(),
            Err(e) => {
                warn!("Failed to list channels of guild {group} as {account}: {e}");
                Vec::new()
            }
        };
    }

    vec![NotifyTarget::Group {
        group_id: group.id.clone(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MockAdapter;

    #[tokio::test]
    async fn test_plain_group_targets_itself() {
        let mock = MockAdapter::new("onebot11");
        let targets =
            resolve_notify_targets(&mock, &Account::new("a", "onebot11"), &GroupRef::group("5")).await;
        assert_eq!(
            targets,
            vec![NotifyTarget::Group {
                group_id: "5".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_guild_expands_to_channels() {
        let mock = MockAdapter::new("qqguild");
        mock.set_channels(
            "g",
            vec![GroupRef::channel("g", "c1"), GroupRef::channel("g", "c2")],
        );
        let targets =
            resolve_notify_targets(&mock, &Account::new("a", "qqguild"), &GroupRef::guild("g")).await;
        assert_eq!(
            targets,
            vec![
                NotifyTarget::Channel {
                    guild_id: "g".into(),
                    channel_id: "c1".into()
                },
                NotifyTarget::Channel {
                    guild_id: "g".into(),
                    channel_id: "c2".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_and_private() {
        let mock = MockAdapter::new("qqguild");
        let a = Account::new("a", "qqguild");
        let targets = resolve_notify_targets(&mock, &a, &GroupRef::channel("g", "c")).await;
        assert_eq!(
            targets,
            vec![NotifyTarget::Channel {
                guild_id: "g".into(),
                channel_id: "c".into()
            }]
        );
        assert!(
            resolve_notify_targets(&mock, &a, &GroupRef::private("u"))
                .await
                .is_empty()
        );
        // Guild without listed channels has nowhere to post
        assert!(
            resolve_notify_targets(&mock, &a, &GroupRef::guild("none"))
                .await
                .is_empty()
        );
    }
}
