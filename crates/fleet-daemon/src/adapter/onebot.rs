//! OneBot v11 adapter over the HTTP API
//!
//! Each account runs its own OneBot implementation; the daemon reaches it
//! at the account's configured `endpoint`. Every action is a POST to
//! `<endpoint>/<action>` with a JSON body, answered by the standard
//! `{status, retcode, data}` envelope.

use super::traits::{AdapterError, PlatformAdapter};
use fleet_core::config::Config;
use fleet_core::{Account, GroupRef, NotifyTarget, RequestKind};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Platform tag served by this adapter
pub const PLATFORM: &str = "onebot11";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    retcode: i64,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    wording: Option<String>,
}

/// OneBot v11 adapter
#[derive(Debug, Clone)]
pub struct OneBotAdapter {
    client: reqwest::Client,
    endpoints: HashMap<String, Endpoint>,
}

impl OneBotAdapter {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built (e.g. no TLS backend).
    pub fn new() -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Request {
                message: "failed to build HTTP client".to_string(),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            endpoints: HashMap::new(),
        })
    }

    /// Adapter with an endpoint for every `onebot11` account in the config.
    /// Accounts without an endpoint are skipped with a warning.
    pub fn from_config(config: &Config) -> Result<Self, AdapterError> {
        let mut adapter = Self::new()?;
        for account in config.accounts_for(PLATFORM) {
            match &account.endpoint {
                Some(url) => {
                    adapter = adapter.with_endpoint(
                        account.id.clone(),
                        url.clone(),
                        account.access_token.clone(),
                    );
                }
                None => warn!("Account {} has no endpoint configured", account.id),
            }
        }
        Ok(adapter)
    }

    pub fn with_endpoint(
        mut self,
        account_id: impl Into<String>,
        base_url: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.endpoints.insert(
            account_id.into(),
            Endpoint {
                base_url,
                access_token,
            },
        );
        self
    }

    pub fn has_endpoint(&self, account_id: &str) -> bool {
        self.endpoints.contains_key(account_id)
    }

    fn endpoint(&self, account: &Account) -> Result<&Endpoint, AdapterError> {
        self.endpoints
            .get(&account.id)
            .ok_or_else(|| AdapterError::UnknownAccount {
                account: account.to_string(),
            })
    }

    async fn call(&self, account: &Account, action: &str, params: Value) -> Result<Value, AdapterError> {
        let endpoint = self.endpoint(account)?;
        let url = format!("{}/{action}", endpoint.base_url);
        debug!(url = %url, "OneBot call {action} as {account}");

        let mut request = self.client.post(&url).json(&params);
        if let Some(token) = &endpoint.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| AdapterError::Request {
            message: format!("{action} as {account}"),
            source: Some(Box::new(e)),
        })?;

        let envelope: ApiResponse = response.json().await.map_err(|e| AdapterError::Request {
            message: format!("failed to parse {action} response"),
            source: Some(Box::new(e)),
        })?;

        unwrap_envelope(action, envelope)
    }
}

fn unwrap_envelope(action: &str, envelope: ApiResponse) -> Result<Value, AdapterError> {
    match envelope.status.as_str() {
        "ok" | "async" => Ok(envelope.data),
        _ => Err(AdapterError::Api {
            action: action.to_string(),
            retcode: envelope.retcode,
            message: envelope
                .wording
                .or(envelope.message)
                .unwrap_or_else(|| envelope.status.clone()),
        }),
    }
}

fn parse_group_list(data: &Value) -> Result<Vec<GroupRef>, AdapterError> {
    let entries = data
        .as_array()
        .ok_or_else(|| AdapterError::request("get_group_list returned a non-array payload"))?;

    Ok(entries
        .iter()
        .filter_map(|entry| match entry.get("group_id") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        })
        .map(GroupRef::group)
        .collect())
}

/// OneBot ids are integers on the wire.
fn numeric_id(kind: &str, id: &str) -> Result<i64, AdapterError> {
    id.parse::<i64>()
        .map_err(|e| AdapterError::Request {
            message: format!("{kind} id {id:?} is not numeric"),
            source: Some(Box::new(e)),
        })
}

impl PlatformAdapter for OneBotAdapter {
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn fetch_memberships(&self, account: &Account) -> Result<Option<Vec<GroupRef>>, AdapterError> {
        let data = self.call(account, "get_group_list", json!({})).await?;
        parse_group_list(&data).map(Some)
    }

    async fn leave_group(&self, account: &Account, group: &GroupRef) -> Result<(), AdapterError> {
        if group.is_channel || group.is_guild || group.is_private {
            return Err(AdapterError::Unsupported {
                operation: "leave_group for non-group scenes",
                platform: PLATFORM.to_string(),
            });
        }
        let group_id = numeric_id("group", &group.id)?;
        self.call(account, "set_group_leave", json!({ "group_id": group_id }))
            .await
            .map(|_| ())
    }

    async fn send_notification(
        &self,
        account: &Account,
        target: &NotifyTarget,
        text: &str,
    ) -> Result<(), AdapterError> {
        let (action, params) = match target {
            NotifyTarget::Group { group_id } => (
                "send_group_msg",
                json!({ "group_id": numeric_id("group", group_id)?, "message": text }),
            ),
            NotifyTarget::Private { user_id } => (
                "send_private_msg",
                json!({ "user_id": numeric_id("user", user_id)?, "message": text }),
            ),
            NotifyTarget::Channel { .. } => {
                return Err(AdapterError::Unsupported {
                    operation: "channel messages",
                    platform: PLATFORM.to_string(),
                });
            }
        };
        self.call(account, action, params).await.map(|_| ())
    }

    async fn process_request(
        &self,
        account: &Account,
        kind: RequestKind,
        identifier: &str,
        approve: bool,
    ) -> Result<Option<bool>, AdapterError> {
        let (action, params) = match kind {
            RequestKind::Friend => (
                "set_friend_add_request",
                json!({ "flag": identifier, "approve": approve }),
            ),
            RequestKind::GuildInvite => (
                "set_group_add_request",
                json!({ "flag": identifier, "sub_type": "invite", "approve": approve }),
            ),
        };
        self.call(account, action, params).await?;
        // The protocol does not report whether the approval took effect
        Ok(None)
    }
}
