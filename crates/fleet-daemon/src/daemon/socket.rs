//! Unix socket ingest of host events.
//!
//! The host process (the bot framework holding the actual connections)
//! reports account and request events on a Unix domain socket, by default:
//!
//! ```text
//! ${FLEET_HOME}/.fleet/fleet-daemon.sock
//! ```
//!
//! Each client connection follows a simple request/response protocol:
//!
//! 1. Client connects
//! 2. Client writes one JSON line, e.g.
//!    `{"type":"connect","account":{"id":"1","platform":"onebot11"}}`
//! 3. Server writes one JSON line: `{"status":"ok",...}` or
//!    `{"status":"error","message":"..."}`
//! 4. Server closes the connection
//!
//! ## Platform availability
//!
//! The socket server is only active on Unix platforms.

use crate::adapter::AccountDirectory;
use crate::events::{BotEvent, DispatchReport, ListenerRegistry};
use anyhow::Result;
use fleet_core::{Account, GroupRef, NotifyTarget};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default socket file name inside the runtime directory
pub const SOCKET_FILE: &str = "fleet-daemon.sock";

/// A request line from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    Connect {
        account: Account,
    },
    Disconnect {
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
    Confirm {
        account: Account,
        user_id: String,
        request_id: String,
        #[serde(default)]
        superuser: bool,
        reply_to: NotifyTarget,
    },
    /// Run leave arbitration for a platform now
    Arbitrate {
        platform: String,
    },
}

impl HostRequest {
    pub fn into_event(self) -> BotEvent {
        match self {
            HostRequest::Connect { account } => BotEvent::Connected { account },
            HostRequest::Disconnect { account } => BotEvent::Disconnected { account },
            HostRequest::GroupJoined { account, group } => BotEvent::GroupJoined { account, group },
            HostRequest::FriendRequest {
                account,
                user_id,
                identifier,
            } => BotEvent::FriendRequest {
                account,
                user_id,
                identifier,
            },
            HostRequest::GuildInvite {
                account,
                user_id,
                group,
                identifier,
            } => BotEvent::GuildInvite {
                account,
                user_id,
                group,
                identifier,
            },
            HostRequest::Confirm {
                account,
                user_id,
                request_id,
                superuser,
                reply_to,
            } => BotEvent::ConfirmCommand {
                account,
                user_id,
                request_id,
                superuser,
                reply_to,
            },
            HostRequest::Arbitrate { platform } => BotEvent::ArbitrateRequested { platform },
        }
    }
}

/// Response line written back to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Handlers invoked for the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handlers: Option<usize>,
    /// Handlers that failed or panicked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
}

impl HostResponse {
    pub fn ok(report: DispatchReport) -> Self {
        Self {
            status: "ok".to_string(),
            message: None,
            handlers: Some(report.invoked),
            failed: Some(report.failed),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            handlers: None,
            failed: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Apply one host request: keep the account directory current, then
/// dispatch the event to the registered handlers.
pub async fn apply_host_request(
    request: HostRequest,
    accounts: &AccountDirectory,
    listeners: &ListenerRegistry,
) -> DispatchReport {
    match &request {
        HostRequest::Connect { account } => {
            if !accounts.connect(account.clone()) {
                debug!("Account {account} reconnected");
            }
        }
        HostRequest::Disconnect { account } => {
            if !accounts.disconnect(account) {
                debug!("Disconnect for unknown account {account}");
            }
        }
        _ => {}
    }
    listeners.dispatch(request.into_event()).await
}

/// Parse and apply a raw request line
pub async fn handle_request_line(
    line: &str,
    accounts: &AccountDirectory,
    listeners: &ListenerRegistry,
) -> HostResponse {
    match serde_json::from_str::<HostRequest>(line) {
        Ok(request) => {
            debug!("Host request: {request:?}");
            HostResponse::ok(apply_host_request(request, accounts, listeners).await)
        }
        Err(e) => {
            warn!("Malformed host request: {e}; raw: {line}");
            HostResponse::error(format!("Failed to parse request: {e}"))
        }
    }
}

/// A handle to the running socket server.
///
/// Dropping this handle removes the socket file from disk.
#[derive(Debug)]
pub struct SocketServerHandle {
    socket_path: PathBuf,
}

impl SocketServerHandle {
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for SocketServerHandle {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Failed to remove socket file {}: {e}", self.socket_path.display());
            } else {
                debug!("Removed socket file {}", self.socket_path.display());
            }
        }
    }
}

/// Start the socket server and return a handle that cleans up the socket
/// on drop. Returns `Ok(None)` on non-Unix platforms.
#[allow(unused_variables)]
pub async fn start_socket_server(
    socket_path: PathBuf,
    accounts: Arc<AccountDirectory>,
    listeners: Arc<ListenerRegistry>,
    cancel: CancellationToken,
) -> Result<Option<SocketServerHandle>> {
    #[cfg(unix)]
    {
        start_unix_socket_server(socket_path, accounts, listeners, cancel)
            .await
            .map(Some)
    }

    #[cfg(not(unix))]
    {
        info!("Unix socket server not available on this platform");
        Ok(None)
    }
}

#[cfg(unix)]
async fn start_unix_socket_server(
    socket_path: PathBuf,
    accounts: Arc<AccountDirectory>,
    listeners: Arc<ListenerRegistry>,
    cancel: CancellationToken,
) -> Result<SocketServerHandle> {
    use anyhow::Context;
    use tokio::net::UnixListener;

    if let Some(dir) = socket_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    // A previous daemon may have crashed without cleaning up
    if socket_path.exists() {
        warn!("Removing stale socket file: {}", socket_path.display());
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))?;
    info!("Unix socket server listening on {}", socket_path.display());

    tokio::spawn(run_accept_loop(listener, accounts, listeners, cancel));

    Ok(SocketServerHandle { socket_path })
}

#[cfg(unix)]
async fn run_accept_loop(
    listener: tokio::net::UnixListener,
    accounts: Arc<AccountDirectory>,
    listeners: Arc<ListenerRegistry>,
    cancel: CancellationToken,
) {
    debug!("Socket accept loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Socket server cancelled");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let accounts = accounts.clone();
                        let listeners = listeners.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &accounts, &listeners).await {
                                error!("Socket connection handler error: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error on host socket: {e}");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    debug!("Socket accept loop stopped");
}

#[cfg(unix)]
async fn handle_connection(
    stream: tokio::net::UnixStream,
    accounts: &AccountDirectory,
    listeners: &ListenerRegistry,
) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();

    match reader.read_line(&mut request_line).await {
        Ok(0) => {
            debug!("Client disconnected without sending request");
            return Ok(());
        }
        Err(e) => {
            warn!("Failed to read socket request: {e}");
            return Ok(());
        }
        Ok(_) => {}
    }

    let response = handle_request_line(request_line.trim(), accounts, listeners).await;

    let mut response_json = serde_json::to_string(&response)?;
    response_json.push('\n');

    let mut stream = reader.into_inner();
    stream.write_all(response_json.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}
