//! Friend / guild-invite request forwarding
//!
//! Requests received by any account are recorded and announced in a
//! moderator channel. A moderator (or the requester) confirms with
//! `confirm-req <id>` while the record is fresh.

mod config;
mod forwarder;
mod plugin;
mod store;

pub use config::ReqForwardConfig;
pub use forwarder::{CONFIRM_COMMAND, ConfirmOutcome, RequestForwarder};
pub use plugin::ReqForwardPlugin;
pub use store::{JsonFileRequestStore, MemoryRequestStore, RequestStore, StoreError};
