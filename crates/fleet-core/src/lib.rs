//! Core types for bot-fleet
//!
//! This crate holds the pieces shared by the daemon and its plugins:
//! - Account and group references as seen by the transport layer
//! - Forward targets and notification targets
//! - Friend / guild-invite request records and their soft expiry
//! - Configuration resolution, home directory lookup, and logging setup

pub mod config;
pub mod home;
pub mod logging;
pub mod schema;
pub mod text;

pub use schema::{
    Account, ForwardTarget, GroupRef, NotifyTarget, RequestKind, RequestRecord, RequestStatus,
};

// Re-export toml for plugin config access
pub use toml;
