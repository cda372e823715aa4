//! Plugin daemon for a fleet of chat-bot accounts
//!
//! The daemon receives connection and membership events from the host,
//! fans them out to plugins, and talks back to chat platforms through
//! [`adapter::PlatformAdapter`] implementations.

pub mod adapter;
pub mod daemon;
pub mod events;
pub mod plugin;
pub mod plugins;
