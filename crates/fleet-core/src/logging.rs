//! Shared logging initialization for bot-fleet binaries.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level(raw: Option<&str>) -> tracing::Level {
    match raw.unwrap_or("info").to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Initialize process-level tracing output from `FLEET_LOG`.
///
/// `force_debug` overrides the environment (used by `--verbose`).
/// Safe to call multiple times; only the first call installs the subscriber.
pub fn init(force_debug: bool) {
    if INIT.get().is_some() {
        return;
    }
    let level = if force_debug {
        tracing::Level::DEBUG
    } else {
        parse_level(std::env::var("FLEET_LOG").ok().as_deref())
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
    let _ = INIT.set(());
}
