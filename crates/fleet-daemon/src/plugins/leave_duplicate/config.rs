//! Configuration for the leave_duplicate plugin

use super::planner::StayPolicy;
use crate::plugin::PluginError;
use fleet_core::toml;
use std::time::Duration;

/// Courtesy message posted by the staying account before the others leave
pub const DEFAULT_NOTICE: &str = "Several bots of this fleet are in this group. \
To avoid duplicate replies, only this one will stay. Thanks for understanding!";

/// Configuration parsed from `[plugins.leave_duplicate]`
#[derive(Debug, Clone)]
pub struct LeaveDuplicateConfig {
    pub enabled: bool,
    /// Quiet period after the last trigger before a run starts
    pub debounce: Duration,
    /// Bounds of the random pause between plan entries
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Per-account membership fetch timeout
    pub fetch_timeout: Duration,
    pub stay_policy: StayPolicy,
    pub notice: String,
}

impl LeaveDuplicateConfig {
    /// Parse configuration from TOML table
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Config` for an unknown stay policy or inverted
    /// delay bounds.
    pub fn from_toml(table: &toml::Table) -> Result<Self, PluginError> {
        let defaults = Self::default();

        let enabled = table
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.enabled);

        let debounce = table
            .get("debounce_ms")
            .and_then(|v| v.as_integer())
            .map(|v| Duration::from_millis(v.max(0) as u64))
            .unwrap_or(defaults.debounce);

        let min_delay = secs_or(table, "min_delay_secs", defaults.min_delay);
        let max_delay = secs_or(table, "max_delay_secs", defaults.max_delay);
        if min_delay > max_delay {
            return Err(PluginError::Config {
                message: format!(
                    "min_delay_secs ({}) is greater than max_delay_secs ({})",
                    min_delay.as_secs(),
                    max_delay.as_secs()
                ),
            });
        }

        let fetch_timeout = secs_or(table, "fetch_timeout_secs", defaults.fetch_timeout);

        let stay_policy = match table.get("stay_policy").and_then(|v| v.as_str()) {
            Some(raw) => raw.parse::<StayPolicy>()?,
            None => defaults.stay_policy,
        };

        let notice = table
            .get("notice")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or(defaults.notice);

        Ok(Self {
            enabled,
            debounce,
            min_delay,
            max_delay,
            fetch_timeout,
            stay_policy,
            notice,
        })
    }
}

fn secs_or(table: &toml::Table, key: &str, default: Duration) -> Duration {
    table
        .get(key)
        .and_then(|v| v.as_integer())
        .map(|v| Duration::from_secs(v.max(0) as u64))
        .unwrap_or(default)
}

impl Default for LeaveDuplicateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: Duration::from_millis(500),
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(30),
            stay_policy: StayPolicy::MostGroups,
            notice: DEFAULT_NOTICE.to_string(),
        }
    }
}
