//! Configuration for the req_forward plugin

use crate::plugin::PluginError;
use fleet_core::ForwardTarget;
use fleet_core::schema::DEFAULT_EXPIRE_MINUTES;
use fleet_core::toml;
use std::time::Duration;

/// Configuration parsed from `[plugins.req_forward]`
#[derive(Debug, Clone)]
pub struct ReqForwardConfig {
    pub enabled: bool,
    /// Moderator channel; requests are only recorded when unset
    pub target: Option<ForwardTarget>,
    /// Confirmation window, measured from a record's last modification
    pub expire: chrono::Duration,
    /// Users allowed to confirm any request
    pub superusers: Vec<String>,
    /// Period of the active purge of expired records; lazy checks only when unset
    pub sweep_interval: Option<Duration>,
}

impl ReqForwardConfig {
    /// Parse configuration from TOML table
    ///
    /// # Errors
    ///
    /// Returns `PluginError::Config` if the target string does not parse or
    /// the expiry is not positive.
    pub fn from_toml(table: &toml::Table) -> Result<Self, PluginError> {
        let enabled = table
            .get("enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let target = match table.get("target").and_then(|v| v.as_str()) {
            Some(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse::<ForwardTarget>().map_err(|e| PluginError::Config {
                    message: format!("invalid req_forward target {raw:?}: {e}"),
                })?)
            }
            _ => None,
        };

        let expire_minutes = table
            .get("expire_minutes")
            .and_then(|v| v.as_integer())
            .unwrap_or(DEFAULT_EXPIRE_MINUTES);
        if expire_minutes <= 0 {
            return Err(PluginError::Config {
                message: format!("expire_minutes must be positive, got {expire_minutes}"),
            });
        }

        let superusers = table
            .get("superusers")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| match v {
                        toml::Value::String(s) => Some(s.clone()),
                        toml::Value::Integer(i) => Some(i.to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let sweep_interval = table
            .get("sweep_interval_secs")
            .and_then(|v| v.as_integer())
            .filter(|v| *v > 0)
            .map(|v| Duration::from_secs(v as u64));

        Ok(Self {
            enabled,
            target,
            expire: chrono::Duration::minutes(expire_minutes),
            superusers,
            sweep_interval,
        })
    }

    pub fn is_superuser(&self, user_id: &str) -> bool {
        self.superusers.iter().any(|s| s == user_id)
    }
}

impl Default for ReqForwardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: None,
            expire: chrono::Duration::minutes(DEFAULT_EXPIRE_MINUTES),
            superusers: Vec::new(),
            sweep_interval: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::NotifyTarget;

    #[test]
    fn test_defaults() {
        let config = ReqForwardConfig::from_toml(&toml::Table::new()).unwrap();
        assert!(config.enabled);
        assert!(config.target.is_none());
        assert_eq!(config.expire, chrono::Duration::minutes(30));
        assert!(config.superusers.is_empty());
        assert!(config.sweep_interval.is_none());
    }

    #[test]
    fn test_full_table() {
        let table: toml::Table = toml::from_str(
            r#"
target = "onebot11:private:10086"
expire_minutes = 5
superusers = ["1", 2]
sweep_interval_secs = 60
"#,
        )
        .unwrap();
        let config = ReqForwardConfig::from_toml(&table).unwrap();
        let target = config.target.unwrap();
        assert_eq!(target.platform, "onebot11");
        assert_eq!(
            target.target,
            NotifyTarget::Private {
                user_id: "10086".into()
            }
        );
        assert_eq!(config.expire, chrono::Duration::minutes(5));
        assert_eq!(config.superusers, vec!["1", "2"]);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_bad_target_is_config_error() {
        let table: toml::Table = toml::from_str(r#"target = "onebot11:channel:42""#).unwrap();
        let err = ReqForwardConfig::from_toml(&table).unwrap_err();
        assert!(matches!(err, PluginError::Config { .. }));
    }

    #[test]
    fn test_non_positive_expiry_rejected() {
        let table: toml::Table = toml::from_str("expire_minutes = 0").unwrap();
        assert!(ReqForwardConfig::from_toml(&table).is_err());
    }

    #[test]
    fn test_superuser_lookup() {
        let config = ReqForwardConfig {
            superusers: vec!["7".into()],
            ..Default::default()
        };
        assert!(config.is_superuser("7"));
        assert!(!config.is_superuser("8"));
    }
}
