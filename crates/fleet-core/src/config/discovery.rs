//! Configuration discovery and resolution

use super::types::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override data directory
    pub data_dir: Option<PathBuf>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables (`FLEET_DATA_DIR`)
/// 3. Explicit config file
/// 4. Global config (~/.config/fleet/config.toml)
/// 5. Defaults
///
/// # Errors
///
/// A broken global config is only logged. A broken explicit config file is an
/// error, since the operator asked for it by name.
pub fn resolve_config(overrides: &ConfigOverrides, home_dir: &Path) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    // 4. Try global config
    let global_config_path = home_dir.join(".config/fleet/config.toml");
    if global_config_path.exists() {
        match load_config_file(&global_config_path) {
            Ok(file_config) => merge_config(&mut config, file_config),
            Err(e) => warn!("Failed to parse global config: {e}"),
        }
    }

    // 3. Explicit config file
    if let Some(ref path) = overrides.config_path {
        let file_config = load_config_file(path)?;
        merge_config(&mut config, file_config);
    }

    // 2. Apply environment variables
    apply_env_overrides(&mut config);

    // 1. Apply command-line overrides
    apply_cli_overrides(&mut config, overrides);

    Ok(config)
}

/// Load config from a TOML file
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Merge file config into base config
fn merge_config(base: &mut Config, file: Config) {
    if file.core.data_dir.is_some() {
        base.core.data_dir = file.core.data_dir;
    }

    // Account lists are replaced wholesale, not merged
    if !file.accounts.is_empty() {
        base.accounts = file.accounts;
    }

    for (name, table) in file.plugins {
        base.plugins.insert(name, table);
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(dir) = std::env::var("FLEET_DATA_DIR")
        && !dir.trim().is_empty()
    {
        config.core.data_dir = Some(PathBuf::from(dir.trim()));
    }
}

fn apply_cli_overrides(config: &mut Config, overrides: &ConfigOverrides) {
    if let Some(ref dir) = overrides.data_dir {
        config.core.data_dir = Some(dir.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write_global(home: &Path, contents: &str) {
        let dir = home.join(".config/fleet");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.toml"), contents).unwrap();
    }

    #[test]
    #[serial]
    fn test_resolve_defaults_without_files() {
        let home = TempDir::new().unwrap();
        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert!(config.accounts.is_empty());
        assert!(config.core.data_dir.is_none());
    }

    #[test]
    #[serial]
    fn test_explicit_file_overrides_global() {
        let home = TempDir::new().unwrap();
        write_global(
            home.path(),
            r#"
[[accounts]]
id = "1"
platform = "onebot11"

[plugins.leave_duplicate]
debounce_ms = 100

[plugins.req_forward]
target = "onebot11:1"
"#,
        );

        let explicit = home.path().join("fleet.toml");
        std::fs::write(
            &explicit,
            r#"
[[accounts]]
id = "2"
platform = "onebot11"

[plugins.leave_duplicate]
debounce_ms = 900
"#,
        )
        .unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(explicit),
            ..Default::default()
        };
        let config = resolve_config(&overrides, home.path()).unwrap();

        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].id, "2");
        let dedup = config.plugin_config("leave_duplicate").unwrap();
        assert_eq!(dedup.get("debounce_ms").and_then(|v| v.as_integer()), Some(900));
        // Sections only present in the global file survive
        assert!(config.plugin_config("req_forward").is_some());
    }

    #[test]
    #[serial]
    fn test_broken_global_is_ignored() {
        let home = TempDir::new().unwrap();
        write_global(home.path(), "this is = = not toml");
        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert!(config.accounts.is_empty());
    }

    #[test]
    #[serial]
    fn test_broken_explicit_file_is_error() {
        let home = TempDir::new().unwrap();
        let explicit = home.path().join("bad.toml");
        std::fs::write(&explicit, "[[accounts]\n").unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(explicit),
            ..Default::default()
        };
        let err = resolve_config(&overrides, home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse { .. }));
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_error() {
        let home = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            config_path: Some(home.path().join("nope.toml")),
            ..Default::default()
        };
        let err = resolve_config(&overrides, home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    #[serial]
    fn test_env_and_cli_data_dir_precedence() {
        let home = TempDir::new().unwrap();
        let original = std::env::var("FLEET_DATA_DIR").ok();
        unsafe { std::env::set_var("FLEET_DATA_DIR", "/env/data") };

        let config = resolve_config(&ConfigOverrides::default(), home.path()).unwrap();
        assert_eq!(config.core.data_dir, Some(PathBuf::from("/env/data")));

        let overrides = ConfigOverrides {
            data_dir: Some(PathBuf::from("/cli/data")),
            ..Default::default()
        };
        let config = resolve_config(&overrides, home.path()).unwrap();
        assert_eq!(config.core.data_dir, Some(PathBuf::from("/cli/data")));

        unsafe {
            match original {
                Some(v) => std::env::set_var("FLEET_DATA_DIR", v),
                None => std::env::remove_var("FLEET_DATA_DIR"),
            }
        }
    }
}
