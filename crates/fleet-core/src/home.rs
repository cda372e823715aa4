//! Home directory resolution for bot-fleet
//!
//! # Precedence
//!
//! 1. `FLEET_HOME` environment variable (if set and non-empty)
//! 2. `dirs::home_dir()` platform default
//!
//! Integration tests set `FLEET_HOME` to a temp dir so config discovery and
//! the socket path never touch the real home directory.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get the home directory used for config discovery and runtime files.
///
/// # Errors
///
/// Returns an error if `FLEET_HOME` is unset and the platform home directory
/// cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("FLEET_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}

/// Default runtime directory (`<home>/.fleet`) for the socket and data files.
pub fn runtime_dir(home: &std::path::Path) -> PathBuf {
    home.join(".fleet")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn restore(original: Option<String>) {
        unsafe {
            match original {
                Some(v) => env::set_var("FLEET_HOME", v),
                None => env::remove_var("FLEET_HOME"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_fleet_home_set() {
        let original = env::var("FLEET_HOME").ok();
        unsafe { env::set_var("FLEET_HOME", "/custom/home") };

        let home = get_home_dir().unwrap();
        assert_eq!(home, PathBuf::from("/custom/home"));

        restore(original);
    }

    #[test]
    #[serial]
    fn test_fleet_home_whitespace_uses_platform_default() {
        let original = env::var("FLEET_HOME").ok();
        unsafe { env::set_var("FLEET_HOME", "   ") };

        let home = get_home_dir().unwrap();
        assert_eq!(home, dirs::home_dir().unwrap());

        restore(original);
    }

    #[test]
    fn test_runtime_dir() {
        let dir = runtime_dir(std::path::Path::new("/home/bot"));
        assert_eq!(dir, PathBuf::from("/home/bot/.fleet"));
    }
}
