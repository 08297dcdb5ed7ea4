//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, the last used email address, and the
//! session guard's timings.
//!
//! Configuration is stored at `~/.config/ledgerdesk/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Application name used for config/data directory paths
const APP_NAME: &str = "ledgerdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default ledger API root
const DEFAULT_API_BASE_URL: &str = "https://firat63-001-site1.anytempurl.com/api";

/// Idle budget before a forced logout: 10 minutes
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 10 * 60;

/// Grace period after token expiry before logging out
const DEFAULT_EXPIRY_BUFFER_MS: u64 = 500;

/// How often the storage file is checked for changes from other consoles
const DEFAULT_STORAGE_POLL_MS: u64 = 1000;

const DEFAULT_LOGIN_PATH: &str = "/login";

/// Environment overrides
pub const ENV_API_URL: &str = "LEDGERDESK_API_URL";
pub const ENV_IDLE_TIMEOUT_SECS: &str = "LEDGERDESK_IDLE_TIMEOUT_SECS";
pub const ENV_EXPIRY_BUFFER_MS: &str = "LEDGERDESK_EXPIRY_BUFFER_MS";

/// Timings and targets for the session guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub idle_timeout_secs: u64,
    pub expiry_buffer_ms: u64,
    pub login_path: String,
    pub storage_poll_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            expiry_buffer_ms: DEFAULT_EXPIRY_BUFFER_MS,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            storage_poll_ms: DEFAULT_STORAGE_POLL_MS,
        }
    }
}

impl GuardConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn expiry_buffer(&self) -> Duration {
        Duration::from_millis(self.expiry_buffer_ms)
    }

    pub fn storage_poll_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_millis(self.storage_poll_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub last_email: Option<String>,
    pub guard: GuardConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            last_email: None,
            guard: GuardConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides. Unparseable numbers are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_IDLE_TIMEOUT_SECS) {
            match raw.trim().parse() {
                Ok(secs) => self.guard.idle_timeout_secs = secs,
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_IDLE_TIMEOUT_SECS),
            }
        }
        if let Some(raw) = lookup(ENV_EXPIRY_BUFFER_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.guard.expiry_buffer_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_EXPIRY_BUFFER_MS),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding session storage and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_guard_timings() {
        let guard = GuardConfig::default();
        assert_eq!(guard.idle_timeout(), Duration::from_secs(600));
        assert_eq!(guard.expiry_buffer(), Duration::from_millis(500));
        assert_eq!(guard.login_path, "/login");
    }

    #[test]
    fn test_partial_config_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"last_email": "a@b.c", "guard": {"idle_timeout_secs": 60}}"#).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.guard.idle_timeout_secs, 60);
        assert_eq!(config.guard.expiry_buffer_ms, DEFAULT_EXPIRY_BUFFER_MS);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "http://localhost:5000/api"),
            (ENV_IDLE_TIMEOUT_SECS, "120"),
            (ENV_EXPIRY_BUFFER_MS, "soon"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_base_url, "http://localhost:5000/api");
        assert_eq!(config.guard.idle_timeout_secs, 120);
        assert_eq!(config.guard.expiry_buffer_ms, DEFAULT_EXPIRY_BUFFER_MS);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let guard = GuardConfig {
            storage_poll_ms: 0,
            ..Default::default()
        };
        assert_eq!(guard.storage_poll_interval(), Duration::from_millis(1));
    }
}
