//! Session configuration.
//!
//! Connection settings (host, port, TLS, proxy), polling limits and history
//! recording. Configuration is read from `~/.config/dynect/config.json`, or
//! from `DYN_*` environment variables (a `.env` file is honored).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::history::DEFAULT_HISTORY_CAPACITY;

/// Application name used for the config directory path
const APP_NAME: &str = "dynect";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_HOST: &str = "api.dynect.net";
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_API_VERSION: &str = "current";

/// Host of the Message Management (email) API
pub const DEFAULT_MM_HOST: &str = "emailapi.dynect.net";

/// Jobs are checked every 2 seconds while the API reports them incomplete.
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Shortest accepted poll interval. Anything lower would hammer the API.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Give up on a job after 2 minutes.
const DEFAULT_MAX_POLL_SECS: u64 = 120;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub api_version: String,
    pub history: bool,
    pub history_capacity: usize,
    #[serde(deserialize_with = "deserialize_poll_interval")]
    pub poll_interval_ms: u64,
    pub max_poll_secs: u64,
    pub request_timeout_secs: u64,
    pub proxy: Option<ProxyConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ssl: true,
            api_version: DEFAULT_API_VERSION.to_string(),
            history: false,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_secs: DEFAULT_MAX_POLL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            proxy: None,
        }
    }
}

fn deserialize_poll_interval<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    check_poll_interval(ms).map_err(serde::de::Error::custom)
}

fn check_poll_interval(ms: u64) -> Result<u64> {
    if ms < MIN_POLL_INTERVAL_MS {
        anyhow::bail!(
            "poll_interval_ms must be at least {} (got {})",
            MIN_POLL_INTERVAL_MS,
            ms
        );
    }
    Ok(ms)
}

impl SessionConfig {
    /// Defaults for the Message Management (email) API host.
    pub fn message_management() -> Self {
        Self {
            host: DEFAULT_MM_HOST.to_string(),
            ..Self::default()
        }
    }

    /// Load from the user config directory, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Defaults overridden by `DYN_*` variables from the process
    /// environment and, if present, a `.env` file.
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(name: &str, value: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: {:?}", name, value))
        }

        fn parse_bool(name: &str, value: String) -> Result<bool> {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(anyhow::anyhow!("Invalid value for {}: {:?}", name, value)),
            }
        }

        if let Some(v) = lookup("DYN_HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("DYN_PORT") {
            self.port = parse("DYN_PORT", v)?;
        }
        if let Some(v) = lookup("DYN_SSL") {
            self.ssl = parse_bool("DYN_SSL", v)?;
        }
        if let Some(v) = lookup("DYN_API_VERSION") {
            self.api_version = v;
        }
        if let Some(v) = lookup("DYN_HISTORY") {
            self.history = parse_bool("DYN_HISTORY", v)?;
        }
        if let Some(v) = lookup("DYN_HISTORY_CAPACITY") {
            self.history_capacity = parse("DYN_HISTORY_CAPACITY", v)?;
        }
        if let Some(v) = lookup("DYN_POLL_INTERVAL_MS") {
            self.poll_interval_ms = check_poll_interval(parse("DYN_POLL_INTERVAL_MS", v)?)?;
        }
        if let Some(v) = lookup("DYN_MAX_POLL_SECS") {
            self.max_poll_secs = parse("DYN_MAX_POLL_SECS", v)?;
        }
        if let Some(v) = lookup("DYN_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse("DYN_REQUEST_TIMEOUT_SECS", v)?;
        }

        match (lookup("DYN_PROXY_HOST"), lookup("DYN_PROXY_PORT")) {
            (Some(host), Some(port)) => {
                self.proxy = Some(ProxyConfig {
                    host,
                    port: parse("DYN_PROXY_PORT", port)?,
                    user: lookup("DYN_PROXY_USER"),
                    password: lookup("DYN_PROXY_PASS"),
                });
            }
            (Some(_), None) => {
                return Err(anyhow::anyhow!("Proxy missing port, please set DYN_PROXY_PORT"));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Time between job polls, never below `MIN_POLL_INTERVAL_MS`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_secs(self.max_poll_secs)
    }
}
