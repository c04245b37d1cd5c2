//! Configuration loading for the ingester
//!
//! Supports loading settings from (in order of priority):
//! 1. An explicit JSON file (`--config`)
//! 2. `ingest.json` in the shared config directory
//! 3. Environment variables (fallback)

use anyhow::{Context, Result, bail, ensure};
use chrono::TimeDelta;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::directadmin::{DirectAdminClient, DirectAdminCredentials};
use crate::notify::{Alerter, DiscordNotifier};
use crate::sync::SyncOptions;

/// Config filename in the shared config directory
const CONFIG_FILE: &str = "ingest.json";

/// Default database filename in the shared config directory
const DATABASE_FILE: &str = "ingest.sqlite";

const DEFAULT_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_FETCH_WINDOW_MS: u64 = 6 * 60 * 60 * 1000;
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_TICK_INTERVAL_SECS: u64 = 300;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Validated runtime settings
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub base_url: Url,
    pub credentials: DirectAdminCredentials,
    /// Operator contact sent in the User-Agent
    pub useragent_contact: String,
    pub max_age: Duration,
    pub fetch_window: Duration,
    /// Secret path serving the status report, without slashes
    pub magic_path: String,
    pub discord_webhook_url: Option<String>,
    pub database_path: PathBuf,
    pub listen_addr: SocketAddr,
    pub tick_interval: Duration,
    pub http_timeout: Duration,
}

/// On-disk config file format
#[derive(Debug, Deserialize)]
struct ConfigFile {
    base_url: String,
    username: String,
    login_token: String,
    #[serde(default)]
    useragent_contact: String,
    #[serde(default = "default_max_age_ms")]
    max_age_ms: u64,
    #[serde(default = "default_fetch_window_ms")]
    fetch_window_ms: u64,
    magic_path: String,
    #[serde(default)]
    discord_webhook_url: Option<String>,
    #[serde(default)]
    database_path: Option<PathBuf>,
    #[serde(default)]
    listen_addr: Option<SocketAddr>,
    #[serde(default = "default_tick_interval_secs")]
    tick_interval_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,
}

fn default_max_age_ms() -> u64 {
    DEFAULT_MAX_AGE_MS
}

fn default_fetch_window_ms() -> u64 {
    DEFAULT_FETCH_WINDOW_MS
}

fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}

fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl IngestConfig {
    /// Load settings using the following priority:
    /// 1. `path`, when given
    /// 2. JSON file (~/.config/directadmin-ingest/ingest.json)
    /// 3. Environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        if config::config_exists(CONFIG_FILE) {
            let file: ConfigFile = config::load_json(CONFIG_FILE)?;
            return Self::from_config_file(file);
        }

        Self::from_env()
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let file: ConfigFile = config::load_json_file(path)?;
        Self::from_config_file(file)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(json).context("Failed to parse config JSON")?;
        Self::from_config_file(file)
    }

    fn from_config_file(file: ConfigFile) -> Result<Self> {
        Self::build(RawSettings {
            base_url: file.base_url,
            username: file.username,
            login_token: file.login_token,
            useragent_contact: file.useragent_contact,
            max_age: Duration::from_millis(file.max_age_ms),
            fetch_window: Duration::from_millis(file.fetch_window_ms),
            magic_path: file.magic_path,
            discord_webhook_url: file.discord_webhook_url.filter(|u| !u.trim().is_empty()),
            database_path: file.database_path,
            listen_addr: file.listen_addr,
            tick_interval: Duration::from_secs(file.tick_interval_secs),
            http_timeout: Duration::from_secs(file.http_timeout_secs),
        })
    }

    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from any environment-style key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_millis(
                config::parse_optional(&lookup, key)?.unwrap_or(default),
            ))
        };
        let secs = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_secs(
                config::parse_optional(&lookup, key)?.unwrap_or(default),
            ))
        };

        Self::build(RawSettings {
            base_url: config::require(&lookup, "DIRECTADMIN_BASE_URL")?,
            username: config::require(&lookup, "DIRECTADMIN_LOGIN_USERNAME")?,
            login_token: config::require(&lookup, "DIRECTADMIN_LOGIN_TOKEN")?,
            useragent_contact: config::optional(&lookup, "DEPLOYMENT_USERAGENT_CONTACT")
                .unwrap_or_default(),
            max_age: millis("DIRECTADMIN_MAILLOG_MAX_AGE", DEFAULT_MAX_AGE_MS)?,
            fetch_window: millis("DIRECTADMIN_MAILLOG_FETCH_MAX", DEFAULT_FETCH_WINDOW_MS)?,
            magic_path: config::require(&lookup, "FETCH_MAGIC_PATH")?,
            discord_webhook_url: config::optional(&lookup, "DISCORD_WEBHOOK_URL"),
            database_path: config::optional(&lookup, "DATABASE_PATH").map(PathBuf::from),
            listen_addr: config::parse_optional(&lookup, "LISTEN_ADDR")?,
            tick_interval: secs("TICK_INTERVAL_SECS", DEFAULT_TICK_INTERVAL_SECS)?,
            http_timeout: secs("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
        })
    }

    /// Get the default config file path (~/.config/directadmin-ingest/ingest.json)
    pub fn default_config_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    fn build(raw: RawSettings) -> Result<Self> {
        let base_url = Url::parse(raw.base_url.trim())
            .with_context(|| format!("Invalid DirectAdmin base URL: {}", raw.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("Invalid DirectAdmin base URL: {}", raw.base_url);
        }

        let magic_path = raw.magic_path.trim().trim_matches('/').to_string();
        ensure!(!magic_path.is_empty(), "Magic path must not be empty");

        ensure!(!raw.max_age.is_zero(), "Max age must be greater than zero");
        ensure!(!raw.fetch_window.is_zero(), "Fetch window must be greater than zero");
        ensure!(!raw.tick_interval.is_zero(), "Tick interval must be greater than zero");
        ensure!(!raw.http_timeout.is_zero(), "HTTP timeout must be greater than zero");

        let database_path = match raw.database_path {
            Some(path) => path,
            None => config::config_path(DATABASE_FILE)
                .context("Could not determine config directory for the database")?,
        };

        let listen_addr = match raw.listen_addr {
            Some(addr) => addr,
            None => DEFAULT_LISTEN_ADDR.parse().context("Invalid default listen address")?,
        };

        Ok(Self {
            base_url,
            credentials: DirectAdminCredentials {
                username: raw.username,
                login_token: raw.login_token,
            },
            useragent_contact: raw.useragent_contact,
            max_age: raw.max_age,
            fetch_window: raw.fetch_window,
            magic_path,
            discord_webhook_url: raw.discord_webhook_url,
            database_path,
            listen_addr,
            tick_interval: raw.tick_interval,
            http_timeout: raw.http_timeout,
        })
    }

    /// Window sizing for the sync driver
    pub fn sync_options(&self) -> Result<SyncOptions> {
        Ok(SyncOptions {
            max_age: TimeDelta::from_std(self.max_age).context("Max age is too large")?,
            fetch_window: TimeDelta::from_std(self.fetch_window)
                .context("Fetch window is too large")?,
        })
    }

    pub fn directadmin_client(&self) -> DirectAdminClient {
        DirectAdminClient::new(
            self.base_url.clone(),
            self.credentials.clone(),
            &self.useragent_contact,
            self.http_timeout,
        )
    }

    /// Alerter posting to Discord, or logging only when no webhook is set
    pub fn alerter(&self) -> Alerter {
        match &self.discord_webhook_url {
            Some(url) => Alerter::new(Arc::new(DiscordNotifier::new(url.clone(), self.http_timeout))),
            None => Alerter::log_only(),
        }
    }
}

/// Settings gathered from either source, before validation
struct RawSettings {
    base_url: String,
    username: String,
    login_token: String,
    useragent_contact: String,
    max_age: Duration,
    fetch_window: Duration,
    magic_path: String,
    discord_webhook_url: Option<String>,
    database_path: Option<PathBuf>,
    listen_addr: Option<SocketAddr>,
    tick_interval: Duration,
    http_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut map: HashMap<String, String> = [
            ("DIRECTADMIN_BASE_URL", "https://panel.example.com:2222"),
            ("DIRECTADMIN_LOGIN_USERNAME", "admin"),
            ("DIRECTADMIN_LOGIN_TOKEN", "token"),
            ("FETCH_MAGIC_PATH", "s3cret"),
            ("DATABASE_PATH", "/tmp/ingest-test.sqlite"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = IngestConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config.base_url.as_str(), "https://panel.example.com:2222/");
        assert_eq!(config.credentials.username, "admin");
        assert_eq!(config.useragent_contact, "");
        assert_eq!(config.max_age, Duration::from_secs(24 * 3600));
        assert_eq!(config.fetch_window, Duration::from_secs(6 * 3600));
        assert_eq!(config.magic_path, "s3cret");
        assert!(config.discord_webhook_url.is_none());
        assert_eq!(config.listen_addr, "127.0.0.1:8787".parse().unwrap());
        assert_eq!(config.tick_interval, Duration::from_secs(300));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = IngestConfig::from_lookup(env(&[
            ("DIRECTADMIN_MAILLOG_MAX_AGE", "3600000"),
            ("DIRECTADMIN_MAILLOG_FETCH_MAX", "600000"),
            ("FETCH_MAGIC_PATH", "/status-xyz/"),
            ("DISCORD_WEBHOOK_URL", "https://discord.example/hook"),
            ("LISTEN_ADDR", "0.0.0.0:9000"),
            ("DEPLOYMENT_USERAGENT_CONTACT", "ops@example.com"),
        ]))
        .unwrap();
        assert_eq!(config.max_age, Duration::from_secs(3600));
        assert_eq!(config.fetch_window, Duration::from_secs(600));
        assert_eq!(config.magic_path, "status-xyz");
        assert_eq!(
            config.discord_webhook_url.as_deref(),
            Some("https://discord.example/hook")
        );
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.useragent_contact, "ops@example.com");

        let options = config.sync_options().unwrap();
        assert_eq!(options.max_age, TimeDelta::hours(1));
        assert_eq!(options.fetch_window, TimeDelta::minutes(10));
    }

    #[test]
    fn test_missing_required_value() {
        let err = IngestConfig::from_lookup(env(&[("DIRECTADMIN_LOGIN_TOKEN", "  ")])).unwrap_err();
        assert!(err.to_string().contains("DIRECTADMIN_LOGIN_TOKEN"));
    }

    #[test]
    fn test_validation_errors() {
        assert!(IngestConfig::from_lookup(env(&[("DIRECTADMIN_BASE_URL", "not a url")])).is_err());
        assert!(IngestConfig::from_lookup(env(&[("FETCH_MAGIC_PATH", "///")])).is_err());
        assert!(IngestConfig::from_lookup(env(&[("DIRECTADMIN_MAILLOG_FETCH_MAX", "0")])).is_err());
        assert!(IngestConfig::from_lookup(env(&[("DIRECTADMIN_MAILLOG_MAX_AGE", "-5")])).is_err());
        assert!(IngestConfig::from_lookup(env(&[("LISTEN_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn test_from_json() {
        let config = IngestConfig::from_json(
            r#"{
                "base_url": "https://panel.example.com:2222",
                "username": "admin",
                "login_token": "token",
                "magic_path": "s3cret",
                "database_path": "/var/lib/ingest/ingest.sqlite",
                "fetch_window_ms": 1800000
            }"#,
        )
        .unwrap();
        assert_eq!(config.fetch_window, Duration::from_secs(1800));
        assert_eq!(config.max_age, Duration::from_secs(24 * 3600));
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/ingest/ingest.sqlite")
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ingest.json");
        std::fs::write(
            &path,
            r#"{"base_url": "https://panel.example.com", "username": "u",
                "login_token": "t", "magic_path": "m", "database_path": "db.sqlite"}"#,
        )
        .unwrap();

        let config = IngestConfig::load(Some(&path)).unwrap();
        assert_eq!(config.magic_path, "m");
        assert!(IngestConfig::from_file(&dir.path().join("missing.json")).is_err());
    }
}
