//! Server configuration loading from file and environment variables.

use newsrelay_types::EntityMeta;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Entity database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bridge behavior.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Feeds registered at startup.
    #[serde(default)]
    pub feeds: Vec<FeedSeed>,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix of the metadata endpoint (`/<og_prefix>/<url>`).
    #[serde(default = "default_og_prefix")]
    pub og_prefix: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "newsrelay_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Bridge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Secret every feed key is derived from. Changing it changes every
    /// feed's identity.
    #[serde(default)]
    pub secret: String,

    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,

    #[serde(default = "default_feed_cache_capacity")]
    pub feed_cache_capacity: usize,

    #[serde(default = "default_feed_cache_ttl_seconds")]
    pub feed_cache_ttl_seconds: u64,

    #[serde(default = "default_metadata_ttl_seconds")]
    pub metadata_ttl_seconds: u64,
}

/// A feed to register on startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FeedSeed {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nip05: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub banner: String,
}

impl FeedSeed {
    pub fn meta(&self) -> EntityMeta {
        EntityMeta {
            name: self.name.clone(),
            url: self.url.clone(),
            nip05: self.nip05.clone(),
            picture: self.picture.clone(),
            banner: self.banner.clone(),
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn feed_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.feed_cache_ttl_seconds)
    }

    pub fn metadata_ttl(&self) -> Duration {
        Duration::from_secs(self.metadata_ttl_seconds)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    7447
}

fn default_og_prefix() -> String {
    "og".to_string()
}

fn default_db_path() -> String {
    "newsrelay.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_fetch_timeout_seconds() -> u64 {
    5
}

fn default_feed_cache_capacity() -> usize {
    512
}

fn default_feed_cache_ttl_seconds() -> u64 {
    19 * 60
}

fn default_metadata_ttl_seconds() -> u64 {
    10 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            og_prefix: default_og_prefix(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            poll_interval_seconds: default_poll_interval_seconds(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            feed_cache_capacity: default_feed_cache_capacity(),
            feed_cache_ttl_seconds: default_feed_cache_ttl_seconds(),
            metadata_ttl_seconds: default_metadata_ttl_seconds(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Rejects configurations the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "bridge.secret is required (or set NEWSRELAY_SECRET)".to_string(),
            ));
        }
        if self.bridge.feed_cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "bridge.feed_cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.server.og_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid(
                "server.og_prefix cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `NEWSRELAY_HOST` overrides `server.host`
/// - `NEWSRELAY_PORT` overrides `server.port`
/// - `NEWSRELAY_DB_PATH` overrides `database.path`
/// - `NEWSRELAY_LOG_LEVEL` overrides `logging.level`
/// - `NEWSRELAY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `NEWSRELAY_SECRET` overrides `bridge.secret`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("NEWSRELAY_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("NEWSRELAY_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("NEWSRELAY_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("NEWSRELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("NEWSRELAY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(secret) = var("NEWSRELAY_SECRET") {
        config.bridge.secret = secret;
    }
}
