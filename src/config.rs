//! Configuration file parser for ~/.config/episodic/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde (with `deny_unknown_fields` off), but
//! we log a warning when the file contains potential typos. Tokens and the
//! database path can also come from the environment, which wins over the file.
use secrecy::SecretString;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cache::DEFAULT_TTL;
use crate::discovery::{DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::metadata::{DEFAULT_BASE_URL, DEFAULT_LANGUAGE};
use crate::notify::DEFAULT_API_BASE;

/// Environment variable overriding `tmdb_access_token`.
pub const ENV_TMDB_TOKEN: &str = "TMDB_ACCESS_TOKEN";
/// Environment variable overriding `discord_bot_token`.
pub const ENV_DISCORD_TOKEN: &str = "DISCORD_BOT_TOKEN";
/// Environment variable overriding `database_path`.
pub const ENV_DATABASE: &str = "EPISODIC_DATABASE";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A setting the requested command needs is not set.
    #[error("Missing required setting `{0}` (set it in the config file or the environment)")]
    Missing(&'static str),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// Custom Debug impl masks both tokens so they never reach logs.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file. Defaults to `episodic.db` next to the config file.
    pub database_path: Option<String>,

    /// Directory for daily-rotated JSON logs. Unset = console only.
    pub log_dir: Option<PathBuf>,

    pub tmdb_base_url: String,

    /// TMDB v4 read access token (alternative to TMDB_ACCESS_TOKEN).
    pub tmdb_access_token: Option<String>,

    pub tmdb_language: String,

    /// Upper bound on TMDB requests per second. 0 = unlimited.
    pub tmdb_requests_per_second: u32,

    pub discord_api_base_url: String,

    /// Discord bot token (alternative to DISCORD_BOT_TOKEN).
    pub discord_bot_token: Option<String>,

    /// Channel new episodes are announced in.
    pub notifications_channel_id: Option<i64>,

    pub poll_interval_minutes: u64,

    /// Subscribed series fetched per database page.
    pub page_size: usize,

    /// Episodes per announcement message.
    pub batch_size: usize,

    /// Entries per metadata cache.
    pub cache_capacity: usize,

    pub cache_ttl_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            log_dir: None,
            tmdb_base_url: DEFAULT_BASE_URL.to_string(),
            tmdb_access_token: None,
            tmdb_language: DEFAULT_LANGUAGE.to_string(),
            tmdb_requests_per_second: 2,
            discord_api_base_url: DEFAULT_API_BASE.to_string(),
            discord_bot_token: None,
            notifications_channel_id: None,
            poll_interval_minutes: 30,
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            cache_capacity: 256,
            cache_ttl_minutes: DEFAULT_TTL.as_secs() / 60,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("log_dir", &self.log_dir)
            .field("tmdb_base_url", &self.tmdb_base_url)
            .field(
                "tmdb_access_token",
                &self.tmdb_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("tmdb_language", &self.tmdb_language)
            .field("tmdb_requests_per_second", &self.tmdb_requests_per_second)
            .field("discord_api_base_url", &self.discord_api_base_url)
            .field(
                "discord_bot_token",
                &self.discord_bot_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("notifications_channel_id", &self.notifications_channel_id)
            .field("poll_interval_minutes", &self.poll_interval_minutes)
            .field("page_size", &self.page_size)
            .field("batch_size", &self.batch_size)
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl_minutes", &self.cache_ttl_minutes)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 14] = [
        "database_path",
        "log_dir",
        "tmdb_base_url",
        "tmdb_access_token",
        "tmdb_language",
        "tmdb_requests_per_second",
        "discord_api_base_url",
        "discord_bot_token",
        "notifications_channel_id",
        "poll_interval_minutes",
        "page_size",
        "batch_size",
        "cache_capacity",
        "cache_ttl_minutes",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to bound memory use
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(token) = get(ENV_TMDB_TOKEN) {
            self.tmdb_access_token = Some(token);
        }
        if let Some(token) = get(ENV_DISCORD_TOKEN) {
            self.discord_bot_token = Some(token);
        }
        if let Some(path) = get(ENV_DATABASE) {
            self.database_path = Some(path);
        }
    }

    /// Database file, falling back to `episodic.db` inside `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> String {
        match &self.database_path {
            Some(path) => path.clone(),
            None => config_dir.join("episodic.db").to_string_lossy().into_owned(),
        }
    }

    pub fn tmdb_token(&self) -> Result<SecretString, ConfigError> {
        secret(&self.tmdb_access_token, "tmdb_access_token")
    }

    pub fn discord_token(&self) -> Result<SecretString, ConfigError> {
        secret(&self.discord_bot_token, "discord_bot_token")
    }

    pub fn channel_id(&self) -> Result<i64, ConfigError> {
        self.notifications_channel_id
            .ok_or(ConfigError::Missing("notifications_channel_id"))
    }

    /// Time between passes, at least one minute.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes.max(1) * 60)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }

    pub fn cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

fn secret(value: &Option<String>, key: &'static str) -> Result<SecretString, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| SecretString::from(v.to_string()))
        .ok_or(ConfigError::Missing(key))
}

// ============================================================================
// Tests
// ============================================================================
