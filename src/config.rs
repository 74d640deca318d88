//! Configuration file parser for ~/.config/feedscout/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides the configured password.
pub const PASSWORD_ENV: &str = "FEEDSCOUT_PASSWORD";

const KNOWN_KEYS: [&str; 7] = [
    "server_url",
    "username",
    "password",
    "default_mailbox",
    "keyword_search_url",
    "request_timeout_secs",
    "local_discovery",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

/// Application configuration.
///
/// Every key is optional. SEC-015: `password` is a [`SecretString`] and the
/// `Debug` impl prints it as `[REDACTED]`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the mailbox server.
    pub server_url: String,

    /// Account used to log in before any mailbox operation.
    pub username: Option<String>,

    #[serde(deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Mailbox used when a command does not name one.
    pub default_mailbox: Option<String>,

    /// Keyword search URL template containing `{query}`.
    pub keyword_search_url: Option<String>,

    pub request_timeout_secs: u64,

    /// Run proxy probes and link scans in-process instead of through the
    /// server's `/feedsearch` endpoints.
    pub local_discovery: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:9000".to_string(),
            username: None,
            password: None,
            default_mailbox: None,
            keyword_search_url: None,
            request_timeout_secs: 10,
            local_discovery: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("default_mailbox", &self.default_mailbox)
            .field("keyword_search_url", &self.keyword_search_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("local_discovery", &self.local_discovery)
            .finish()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `$HOME/.config/feedscout/config.toml`, if `HOME` is set.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("feedscout")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing or empty file → `Ok(Config::default())`
    /// - Invalid TOML or wrong value type → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), server = %config.server_url, "Loaded configuration");
        Ok(config)
    }

    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Applies `FEEDSCOUT_PASSWORD` when it is set and non-empty.
    pub fn with_env_password(self) -> Self {
        self.with_password_override(std::env::var(PASSWORD_ENV).ok())
    }

    fn with_password_override(mut self, value: Option<String>) -> Self {
        if let Some(password) = value.filter(|p| !p.is_empty()) {
            self.password = Some(SecretString::from(password));
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
