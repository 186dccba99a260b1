//! Configuration management
//!
//! Loads configuration from config.toml at startup. API credentials are not
//! part of the file; they come from `BITMEX_API_KEY` / `BITMEX_API_SECRET`.

use crate::exchanges::bitmex::table::MAX_TABLE_LEN;
use crate::exchanges::BitmexWsClient;
use crate::feed::MissingSymbolPolicy;
use crate::rest::DEFAULT_BASE_URL;
use crate::stream::DEFAULT_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Feed configuration
///
/// Loaded from config.toml at startup. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Realtime feed settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// REST API settings
    #[serde(default)]
    pub rest: RestConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Realtime feed configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Instrument tracked by every stream
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Realtime endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Buffer per raw channel and per public stream
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Rows kept in the local position table
    #[serde(default = "default_max_table_len")]
    pub max_table_len: usize,

    /// Handling of batches without a usable record for `symbol`
    #[serde(default)]
    pub missing_symbol: MissingSymbolPolicy,

    /// Send `authKeyExpires` after connecting
    #[serde(default = "default_authenticate")]
    pub authenticate: bool,
}

/// REST API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    /// Scheme and host, no trailing path
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for the rolling log file; console only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_level")]
    pub level: String,

    /// JSON lines instead of plain text in the log file
    #[serde(default)]
    pub json: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            ws_url: default_ws_url(),
            channel_capacity: default_channel_capacity(),
            max_table_len: default_max_table_len(),
            missing_symbol: MissingSymbolPolicy::default(),
            authenticate: default_authenticate(),
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            level: default_level(),
            json: false,
        }
    }
}

fn default_symbol() -> String {
    "XBTUSD".to_string()
}

fn default_ws_url() -> String {
    BitmexWsClient::WS_URL.to_string()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_max_table_len() -> usize {
    MAX_TABLE_LEN
}

fn default_authenticate() -> bool {
    true
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from config.toml file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed or fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => Self::from_toml_str(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("feed.symbol is empty".to_string()));
        }
        if self.feed.channel_capacity == 0 {
            return Err(ConfigError::Invalid("feed.channel_capacity must be positive".to_string()));
        }
        if self.feed.max_table_len == 0 {
            return Err(ConfigError::Invalid("feed.max_table_len must be positive".to_string()));
        }
        if !self.feed.ws_url.starts_with("ws://") && !self.feed.ws_url.starts_with("wss://") {
            return Err(ConfigError::Invalid(format!("feed.ws_url is not a websocket URL: {}", self.feed.ws_url)));
        }
        url::Url::parse(&self.rest.base_url)
            .map_err(|e| ConfigError::Invalid(format!("rest.base_url: {}", e)))?;
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Parsed but unusable value
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::Invalid(_) => None,
        }
    }
}

impl From<ConfigError> for crate::FeedError {
    fn from(e: ConfigError) -> Self {
        crate::FeedError::Config(e.to_string())
    }
}
