//! druidkit configuration
//!
//! Settings come from a TOML file, then `DRUIDKIT_*` environment variables
//! override individual fields.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings, one table per concern
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub druid: DruidConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Druid broker connection
#[derive(Debug, Clone, Deserialize)]
pub struct DruidConfig {
    /// Broker base URL, e.g. "http://localhost:8082"
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Overrides the data source of every query when set
    pub data_source: Option<String>,

    pub auth_token: Option<String>,

    /// Cookie that carries `auth_token`
    #[serde(default = "default_auth_cookie")]
    pub auth_cookie: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Pretty-printed requests and responses
    #[serde(default)]
    pub debug: bool,
}

fn default_base_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_endpoint() -> String {
    "/druid/v2".to_string()
}

fn default_auth_cookie() -> String {
    "skylight-aaa".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for DruidConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoint: default_endpoint(),
            data_source: None,
            auth_token: None,
            auth_cookie: default_auth_cookie(),
            timeout_secs: default_timeout(),
            debug: false,
        }
    }
}

impl DruidConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Result caching
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// SQLite database holding bucket rows
    #[serde(default = "default_cache_path")]
    pub path: String,

    /// Default cache target (table) for bucket rows
    #[serde(default = "default_cache_target")]
    pub target: String,

    /// Store live-queried buckets
    #[serde(default = "default_writeback")]
    pub writeback: bool,

    /// Lifetime of stored rows; 0 keeps them forever
    #[serde(default)]
    pub ttl_secs: u64,

    /// Keep whole responses of finished queries in memory
    #[serde(default)]
    pub result_cache: bool,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_path() -> String {
    dirs::cache_dir()
        .map(|p| p.join("druidkit").join("groupby.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./druidkit_cache/groupby.db".to_string())
}

fn default_cache_target() -> String {
    "groupby".to_string()
}

fn default_writeback() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: default_cache_path(),
            target: default_cache_target(),
            writeback: default_writeback(),
            ttl_secs: 0,
            result_cache: false,
        }
    }
}

impl CacheConfig {
    /// Database path with a leading `~/` expanded
    pub fn db_path(&self) -> PathBuf {
        match (self.path.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.path),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Defaults plus `DRUIDKIT_*` overrides, no file
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Read `path`, then apply `DRUIDKIT_*` overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// First readable file among the usual locations, else the environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("druidkit").join("config.toml")),
            Some(PathBuf::from("/etc/druidkit/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Overwrite fields from `DRUIDKIT_*` variables that are set
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |value: String| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes");

        // Druid overrides
        if let Some(url) = var("DRUIDKIT_BASE_URL") {
            self.druid.base_url = url;
        }
        if let Some(endpoint) = var("DRUIDKIT_ENDPOINT") {
            self.druid.endpoint = endpoint;
        }
        if let Some(data_source) = var("DRUIDKIT_DATA_SOURCE") {
            self.druid.data_source = Some(data_source);
        }
        if let Some(token) = var("DRUIDKIT_AUTH_TOKEN") {
            self.druid.auth_token = Some(token);
        }
        if let Some(timeout) = var("DRUIDKIT_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                self.druid.timeout_secs = t;
            }
        }
        if let Some(debug) = var("DRUIDKIT_DEBUG") {
            self.druid.debug = flag(debug);
        }

        // Cache overrides
        if let Some(enabled) = var("DRUIDKIT_CACHE_ENABLED") {
            self.cache.enabled = flag(enabled);
        }
        if let Some(path) = var("DRUIDKIT_CACHE_PATH") {
            self.cache.path = path;
        }
        if let Some(target) = var("DRUIDKIT_CACHE_TARGET") {
            self.cache.target = target;
        }
        if let Some(ttl) = var("DRUIDKIT_CACHE_TTL_SECS") {
            if let Ok(t) = ttl.parse() {
                self.cache.ttl_secs = t;
            }
        }

        // Logging overrides
        if let Some(level) = var("DRUIDKIT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("DRUIDKIT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Why a config file could not be used
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Commented TOML with every setting at its default
pub fn generate_default_config() -> String {
    r#"# druidkit Configuration
#
# Each of these variables, when set, wins over the file:
# - DRUIDKIT_BASE_URL
# - DRUIDKIT_ENDPOINT
# - DRUIDKIT_DATA_SOURCE
# - DRUIDKIT_AUTH_TOKEN
# - DRUIDKIT_TIMEOUT_SECS
# - DRUIDKIT_DEBUG
# - DRUIDKIT_CACHE_ENABLED
# - DRUIDKIT_CACHE_PATH
# - DRUIDKIT_CACHE_TARGET
# - DRUIDKIT_CACHE_TTL_SECS
# - DRUIDKIT_LOG_LEVEL
# - DRUIDKIT_LOG_FORMAT

[druid]
# Broker base URL
base_url = "http://localhost:8082"

# Query endpoint appended to the base URL
endpoint = "/druid/v2"

# Force every query onto this data source
# data_source = "events"

# Token sent in the auth cookie
# auth_token = ""
auth_cookie = "skylight-aaa"

# Request timeout in seconds
timeout_secs = 30

# Pretty-print requests and responses
debug = false

[cache]
# Serve groupBy queries through the bucket cache
enabled = true

# SQLite database for cached buckets
path = "~/.cache/druidkit/groupby.db"

# Cache target (table) for bucket rows
target = "groupby"

# Store buckets fetched from the broker
writeback = true

# Lifetime of cached buckets in seconds, 0 for no expiry
ttl_secs = 0

# Keep whole responses of finished queries in memory
result_cache = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: "pretty" for terminals, "json" for log shippers
format = "pretty"
"#
    .to_string()
}
