//! Application configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file,
//! environment variables, then command-line flags applied by the binary.

use crate::middleware::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Secrets shorter than this are refused
pub const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitSettings,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. Never logged.
    #[serde(skip_serializing)]
    pub secret: String,
    pub token_lifetime_secs: u64,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_lifetime_secs: 24 * 3600,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub rate_per_second: f64,
    pub burst: u32,
    pub ttl_secs: u64,
    pub retry_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            rate_per_second: 1.0,
            burst: 5,
            ttl_secs: 3600,
            retry_after_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            rate_per_second: self.rate_per_second,
            burst: self.burst,
            ttl: Duration::from_secs(self.ttl_secs),
            retry_after: Duration::from_secs(self.retry_after_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Empty reflects any origin
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file. Empty keeps credentials in memory only.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "gatekeeper.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

fn parse_env<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value,
        })
}

impl AppConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    /// Call [`AppConfig::validate`] once any CLI overrides are applied.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Overlay values from an environment lookup
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("SERVER_PORT") {
            self.server.port = parse_env("SERVER_PORT", v)?;
        }
        if let Some(v) = get("SERVER_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = parse_env("SERVER_REQUEST_TIMEOUT_SECS", v)?;
        }

        if let Some(v) = get("AUTH_SECRET") {
            self.auth.secret = v;
        }
        if let Some(v) = get("AUTH_TOKEN_LIFETIME_SECS") {
            self.auth.token_lifetime_secs = parse_env("AUTH_TOKEN_LIFETIME_SECS", v)?;
        }
        if let Some(v) = get("AUTH_BCRYPT_COST") {
            self.auth.bcrypt_cost = parse_env("AUTH_BCRYPT_COST", v)?;
        }

        if let Some(v) = get("RATE_LIMIT_PER_SECOND") {
            self.rate_limit.rate_per_second = parse_env("RATE_LIMIT_PER_SECOND", v)?;
        }
        if let Some(v) = get("RATE_LIMIT_BURST") {
            self.rate_limit.burst = parse_env("RATE_LIMIT_BURST", v)?;
        }
        if let Some(v) = get("RATE_LIMIT_TTL_SECS") {
            self.rate_limit.ttl_secs = parse_env("RATE_LIMIT_TTL_SECS", v)?;
        }
        if let Some(v) = get("RATE_LIMIT_RETRY_AFTER_SECS") {
            self.rate_limit.retry_after_secs = parse_env("RATE_LIMIT_RETRY_AFTER_SECS", v)?;
        }
        if let Some(v) = get("RATE_LIMIT_SWEEP_INTERVAL_SECS") {
            self.rate_limit.sweep_interval_secs = parse_env("RATE_LIMIT_SWEEP_INTERVAL_SECS", v)?;
        }

        if let Some(v) = get("CORS_ALLOWED_ORIGINS") {
            self.cors.allowed_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        // Set but empty is meaningful here: in-memory store
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database.path = v.trim().to_string();
        }

        if let Some(v) = get("LOG_FORMAT") {
            self.logging.format = parse_env("LOG_FORMAT", v)?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.secret is required (set AUTH_SECRET)".to_string(),
            ));
        }
        if self.auth.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "auth.secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if self.auth.token_lifetime_secs == 0 {
            return Err(ConfigError::Invalid(
                "auth.token_lifetime_secs must be positive".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_secs must be positive".to_string(),
            ));
        }
        let rate = self.rate_limit.rate_per_second;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "rate_limit.rate_per_second must be positive".to_string(),
            ));
        }
        if self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.burst must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn token_lifetime(&self) -> Duration {
        Duration::from_secs(self.auth.token_lifetime_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.sweep_interval_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
