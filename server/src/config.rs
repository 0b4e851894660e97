//! Configuration management for the server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Registry connection settings.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the registry API
    pub base_url: String,
    /// API key sent as a bearer token on every registry call
    pub api_key: Option<String>,
    /// Per-call timeout
    pub timeout: Duration,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Shared bearer token; anonymous access is allowed when unset
    pub auth_secret: Option<String>,
    pub registry: RegistryConfig,
    /// Registry creates in flight per push run
    pub push_concurrency: usize,
    /// How long a confirmation stays fresh before an entity is out of sync
    pub stale_after: Duration,
    /// Available tag count below which readiness warns
    pub tag_low_watermark: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = var("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let auth_secret = var("AUTH_SECRET").filter(|s| !s.is_empty());

        let registry = RegistryConfig {
            base_url: var("REGISTRY_BASE_URL").ok_or(ConfigError::MissingRegistryUrl)?,
            api_key: var("REGISTRY_API_KEY").filter(|s| !s.is_empty()),
            timeout: Duration::from_millis(parse_var(&var, "REGISTRY_TIMEOUT_MS", 15_000)?),
        };

        let push_concurrency: usize = parse_var(&var, "PUSH_CONCURRENCY", 4)?;
        if push_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PUSH_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        let stale_after = Duration::from_secs(parse_var(&var, "SYNC_STALE_AFTER_SECS", 86_400)?);
        let tag_low_watermark = parse_var(&var, "TAG_LOW_WATERMARK", 25)?;

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            registry,
            push_concurrency,
            stale_after,
            tag_low_watermark,
        })
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("REGISTRY_BASE_URL environment variable is required")]
    MissingRegistryUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {name} value: {value}")]
    InvalidValue { name: &'static str, value: String },
}
