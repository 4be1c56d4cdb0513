//! Cache configuration
//!
//! Values come from `TASKQ_*` environment variables with sensible defaults.
//! Only the API base URL is mandatory.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid API endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Configuration for the task query cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// API root without trailing slash, e.g. `http://localhost:8000/api/v1`
    pub base_url: String,
    /// How long an entry without subscribers is kept before it may be evicted
    pub retention: Duration,
    /// Page size used when the list is refetched from page 1
    pub default_page_size: u32,
    /// Apply updates to the cached list before the server confirms them
    pub eager_updates: bool,
    pub request_timeout: Duration,
}

impl CacheConfig {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url.as_ref())?,
            retention: DEFAULT_RETENTION,
            default_page_size: DEFAULT_PAGE_SIZE,
            eager_updates: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn with_eager_updates(mut self, eager: bool) -> Self {
        self.eager_updates = eager;
        self
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("TASKQ_API_URL").ok_or(ConfigError::Missing("TASKQ_API_URL"))?;
        let mut config = Self::new(base_url)?;

        if let Some(secs) = parse_number(&lookup, "TASKQ_CACHE_RETENTION_SECS")? {
            config.retention = Duration::from_secs(secs);
        }
        if let Some(size) = parse_number(&lookup, "TASKQ_PAGE_SIZE")? {
            if size == 0 {
                return Err(ConfigError::InvalidValue {
                    name: "TASKQ_PAGE_SIZE",
                    value: "0".to_string(),
                });
            }
            config.default_page_size = u32::try_from(size).map_err(|_| ConfigError::InvalidValue {
                name: "TASKQ_PAGE_SIZE",
                value: size.to_string(),
            })?;
        }
        if let Some(secs) = parse_number(&lookup, "TASKQ_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.eager_updates = env_flag(lookup("TASKQ_EAGER_UPDATES"), false);

        Ok(config)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

fn parse_number(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(None),
    }
}

fn env_flag(raw: Option<String>, default: bool) -> bool {
    match raw {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}
