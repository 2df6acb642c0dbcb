//! Client configuration and defaults.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Production API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.huefy.com/api/v1/sdk";
/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Client identifier sent as the `User-Agent` of every request.
pub const USER_AGENT_VALUE: &str = concat!("huefy-rust/", env!("CARGO_PKG_VERSION"));
/// Header carrying the API key (`X-API-Key`; header names are case-insensitive).
pub const API_KEY_HEADER: &str = "x-api-key";

pub const ENV_API_KEY: &str = "HUEFY_API_KEY";
pub const ENV_BASE_URL: &str = "HUEFY_BASE_URL";
/// Timeout in whole seconds.
pub const ENV_TIMEOUT: &str = "HUEFY_TIMEOUT";
pub const ENV_MAX_RETRIES: &str = "HUEFY_MAX_RETRIES";

/// Exponential backoff settings.
///
/// The delay before retry `n` (starting at 1) is
/// `min(base_delay * multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Random spread applied to each delay, as a fraction in `0.0..=1.0`.
    /// Zero (the default) keeps delays exact.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// A configuration that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::Configuration(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::Configuration(format!(
                "retry jitter must be within 0.0..=1.0, got {}",
                self.jitter
            )));
        }
        if self.base_delay > self.max_delay {
            return Err(Error::Configuration(
                "retry base delay must not exceed max delay".to_string(),
            ));
        }
        Ok(())
    }
}

/// How [`Client::send_bulk_emails`](crate::Client::send_bulk_emails) reaches
/// the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BulkMode {
    /// One `POST /emails/bulk` carrying the whole batch.
    #[default]
    SingleRequest,
    /// One `POST /emails/send` per item, in order.
    PerItem,
}

/// Everything a [`Client`](crate::Client) is built from.
///
/// The API key is held as a [`SecretString`] and never appears in `Debug`
/// output or logs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub danger_accept_invalid_certs: bool,
    pub bulk_mode: BulkMode,
}

impl ClientConfig {
    /// Default configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            user_agent: USER_AGENT_VALUE.to_string(),
            proxy: None,
            danger_accept_invalid_certs: false,
            bulk_mode: BulkMode::default(),
        }
    }

    /// Load configuration from the environment.
    ///
    /// Reads:
    /// - `HUEFY_API_KEY` (required)
    /// - `HUEFY_BASE_URL`
    /// - `HUEFY_TIMEOUT` in seconds
    /// - `HUEFY_MAX_RETRIES`
    pub fn from_env() -> Result<Self> {
        let api_key = env_var(ENV_API_KEY)
            .ok_or_else(|| Error::Configuration(format!("{ENV_API_KEY} is not set")))?;
        let mut config = Self::new(api_key);

        if let Some(base_url) = env_var(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(timeout) = env_var(ENV_TIMEOUT) {
            let secs = timeout.parse::<u64>().map_err(|_| {
                Error::Configuration(format!("{ENV_TIMEOUT} must be a whole number of seconds, got {timeout:?}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_var(ENV_MAX_RETRIES) {
            config.retry.max_retries = retries.parse::<u32>().map_err(|_| {
                Error::Configuration(format!("{ENV_MAX_RETRIES} must be a non-negative integer, got {retries:?}"))
            })?;
        }

        Ok(config)
    }

    /// Check the configuration and normalize the base URL.
    pub(crate) fn validate(mut self) -> Result<Self> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(Error::Configuration("API key is required".to_string()));
        }

        let trimmed = self.base_url.trim_end_matches('/').to_string();
        let parsed = url::Url::parse(&trimmed)
            .map_err(|e| Error::Configuration(format!("invalid base URL {trimmed:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "base URL must use http or https, got {}",
                parsed.scheme()
            )));
        }
        self.base_url = trimmed;

        if self.timeout.is_zero() {
            return Err(Error::Configuration("timeout must be greater than zero".to_string()));
        }
        self.retry.validate()?;
        Ok(self)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
