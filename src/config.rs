//! Configuration types for bookgen-client

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`ApiConfig::base_url`]
pub const ENV_BASE_URL: &str = "BOOKGEN_API_BASE_URL";
/// Environment variable providing [`ApiConfig::token`]
pub const ENV_TOKEN: &str = "BOOKGEN_API_TOKEN";

/// Main configuration for the client
///
/// Every field has a sensible default, so `Config::default()` talks to a backend
/// on `http://localhost:8000` without credentials.
///
/// # Example
///
/// ```
/// use bookgen_client::Config;
///
/// let config: Config = serde_json::from_str(r#"{
///     "api": { "base_url": "https://bonus.example.com", "token": "secret" },
///     "download": { "max_retries": 5 }
/// }"#).unwrap();
///
/// assert_eq!(config.download.max_retries, 5);
/// assert_eq!(config.download.retry_statuses, vec![500]);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoint and credentials
    #[serde(default)]
    pub api: ApiConfig,

    /// Status stream settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Artifact download retry policy
    #[serde(default)]
    pub download: RetryConfig,
}

impl Config {
    /// Build a configuration from defaults overlaid with environment variables
    ///
    /// Reads [`ENV_BASE_URL`] and [`ENV_TOKEN`]; unset variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            config.api.base_url = base_url;
        }
        if let Ok(token) = std::env::var(ENV_TOKEN) {
            if !token.trim().is_empty() {
                config.api.token = Some(token);
            }
        }
        config
    }

    /// Check the settings that cannot be expressed by types alone
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL {:?}: {}", self.api.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;

        self.download.validate()
    }
}

/// Backend endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the generation backend (default: "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request (None = anonymous)
    #[serde(default)]
    pub token: Option<String>,

    /// Timeout for JSON and download requests (default: 120 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// TCP connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header value
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Status stream configuration
///
/// Streams stay open for the whole generation run, so only the connect phase is bounded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamConfig {
    /// TCP connect timeout for the status stream (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Delay growth between download attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    /// `attempt × base_interval` (default)
    #[default]
    Linear,
    /// `base_interval × multiplier^(attempt - 1)`
    Exponential {
        /// Growth factor between consecutive delays
        multiplier: f64,
    },
}

/// Retry policy for artifact downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first one (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Unit delay for the backoff schedule (default: 2 seconds)
    #[serde(default = "default_base_interval", with = "duration_ms_serde")]
    pub base_interval: Duration,

    /// Backoff shape (default: linear)
    #[serde(default)]
    pub backoff: Backoff,

    /// Upper bound for a single delay (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,

    /// HTTP statuses treated as "still processing, try again" (default: [500])
    #[serde(default = "default_retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_interval: default_base_interval(),
            backoff: Backoff::default(),
            max_delay: default_max_delay(),
            jitter: false,
            retry_statuses: default_retry_statuses(),
        }
    }
}

impl RetryConfig {
    /// Reject policies whose delay schedule cannot be computed
    ///
    /// An exponential multiplier must be finite and at least 1.0.
    pub fn validate(&self) -> Result<()> {
        if let Backoff::Exponential { multiplier } = self.backoff
            && !(multiplier.is_finite() && multiplier >= 1.0)
        {
            return Err(Error::Config {
                message: format!("backoff multiplier must be >= 1.0, got {}", multiplier),
                key: Some("download.backoff.multiplier".to_string()),
            });
        }
        Ok(())
    }

    /// Whether a response status should be retried under this policy
    pub fn is_transient_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_user_agent() -> String {
    concat!("bookgen-client/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_retry_statuses() -> Vec<u16> {
    vec![500]
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
