//! Configuration types for usenet-relay
//!
//! The whole process is driven by one [`Config`] constructed at startup and
//! passed by reference into the supervisor, uploader and downloader; no
//! component reads ambient/global state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Remote service API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the remote service (default: "https://api.torbox.app")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token presented on every request
    pub token: String,
}

/// Transfer engine settings (directories and chunking)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Staging directory watched for new NZB files to upload
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,

    /// Destination directory for completed downloads
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Scratch directory for in-flight downloads
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Number of concurrent byte-range requests per download (default: 4)
    #[serde(default = "default_chunk_count")]
    pub chunk_count: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            chunk_count: default_chunk_count(),
        }
    }
}

/// Retry configuration for transient failures
///
/// The default cadence is 2s, then 5s, then 5s between attempts, matching
/// the remote service's observed recovery behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Cap on the escalated delay (default: 5 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failed attempt (default: 2.5)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to each delay (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Main configuration for the relay process
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote service API settings
    pub api: ApiConfig,

    /// Directories and chunking
    #[serde(flatten)]
    pub transfer: TransferConfig,

    /// Retry policy for uploads
    #[serde(default)]
    pub upload_retry: RetryConfig,

    /// Retry policy for whole-download attempts
    #[serde(default)]
    pub download_retry: RetryConfig,

    /// Bind address for the inbound notification endpoint (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Issue a remote delete after a download has been published (default: true)
    #[serde(default = "default_true")]
    pub release_remote: bool,
}

impl Config {
    /// Build a configuration from environment variables.
    ///
    /// `API_TOKEN`, `NZB_DIR`, `DOWNLOAD_DIR` and `TEMP_DIR` are required;
    /// `API_BASE_URL` and `BIND_ADDRESS` override their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self> {
        let token = require_env("API_TOKEN")?;
        let watch_dir = PathBuf::from(require_env("NZB_DIR")?);
        let download_dir = PathBuf::from(require_env("DOWNLOAD_DIR")?);
        let temp_dir = PathBuf::from(require_env("TEMP_DIR")?);

        let base_url = std::env::var("API_BASE_URL").unwrap_or_else(|_| default_base_url());

        let bind_address = match std::env::var("BIND_ADDRESS") {
            Ok(addr) => addr.parse().map_err(|e| Error::Config {
                message: format!("invalid bind address '{addr}': {e}"),
                key: Some("BIND_ADDRESS".to_string()),
            })?,
            Err(_) => default_bind_address(),
        };

        let config = Self {
            api: ApiConfig { base_url, token },
            transfer: TransferConfig {
                watch_dir,
                download_dir,
                temp_dir,
                chunk_count: default_chunk_count(),
            },
            upload_retry: RetryConfig::default(),
            download_retry: RetryConfig::default(),
            bind_address,
            release_remote: default_true(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.transfer.chunk_count == 0 {
            return Err(Error::Config {
                message: "chunk_count must be at least 1".to_string(),
                key: Some("chunk_count".to_string()),
            });
        }
        if self.api.token.is_empty() {
            return Err(Error::Config {
                message: "API token must not be empty".to_string(),
                key: Some("API_TOKEN".to_string()),
            });
        }
        Ok(())
    }
}

fn require_env(key: &'static str) -> Result<String> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config {
            message: format!("environment variable {key} is not set"),
            key: Some(key.to_string()),
        }),
    }
}

fn default_base_url() -> String {
    "https://api.torbox.app".to_string()
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("./nzb")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_chunk_count() -> u64 {
    4
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.5
}

fn default_bind_address() -> SocketAddr {
    // Same port the original deployment exposed for callbacks
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_true() -> bool {
    true
}

// Duration serialization as whole seconds
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

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            api: ApiConfig {
                base_url: default_base_url(),
                token: "secret".to_string(),
            },
            transfer: TransferConfig::default(),
            upload_retry: RetryConfig::default(),
            download_retry: RetryConfig::default(),
            bind_address: default_bind_address(),
            release_remote: true,
        }
    }

    #[test]
    fn retry_defaults_match_observed_cadence() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_secs(2));
        assert_eq!(retry.max_delay, Duration::from_secs(5));
        // 2s * 2.5 = 5s, capped at 5s from then on
        assert!(
            retry.initial_delay.as_secs_f64() * retry.backoff_multiplier
                >= retry.max_delay.as_secs_f64()
        );
        assert!(!retry.jitter);
    }

    #[test]
    fn validate_rejects_zero_chunk_count() {
        let mut config = test_config();
        config.transfer.chunk_count = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_count"));
    }

    #[test]
    fn validate_rejects_empty_token() {
        let mut config = test_config();
        config.api.token = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn retry_config_round_trips_durations_as_seconds() {
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.5,
            jitter: false,
        };
        let json = serde_json::to_value(&retry).unwrap();
        assert_eq!(json["initial_delay"], 2);
        assert_eq!(json["max_delay"], 5);

        let back: RetryConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.initial_delay, Duration::from_secs(2));
        assert_eq!(back.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let json = serde_json::json!({
            "api": { "token": "secret" }
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.api.base_url, "https://api.torbox.app");
        assert_eq!(config.transfer.chunk_count, 4);
        assert_eq!(config.upload_retry.max_attempts, 5);
        assert!(config.release_remote);
        config.validate().unwrap();
    }
}
