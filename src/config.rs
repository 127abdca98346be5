//! Configuration types for veo-drive

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Alignment the Drive resumable protocol requires for every non-final chunk
pub const CHUNK_ALIGNMENT: usize = 256 * 1024;

/// Largest accepted retry backoff multiplier
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Main configuration for the pipeline
///
/// Every field has a default, so an empty JSON object (`{}`) is a complete
/// configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Generation service settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Content retrieval settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Drive upload settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Retry policy for transient network failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let chunk = self.upload.chunk_size;
        if chunk == 0 || chunk % CHUNK_ALIGNMENT != 0 {
            return Err(Error::config(
                format!(
                    "chunk size {} must be a non-zero multiple of {} bytes",
                    chunk, CHUNK_ALIGNMENT
                ),
                "upload.chunk_size",
            ));
        }
        if self.upload.default_mime_type.trim().is_empty() {
            return Err(Error::config(
                "default mime type must not be empty",
                "upload.default_mime_type",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&multiplier) {
            return Err(Error::config(
                format!(
                    "backoff multiplier {} must be between 1.0 and {}",
                    multiplier, MAX_BACKOFF_MULTIPLIER
                ),
                "retry.backoff_multiplier",
            ));
        }
        Ok(())
    }
}

/// Generation service configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of the generative language API
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Model resource name (default: "models/veo-1.0")
    #[serde(default = "default_model")]
    pub model: String,

    /// Time budget for the generation call, which is slow (default: 600 seconds)
    #[serde(default = "default_generation_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            model: default_model(),
            timeout: default_generation_timeout(),
        }
    }
}

/// Content retrieval configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Connection establishment timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Longest wait for response headers or for any single body read (default: 300 seconds)
    ///
    /// Not a deadline on the whole transfer: a large video streamed into a
    /// slow upload may take far longer than this.
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Base URL of the object storage JSON API
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,

    /// Maximum number of response body bytes kept for diagnostics
    #[serde(default = "default_error_body_limit")]
    pub error_body_limit: usize,

    /// Accept plain `http://` URIs on the direct transfer path (default: false)
    ///
    /// Only meant for local emulators; generation results are always `https://` or `gs://`.
    #[serde(default)]
    pub allow_http: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            timeout: default_fetch_timeout(),
            storage_endpoint: default_storage_endpoint(),
            error_body_limit: default_error_body_limit(),
            allow_http: false,
        }
    }
}

/// Drive upload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the Drive upload API
    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,

    /// Bytes per chunk request (default: 5 MiB)
    ///
    /// Must be a non-zero multiple of [`CHUNK_ALIGNMENT`].
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Connection establishment timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Timeout for each session or chunk request (default: 120 seconds)
    #[serde(default = "default_upload_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Mime type used when the generation result does not name one
    #[serde(default = "default_mime_type")]
    pub default_mime_type: String,

    /// Maximum number of response body bytes kept for diagnostics
    #[serde(default = "default_error_body_limit")]
    pub error_body_limit: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_upload_endpoint(),
            chunk_size: default_chunk_size(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_upload_request_timeout(),
            default_mime_type: default_mime_type(),
            error_body_limit: default_error_body_limit(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_generation_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "models/veo-1.0".to_string()
}

fn default_generation_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_storage_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_error_body_limit() -> usize {
    1024
}

fn default_upload_endpoint() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_chunk_size() -> usize {
    20 * CHUNK_ALIGNMENT
}

fn default_upload_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_mime_type() -> String {
    "video/mp4".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole seconds
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
