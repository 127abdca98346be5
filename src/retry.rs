//! Retry logic with exponential backoff
//!
//! This module provides configurable retry logic for transient failures.
//! It implements exponential backoff with optional jitter to prevent thundering herd.
//!
//! [`with_retry`] wraps a whole operation; [`Backoff`] exposes the delay
//! schedule on its own for loops that must do extra work between attempts
//! (the uploader queries session status before resending a chunk).
//!
//! # Example
//!
//! ```no_run
//! use veo_drive::retry::{IsRetryable, with_retry};
//! use veo_drive::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, FetchError, UploadError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx, rate limiting) return `true`.
/// Permanent failures (bad URI, access denied, rejected metadata) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

/// Whether an HTTP status code signals a transient server-side condition
pub fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Fetch(e) => e.is_retryable(),
            Error::Upload(e) => e.is_retryable(),
            Error::Generation { status, .. } => is_transient_status(*status),
            // Everything else needs a human: bad config, bad credentials,
            // unusable generation result, user interrupt
            Error::Config { .. }
            | Error::Credential(_)
            | Error::Resolution(_)
            | Error::Serialization(_)
            | Error::Cancelled => false,
        }
    }
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => is_transient_status(*status),
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::UnsupportedScheme { .. }
            | FetchError::MalformedUri { .. }
            | FetchError::LengthMismatch { .. } => false,
        }
    }
}

impl IsRetryable for UploadError {
    fn is_retryable(&self) -> bool {
        match self {
            UploadError::Init { status, .. } => status.is_none_or(is_transient_status),
            // Chunk errors are produced once the chunk loop has already spent its budget
            UploadError::Chunk { .. }
            | UploadError::OffsetOutOfRange { .. }
            | UploadError::InvalidResponse(_) => false,
        }
    }
}

/// Exponential backoff schedule bounded by [`RetryConfig::max_attempts`]
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    /// Start a fresh schedule
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            attempt: 0,
            delay: config.initial_delay,
        }
    }

    /// Number of retries handed out so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        let current = self.delay;
        // Clamp before converting; the product can exceed what Duration holds
        let next = (current.as_secs_f64() * self.config.backoff_multiplier)
            .min(self.config.max_delay.as_secs_f64());
        self.delay = Duration::try_from_secs_f64(next).unwrap_or(self.config.max_delay);

        Some(if self.config.jitter {
            add_jitter(current)
        } else {
            current
        })
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (max attempts, delays, backoff multiplier, jitter)
/// * `operation` - Async closure that returns Result<T, E> where E implements IsRetryable
///
/// # Returns
///
/// Returns the successful result or the last error after all retry attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);

    loop {
        match operation().await {
            Ok(result) => {
                if backoff.attempt() > 0 {
                    tracing::info!(
                        attempts = backoff.attempt() + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() => match backoff.next_delay() {
                Some(delay) => {
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempt(),
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        error = %e,
                        attempts = backoff.attempt() + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                    return Err(e);
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Operation failed with non-retryable error");
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
