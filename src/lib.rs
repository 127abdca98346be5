//! # veo-drive
//!
//! Generate a video from a text prompt and store it in Google Drive.
//!
//! A run has four stages:
//!
//! - **Generate** - a [`VideoGenerator`] turns the prompt into a raw response
//! - **Resolve** - [`resolver::resolve`] finds the video URI in that response
//! - **Fetch** - the [`Fetcher`] streams the bytes from `https://` or `gs://`
//! - **Upload** - the [`Uploader`] writes them to Drive through a resumable session
//!
//! The video is streamed from source to destination; at most one upload chunk
//! plus the unacknowledged remainder is held in memory.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use veo_drive::{Config, GeminiGenerator, Pipeline, StaticCredentials};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let generator = GeminiGenerator::new(config.generation.clone(), "api-key")?;
//!     let pipeline = Pipeline::new(
//!         config,
//!         Arc::new(generator),
//!         Arc::new(StaticCredentials::from_env()),
//!     )?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let stored = pipeline.run("a red ball bouncing", None, None).await?;
//!     println!("uploaded as {}", stored.object_id);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Bearer credential providers
pub mod credentials;
/// Error types
pub mod error;
/// Video retrieval by URI scheme
pub mod fetcher;
/// Video generation client
pub mod generation;
/// Stage orchestration
pub mod pipeline;
/// Generation response interpretation
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Resumable Drive uploads
pub mod uploader;
/// Utility functions
pub mod utils;

use std::future::Future;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialProvider, CredentialScope, StaticCredentials};
pub use error::{Error, FetchError, ResolutionError, Result, UploadError};
pub use fetcher::Fetcher;
pub use generation::{GeminiGenerator, VideoGenerator};
pub use pipeline::Pipeline;
pub use types::{ContentBlob, Event, ResultDescriptor, StoredObjectRef, UploadTarget};
pub use uploader::Uploader;

/// Run `future` to completion unless a termination signal arrives first.
///
/// On a signal the future is dropped, which abandons any in-flight request
/// (an unfinished upload session never becomes a visible file), and
/// [`Error::Cancelled`] is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use veo_drive::{Config, GeminiGenerator, Pipeline, StaticCredentials};
/// use veo_drive::run_until_interrupted;
///
/// # async fn example(pipeline: Pipeline) -> veo_drive::Result<()> {
/// let stored = run_until_interrupted(pipeline.run("a red ball bouncing", None, None)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_until_interrupted<F, T>(future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = future => result,
        () = wait_for_signal() => {
            tracing::warn!("interrupted, abandoning run");
            Err(Error::Cancelled)
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            // Never resolve, so a broken signal listener cannot cancel the run
            std::future::pending::<()>().await;
        }
    }
}
