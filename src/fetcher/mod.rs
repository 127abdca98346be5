//! Content retrieval: result descriptor URI to byte stream
//!
//! The URI scheme picks the strategy:
//! - `https://`: direct streamed GET ([`https`])
//! - `gs://bucket/object`: Cloud Storage media download ([`gcs`])
//!
//! Any other scheme is rejected before a request is built.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;

use crate::config::{FetchConfig, RetryConfig};
use crate::credentials::CredentialProvider;
use crate::error::{Error, FetchError, Result};
use crate::retry::with_retry;
use crate::types::{ByteStream, ContentBlob, ResultDescriptor};
use crate::utils::truncate_body;

pub mod gcs;
pub mod https;

/// A retrieval strategy selected from a URI
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// Direct transfer from an HTTP(S) URL
    Direct(url::Url),
    /// Object storage location
    ObjectStorage {
        /// Bucket name
        bucket: String,
        /// Object key within the bucket
        object: String,
    },
}

impl Source {
    /// Select a strategy for `uri`
    ///
    /// `allow_http` additionally admits `http://` on the direct path.
    pub fn parse(uri: &str, allow_http: bool) -> std::result::Result<Self, FetchError> {
        let scheme = ResultDescriptor::new(uri, None).scheme();
        match scheme.as_str() {
            "https" => https::parse(uri).map(Source::Direct),
            "http" if allow_http => https::parse(uri).map(Source::Direct),
            "gs" => {
                let (bucket, object) = gcs::parse(uri)?;
                Ok(Source::ObjectStorage { bucket, object })
            }
            _ => Err(FetchError::UnsupportedScheme { scheme }),
        }
    }
}

/// Retrieves generated videos as byte streams
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
    retry: RetryConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl Fetcher {
    /// Build a fetcher with its own HTTP client
    ///
    /// Only the connection timeout lives on the client. `config.timeout`
    /// bounds the wait for response headers and for each body read, so a
    /// consumer that pauses between reads (the uploader waiting on Drive)
    /// never runs the source into a deadline.
    pub fn new(
        config: FetchConfig,
        retry: RetryConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            retry,
            credentials,
        })
    }

    /// Open a byte stream for the video named by `descriptor`
    ///
    /// # Errors
    ///
    /// - [`FetchError::UnsupportedScheme`] / [`FetchError::MalformedUri`] before any network call
    /// - [`FetchError::Status`] for non-success responses (missing object, access denied, ...)
    /// - [`FetchError::Timeout`] when connecting, waiting for headers, or a single body read stalls
    ///
    /// The blob's mime type is the descriptor's, else a `video/*` `Content-Type` from the source.
    pub async fn fetch(&self, descriptor: &ResultDescriptor) -> Result<ContentBlob> {
        let source = Source::parse(&descriptor.uri, self.config.allow_http)?;

        tracing::info!(uri = %descriptor.uri, "fetching generated video");

        let blob = match source {
            Source::Direct(url) => https::fetch(self, &descriptor.uri, url).await?,
            Source::ObjectStorage { bucket, object } => {
                gcs::fetch(self, &descriptor.uri, &bucket, &object).await?
            }
        };

        tracing::debug!(uri = %descriptor.uri, total_bytes = ?blob.known_len(), "video stream opened");

        let mime_type = descriptor
            .mime_type
            .clone()
            .or_else(|| blob.mime_type().map(str::to_string));
        Ok(blob.with_mime_type(mime_type))
    }

    /// Issue a GET, retrying transient failures until response headers arrive,
    /// then hand the body over as a stream
    ///
    /// `display_uri` is the URI reported in errors; `url` is what is requested.
    pub(crate) async fn get_streamed(
        &self,
        display_uri: &str,
        url: &str,
        bearer: Option<&str>,
    ) -> Result<ContentBlob> {
        let client = &self.client;
        let limit = self.config.error_body_limit;
        let read_timeout = self.config.timeout;

        let response = with_retry(&self.retry, || async move {
            let mut request = client.get(url);
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            let response = tokio::time::timeout(read_timeout, request.send())
                .await
                .map_err(|_| FetchError::Timeout {
                    uri: display_uri.to_string(),
                })?
                .map_err(|e| transport_error(display_uri, e))?;

            let status = response.status();
            if !status.is_success() {
                let body = tokio::time::timeout(read_timeout, response.text())
                    .await
                    .ok()
                    .and_then(|body| body.ok())
                    .unwrap_or_default();
                return Err(FetchError::Status {
                    uri: display_uri.to_string(),
                    status: status.as_u16(),
                    body: truncate_body(&body, limit),
                });
            }
            Ok(response)
        })
        .await?;

        let total = response.content_length();
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
            .filter(|v| v.starts_with("video/"));
        let stream = idle_timeout(response.bytes_stream(), display_uri.to_string(), read_timeout);

        Ok(ContentBlob::from_stream(stream, total).with_mime_type(mime_type))
    }
}

/// Fail a body stream with [`FetchError::Timeout`] when one read waits longer than `idle`
///
/// The clock only runs while the consumer is polling, so time the consumer
/// spends elsewhere between reads does not count.
fn idle_timeout<S>(body: S, uri: String, idle: Duration) -> ByteStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    stream::unfold(Some(body.boxed()), move |body| {
        let uri = uri.clone();
        async move {
            let mut body = body?;
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
                Ok(Some(Err(e))) => Some((Err(Error::from(transport_error(&uri, e))), None)),
                Ok(None) => None,
                Err(_) => {
                    tracing::warn!(uri = %uri, idle_ms = idle.as_millis() as u64, "source stalled");
                    Some((Err(Error::from(FetchError::Timeout { uri })), None))
                }
            }
        }
    })
    .boxed()
}

/// Classify a reqwest failure for `uri`
fn transport_error(uri: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            uri: uri.to_string(),
        }
    } else {
        let reason = if e.is_connect() {
            format!("connection failed: {}", e)
        } else {
            e.to_string()
        };
        FetchError::Transport {
            uri: uri.to_string(),
            reason,
        }
    }
}
