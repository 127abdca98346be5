//! Resumable chunked upload to Google Drive
//!
//! The transfer follows the resumable protocol:
//!
//! 1. A metadata-only `POST` opens a session; the `Location` header is the session URI.
//! 2. The body is sent in `chunk_size` pieces with `PUT` + `Content-Range`.
//! 3. `308` means "send more, starting where I say"; `200`/`201` carries the created file.
//!
//! Only the current chunk and whatever the server has not yet acknowledged is
//! held in memory. The offset the server reports is authoritative: when it
//! accepted less than was sent, the unacknowledged tail is sent again.
//!
//! An upload that fails is simply abandoned; Drive never lists a file whose
//! session did not complete.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::StatusCode;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::{RetryConfig, UploadConfig};
use crate::credentials::{CredentialProvider, CredentialScope};
use crate::error::{Error, Result, UploadError};
use crate::retry::{Backoff, with_retry};
use crate::types::{ByteStream, ContentBlob, Event, StoredObjectRef, UploadTarget};
use crate::utils::truncate_body;

pub mod session;

pub use session::{UploadSession, content_range, received_bytes};

/// File resource metadata sent when opening a session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata<'a> {
    name: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<Vec<&'a str>>,
}

/// Server verdict on a single chunk or status request
#[derive(Debug)]
enum Attempt {
    /// The file exists
    Complete(StoredObjectRef),
    /// More bytes needed; the server holds this many
    Incomplete(u64),
    /// Error status from the server
    Rejected { status: u16, body: String },
    /// No usable response
    Transport(String),
}

/// Accepted outcome of a chunk
enum Ack {
    Complete(StoredObjectRef),
    Received(u64),
}

/// Uploads content blobs to Drive through resumable sessions
pub struct Uploader {
    client: reqwest::Client,
    config: UploadConfig,
    retry: RetryConfig,
    credentials: Arc<dyn CredentialProvider>,
    events: Option<broadcast::Sender<Event>>,
}

impl Uploader {
    /// Build an uploader with its own HTTP client
    ///
    /// Redirects are disabled because `308` is a protocol response here.
    pub fn new(
        config: UploadConfig,
        retry: RetryConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            config,
            retry,
            credentials,
            events: None,
        })
    }

    /// Publish progress and retry events on `events`
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    /// Upload `blob` as `target` and return the created file
    ///
    /// # Errors
    ///
    /// - [`UploadError::Init`] when the session cannot be opened (bad folder id, auth, ...)
    /// - [`UploadError::Chunk`] when a chunk keeps failing past the retry budget
    /// - [`UploadError::OffsetOutOfRange`] when the server reports an impossible offset
    /// - fetch errors raised by the blob's stream while it is being read
    pub async fn upload(&self, blob: ContentBlob, target: &UploadTarget) -> Result<StoredObjectRef> {
        let total = blob.known_len();
        let session_uri = self.start_session(target, total).await?;
        let mut session = UploadSession::new(session_uri, total);

        tracing::info!(
            name = %target.name,
            mime_type = %target.mime_type,
            total_bytes = ?total,
            chunk_size = self.config.chunk_size,
            "upload session opened"
        );
        self.emit(Event::UploadStarted {
            name: target.name.clone(),
        });

        match self.transfer(&mut session, blob.into_stream()).await {
            Ok(object) => {
                tracing::info!(
                    object_id = %object.object_id,
                    bytes = session.total_bytes().unwrap_or(session.bytes_sent()),
                    "upload complete"
                );
                Ok(object)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bytes_acknowledged = session.bytes_sent(),
                    "abandoning upload session"
                );
                Err(e)
            }
        }
    }

    /// Open a resumable session and return its URI
    async fn start_session(&self, target: &UploadTarget, total: Option<u64>) -> Result<String> {
        let url = format!(
            "{}/upload/drive/v3/files",
            self.config.endpoint.trim_end_matches('/')
        );
        let metadata = FileMetadata {
            name: &target.name,
            mime_type: &target.mime_type,
            parents: target.parent_folder_id.as_deref().map(|id| vec![id]),
        };
        let client = &self.client;
        let credentials = &self.credentials;
        let url = url.as_str();
        let metadata = &metadata;
        let mime_type = target.mime_type.as_str();
        let limit = self.config.error_body_limit;

        with_retry(&self.retry, || async move {
            let token = credentials.bearer_token(CredentialScope::Drive).await?;
            let mut request = client
                .post(url)
                .query(&[
                    ("uploadType", "resumable"),
                    ("supportsAllDrives", "true"),
                    ("fields", "id,webViewLink"),
                ])
                .bearer_auth(token)
                .header("X-Upload-Content-Type", mime_type)
                .json(metadata);
            if let Some(total) = total {
                request = request.header("X-Upload-Content-Length", total.to_string());
            }

            let response = request.send().await.map_err(|e| UploadError::Init {
                status: None,
                body: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::from(UploadError::Init {
                    status: Some(status.as_u16()),
                    body: truncate_body(&body, limit),
                }));
            }

            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::from(UploadError::Init {
                        status: Some(status.as_u16()),
                        body: "session response carried no Location header".into(),
                    })
                })
        })
        .await
    }

    /// Drive the chunk loop until the server reports the file as created
    async fn transfer(
        &self,
        session: &mut UploadSession,
        mut stream: ByteStream,
    ) -> Result<StoredObjectRef> {
        let chunk_size = self.config.chunk_size;
        let mut pending = BytesMut::with_capacity(chunk_size);
        let mut eof = false;
        let mut stall = Backoff::new(&self.retry);

        loop {
            while !eof && pending.len() < chunk_size {
                match stream.next().await {
                    Some(chunk) => pending.extend_from_slice(&chunk?),
                    None => eof = true,
                }
            }

            let offset = session.bytes_sent();
            let len = pending.len().min(chunk_size);
            let is_last = eof && len == pending.len();
            if is_last && session.total_bytes().is_none() {
                session.set_total(offset + len as u64);
            }

            let chunk = Bytes::copy_from_slice(&pending[..len]);
            let received = match self.send_chunk(session, offset, chunk).await? {
                Ack::Complete(object) => return Ok(object),
                Ack::Received(received) => received,
            };

            session.advance_to(received, offset + len as u64)?;
            pending.advance((received - offset) as usize);

            if received == offset {
                let Some(delay) = stall.next_delay() else {
                    tracing::error!(offset, attempts = stall.attempt() + 1, "upload made no progress");
                    return Err(UploadError::Chunk {
                        status: Some(StatusCode::PERMANENT_REDIRECT.as_u16()),
                        body: "server acknowledged no new bytes".into(),
                        offset,
                    }
                    .into());
                };
                tracing::warn!(
                    offset,
                    attempt = stall.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "server acknowledged no new bytes, retrying"
                );
                self.emit(Event::ChunkRetry {
                    offset,
                    attempt: stall.attempt(),
                    error: "no bytes acknowledged".into(),
                });
                tokio::time::sleep(delay).await;
                continue;
            }
            stall = Backoff::new(&self.retry);

            tracing::debug!(
                offset,
                sent = len,
                acknowledged = received,
                total_bytes = ?session.total_bytes(),
                "chunk acknowledged"
            );
            self.emit(Event::UploadProgress {
                bytes_sent: received,
                total_bytes: session.total_bytes(),
            });
        }
    }

    /// Send one chunk, retrying error statuses and transport failures with backoff
    ///
    /// An exhausted budget is an [`UploadError::Chunk`].
    async fn send_chunk(&self, session: &UploadSession, offset: u64, chunk: Bytes) -> Result<Ack> {
        let mut backoff = Backoff::new(&self.retry);

        loop {
            let attempt = self.put_range(session, offset, chunk.clone()).await?;

            let (status, body, lost_response) = match attempt {
                Attempt::Complete(object) => return Ok(Ack::Complete(object)),
                Attempt::Incomplete(received) => return Ok(Ack::Received(received)),
                Attempt::Rejected { status, body } => (Some(status), body, false),
                Attempt::Transport(reason) => (None, reason, true),
            };

            let Some(delay) = backoff.next_delay() else {
                tracing::error!(
                    offset,
                    status = ?status,
                    attempts = backoff.attempt() + 1,
                    "chunk failed after all retry attempts exhausted"
                );
                return Err(UploadError::Chunk {
                    status,
                    body,
                    offset,
                }
                .into());
            };

            tracing::warn!(
                offset,
                status = ?status,
                error = %body,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                "chunk failed, retrying"
            );
            self.emit(Event::ChunkRetry {
                offset,
                attempt: backoff.attempt(),
                error: status.map_or_else(|| body.clone(), |s| format!("status {s}")),
            });
            tokio::time::sleep(delay).await;

            // The chunk may have landed even though the response did not
            if lost_response {
                match self.query_status(session).await? {
                    Attempt::Complete(object) => return Ok(Ack::Complete(object)),
                    Attempt::Incomplete(received) if received != offset => {
                        return Ok(Ack::Received(received));
                    }
                    other => {
                        tracing::debug!(offset, verdict = ?other, "status query did not move the offset");
                    }
                }
            }
        }
    }

    /// PUT `chunk` at `offset` against the session
    async fn put_range(&self, session: &UploadSession, offset: u64, chunk: Bytes) -> Result<Attempt> {
        let range = content_range(offset, chunk.len() as u64, session.total_bytes());
        self.put(session, range, chunk).await
    }

    /// Ask the session how many bytes it holds
    async fn query_status(&self, session: &UploadSession) -> Result<Attempt> {
        let range = content_range(session.bytes_sent(), 0, session.total_bytes());
        self.put(session, range, Bytes::new()).await
    }

    async fn put(&self, session: &UploadSession, range: String, body: Bytes) -> Result<Attempt> {
        let token = self.credentials.bearer_token(CredentialScope::Drive).await?;

        tracing::trace!(content_range = %range, "sending upload request");

        let response = match self
            .client
            .put(session.session_uri())
            .bearer_auth(token)
            .header(CONTENT_RANGE, range)
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Ok(Attempt::Transport(e.to_string())),
        };

        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::CREATED => {
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => return Ok(Attempt::Transport(e.to_string())),
                };
                let object: StoredObjectRef = serde_json::from_str(&body).map_err(|e| {
                    UploadError::InvalidResponse(format!(
                        "completion body is not a file resource: {e}: {}",
                        truncate_body(&body, self.config.error_body_limit)
                    ))
                })?;
                Ok(Attempt::Complete(object))
            }
            StatusCode::PERMANENT_REDIRECT => {
                let range = response.headers().get(RANGE).and_then(|v| v.to_str().ok());
                Ok(Attempt::Incomplete(received_bytes(range)?))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Ok(Attempt::Rejected {
                    status: status.as_u16(),
                    body: truncate_body(&body, self.config.error_body_limit),
                })
            }
        }
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            // No subscribers is fine
            events.send(event).ok();
        }
    }
}

#[cfg(test)]
mod tests;
