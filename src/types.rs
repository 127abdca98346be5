//! Core types and events for veo-drive

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};
use crate::utils::ensure_extension;

/// Stream of video bytes as produced by a fetch strategy
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Normalized location of a generated video
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    /// Where the video can be read from (`https://...` or `gs://bucket/object`)
    pub uri: String,
    /// Content type reported by the generation service
    pub mime_type: Option<String>,
}

impl ResultDescriptor {
    /// Create a new descriptor
    pub fn new(uri: impl Into<String>, mime_type: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type,
        }
    }

    /// The URI scheme, lower-cased, or the whole prefix before `:` when there is no `://`
    pub fn scheme(&self) -> String {
        let head = match self.uri.split_once("://") {
            Some((scheme, _)) => scheme,
            None => self.uri.split_once(':').map_or(self.uri.as_str(), |(s, _)| s),
        };
        head.to_ascii_lowercase()
    }
}

/// Video bytes in flight between the fetcher and the uploader
///
/// When the transport announced a length, the stream is checked against it:
/// producing more or fewer bytes ends the stream with
/// [`FetchError::LengthMismatch`].
pub struct ContentBlob {
    stream: ByteStream,
    known_len: Option<u64>,
    mime_type: Option<String>,
}

impl ContentBlob {
    /// Wrap a byte stream, enforcing `known_len` when present
    pub fn from_stream<S>(stream: S, known_len: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        let stream = match known_len {
            Some(expected) => enforce_length(stream.boxed(), expected),
            None => stream.boxed(),
        };
        Self {
            stream,
            known_len,
            mime_type: None,
        }
    }

    /// Wrap an in-memory buffer
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self {
            stream: stream::iter(std::iter::once(Ok(bytes))).boxed(),
            known_len: Some(len),
            mime_type: None,
        }
    }

    /// Attach the content type reported by the source
    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }

    /// Total length, when the transport reported one
    pub fn known_len(&self) -> Option<u64> {
        self.known_len
    }

    /// Content type reported by the source
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Take the underlying stream
    pub fn into_stream(self) -> ByteStream {
        self.stream
    }

    /// Collect the whole stream into memory
    pub async fn into_bytes(self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        let mut stream = self.stream;
        while let Some(chunk) = stream.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl std::fmt::Debug for ContentBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentBlob")
            .field("known_len", &self.known_len)
            .field("mime_type", &self.mime_type)
            .finish_non_exhaustive()
    }
}

struct LengthCheck {
    inner: ByteStream,
    expected: u64,
    seen: u64,
    done: bool,
}

fn enforce_length(inner: ByteStream, expected: u64) -> ByteStream {
    let state = LengthCheck {
        inner,
        expected,
        seen: 0,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        let mismatch = |state: &LengthCheck| FetchError::LengthMismatch {
            expected: state.expected,
            actual: state.seen,
        };

        match state.inner.next().await {
            Some(Ok(chunk)) => {
                state.seen += chunk.len() as u64;
                if state.seen > state.expected {
                    state.done = true;
                    let err = mismatch(&state);
                    return Some((Err(err.into()), state));
                }
                Some((Ok(chunk), state))
            }
            Some(Err(e)) => {
                state.done = true;
                Some((Err(e), state))
            }
            None if state.seen != state.expected => {
                state.done = true;
                let err = mismatch(&state);
                Some((Err(err.into()), state))
            }
            None => None,
        }
    })
    .boxed()
}

/// Where and under what name the video is stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    /// File name, always non-empty and carrying a video extension
    pub name: String,
    /// Destination folder; the storage root when absent
    pub parent_folder_id: Option<String>,
    /// Content type declared to the storage API
    pub mime_type: String,
}

impl UploadTarget {
    /// Create a target, appending the extension mapped from `mime_type` when `name` lacks one
    pub fn new(
        name: &str,
        parent_folder_id: Option<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        let mime_type = mime_type.into();
        Self {
            name: ensure_extension(name, Some(&mime_type)),
            parent_folder_id: parent_folder_id.filter(|id| !id.trim().is_empty()),
            mime_type,
        }
    }
}

/// Durable reference to an uploaded object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObjectRef {
    /// Storage-assigned object ID
    #[serde(rename = "id")]
    pub object_id: String,
    /// Browser link to the object, when the API returned one
    #[serde(rename = "webViewLink", default, skip_serializing_if = "Option::is_none")]
    pub web_view_link: Option<String>,
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Generation request sent
    GenerationRequested {
        /// The prompt sent to the generator
        prompt: String,
    },

    /// Generation result resolved to a descriptor
    Resolved {
        /// Video location
        uri: String,
        /// Reported content type
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },

    /// Retrieval started
    FetchStarted {
        /// Video location
        uri: String,
        /// Total length, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
    },

    /// Resumable session opened
    UploadStarted {
        /// Destination file name
        name: String,
    },

    /// A chunk was acknowledged by the storage API
    UploadProgress {
        /// Bytes the storage API has confirmed
        bytes_sent: u64,
        /// Total length, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
    },

    /// A chunk is about to be retried
    ChunkRetry {
        /// Offset the chunk starts at
        offset: u64,
        /// Retry number (1-based)
        attempt: u32,
        /// Why the previous attempt failed
        error: String,
    },

    /// Upload finished
    Completed {
        /// Storage-assigned object ID
        object_id: String,
        /// Browser link, when available
        #[serde(skip_serializing_if = "Option::is_none")]
        web_view_link: Option<String>,
    },
}
