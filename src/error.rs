//! Error types for veo-drive
//!
//! This module provides the error taxonomy for the pipeline:
//! - Per-component error enums (Resolution, Fetch, Upload)
//! - A top-level [`Error`] that the orchestrator surfaces unchanged
//! - Machine-readable error codes and process exit codes for the CLI

use thiserror::Error;

/// Result type alias for veo-drive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for veo-drive
///
/// Each variant carries enough diagnostic context (status code, truncated
/// body, offset reached) to explain a failure without re-running it.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "upload.chunk_size")
        key: Option<String>,
    },

    /// A bearer credential could not be obtained
    #[error("credential error: {0}")]
    Credential(String),

    /// The generation service rejected the request
    #[error("generation request failed with status {status}: {body}")]
    Generation {
        /// HTTP status returned by the generation service
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// The generation result could not be turned into a result descriptor
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// The video bytes could not be retrieved
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// The video bytes could not be stored
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Network error outside of the fetch/upload paths (client construction, generation call)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run was interrupted by a termination signal
    #[error("interrupted before completion")]
    Cancelled,
}

/// Failures while extracting a result descriptor from a generation response
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// The generation service reported an error object instead of a result
    #[error("generation failed: {message}")]
    GenerationFailed {
        /// Message reported by the service
        message: String,
    },

    /// The prompt or the output was blocked or filtered
    #[error("generation blocked: {reason}")]
    Blocked {
        /// Block or finish reason reported by the service
        reason: String,
    },

    /// The response contained no candidates
    #[error("response contains no candidates")]
    NoCandidates,

    /// The response did not have the candidates/content/parts shape
    #[error("unrecognized response shape: {0}")]
    UnrecognizedShape(String),

    /// No part carried video file data
    #[error("no video file part found in the first candidate")]
    NoVideoPart,

    /// The video part carried an empty URI
    #[error("video file part has an empty URI")]
    EmptyUri,
}

/// Transport-level retrieval failures
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URI scheme has no retrieval strategy
    #[error("unsupported URI scheme '{scheme}'")]
    UnsupportedScheme {
        /// The scheme found on the URI
        scheme: String,
    },

    /// The URI has a supported scheme but cannot be parsed
    #[error("malformed URI '{uri}': {reason}")]
    MalformedUri {
        /// The offending URI
        uri: String,
        /// Why it could not be parsed
        reason: String,
    },

    /// The remote answered with a non-success status
    #[error("fetching {uri} returned status {status}: {body}")]
    Status {
        /// The URI being fetched
        uri: String,
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Connection establishment or transfer exceeded its time budget
    #[error("timed out fetching {uri}")]
    Timeout {
        /// The URI being fetched
        uri: String,
    },

    /// Connection or stream failure without an HTTP status
    #[error("transport failure fetching {uri}: {reason}")]
    Transport {
        /// The URI being fetched
        uri: String,
        /// Underlying error description
        reason: String,
    },

    /// The stream produced a different number of bytes than the transport announced
    #[error("expected {expected} bytes but stream produced {actual}")]
    LengthMismatch {
        /// Length announced by the transport
        expected: u64,
        /// Bytes actually produced (may be partial when the stream overran)
        actual: u64,
    },
}

/// Destination-side failures
#[derive(Debug, Error)]
pub enum UploadError {
    /// The storage API refused to open a resumable session
    #[error("failed to initiate upload session (status {status:?}): {body}")]
    Init {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Truncated response body or transport error description
        body: String,
    },

    /// A chunk could not be delivered within the retry budget
    #[error("chunk at offset {offset} failed (status {status:?}): {body}")]
    Chunk {
        /// HTTP status of the last attempt, if a response was received
        status: Option<u16>,
        /// Truncated body of the last response or transport error description
        body: String,
        /// Byte offset the failing chunk started at
        offset: u64,
    },

    /// The server reported a received-byte offset the session cannot move to
    #[error("server reported offset {reported}, valid range is {min}..={max}")]
    OffsetOutOfRange {
        /// Offset reported by the server
        reported: u64,
        /// Bytes already acknowledged
        min: u64,
        /// Highest offset the server could have received
        max: u64,
    },

    /// A success or continuation response could not be interpreted
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Credential(_) => "credential_error",
            Error::Generation { .. } => "generation_error",
            Error::Resolution(_) => "resolution_error",
            Error::Fetch(e) => match e {
                FetchError::UnsupportedScheme { .. } => "unsupported_scheme",
                FetchError::MalformedUri { .. } => "malformed_uri",
                FetchError::Timeout { .. } => "fetch_timeout",
                FetchError::Status { .. }
                | FetchError::Transport { .. }
                | FetchError::LengthMismatch { .. } => "fetch_error",
            },
            Error::Upload(e) => match e {
                UploadError::Init { .. } => "upload_init_error",
                UploadError::Chunk { .. }
                | UploadError::OffsetOutOfRange { .. }
                | UploadError::InvalidResponse(_) => "upload_chunk_error",
            },
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Cancelled => "cancelled",
        }
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config { .. } | Error::Credential(_) => 2,
            Error::Generation { .. } | Error::Resolution(_) => 3,
            Error::Fetch(_) => 4,
            Error::Upload(_) => 5,
            Error::Cancelled => 130,
            Error::Network(_) | Error::Serialization(_) | Error::Io(_) => 1,
        }
    }

    /// Create a configuration error for a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
