//! Resumable session state and the byte-range headers of the protocol

use crate::error::UploadError;

/// Transient state of one resumable transfer
///
/// `bytes_sent` only moves forward and only to offsets the server reported;
/// the local count of bytes written to the wire is never trusted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSession {
    session_uri: String,
    bytes_sent: u64,
    total_bytes: Option<u64>,
}

impl UploadSession {
    /// Start tracking a freshly opened session
    pub fn new(session_uri: impl Into<String>, total_bytes: Option<u64>) -> Self {
        Self {
            session_uri: session_uri.into(),
            bytes_sent: 0,
            total_bytes,
        }
    }

    /// URI all chunk requests are sent to
    pub fn session_uri(&self) -> &str {
        &self.session_uri
    }

    /// Bytes the server has acknowledged
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Total payload size, once known
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Record the total size discovered at end of stream
    pub fn set_total(&mut self, total: u64) {
        self.total_bytes = Some(total);
    }

    /// Move the acknowledged offset to `reported`
    ///
    /// `max` is the end of the range that was just sent. A report behind the
    /// current offset, past `max`, or past the total is a protocol violation.
    pub fn advance_to(&mut self, reported: u64, max: u64) -> Result<(), UploadError> {
        let max = self.total_bytes.map_or(max, |total| max.min(total));
        if reported < self.bytes_sent || reported > max {
            return Err(UploadError::OffsetOutOfRange {
                reported,
                min: self.bytes_sent,
                max,
            });
        }
        self.bytes_sent = reported;
        Ok(())
    }
}

/// `Content-Range` value for `len` bytes starting at `offset`
///
/// An empty range (`len == 0`) is written as `bytes */total`, which is also
/// the form of a status query.
pub fn content_range(offset: u64, len: u64, total: Option<u64>) -> String {
    let total = total.map_or_else(|| "*".to_string(), |t| t.to_string());
    if len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", offset, offset + len - 1, total)
    }
}

/// Number of bytes the server holds according to a `Range: bytes=0-N` header
///
/// A missing header means nothing has been received yet.
pub fn received_bytes(range: Option<&str>) -> Result<u64, UploadError> {
    let Some(range) = range else {
        return Ok(0);
    };

    let invalid = || UploadError::InvalidResponse(format!("unparseable Range header '{range}'"));
    let (start, end) = range
        .trim()
        .strip_prefix("bytes=")
        .and_then(|r| r.split_once('-'))
        .ok_or_else(invalid)?;

    if start.trim() != "0" {
        return Err(invalid());
    }
    let end: u64 = end.trim().parse().map_err(|_| invalid())?;
    Ok(end + 1)
}
