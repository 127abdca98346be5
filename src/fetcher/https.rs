//! Direct transfer strategy

use crate::error::{FetchError, Result};
use crate::types::ContentBlob;

use super::Fetcher;

/// Validate a direct-transfer URI
pub(super) fn parse(uri: &str) -> std::result::Result<url::Url, FetchError> {
    let url = url::Url::parse(uri).map_err(|e| FetchError::MalformedUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;

    if url.host_str().is_none_or(str::is_empty) {
        return Err(FetchError::MalformedUri {
            uri: uri.to_string(),
            reason: "missing host".into(),
        });
    }
    Ok(url)
}

/// Stream the body of `url`
///
/// Signed URLs carry their own authorization, so no credential is attached.
pub(super) async fn fetch(fetcher: &Fetcher, uri: &str, url: url::Url) -> Result<ContentBlob> {
    fetcher.get_streamed(uri, url.as_str(), None).await
}
