//! Object-storage transfer strategy (Cloud Storage JSON API media download)

use crate::credentials::CredentialScope;
use crate::error::{FetchError, Result};
use crate::types::ContentBlob;

use super::Fetcher;

/// Split `gs://bucket/object/key` into bucket and object key
///
/// The first path segment is the bucket; everything after the next `/` is the key.
pub(super) fn parse(uri: &str) -> std::result::Result<(String, String), FetchError> {
    let malformed = |reason: &str| FetchError::MalformedUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let rest = uri
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| malformed("missing '://'"))?;
    let (bucket, object) = rest
        .split_once('/')
        .ok_or_else(|| malformed("missing object path"))?;

    if bucket.is_empty() {
        return Err(malformed("missing bucket name"));
    }
    if object.is_empty() {
        return Err(malformed("missing object key"));
    }
    Ok((bucket.to_string(), object.to_string()))
}

/// Media download URL for an object
fn media_url(endpoint: &str, bucket: &str, object: &str) -> String {
    format!(
        "{}/storage/v1/b/{}/o/{}?alt=media",
        endpoint.trim_end_matches('/'),
        urlencoding::encode(bucket),
        urlencoding::encode(object)
    )
}

/// Stream the named object using the ambient storage credential
pub(super) async fn fetch(
    fetcher: &Fetcher,
    uri: &str,
    bucket: &str,
    object: &str,
) -> Result<ContentBlob> {
    let token = fetcher
        .credentials
        .bearer_token(CredentialScope::Storage)
        .await?;
    let url = media_url(&fetcher.config.storage_endpoint, bucket, object);

    tracing::debug!(bucket = %bucket, object = %object, "reading object from storage");

    fetcher.get_streamed(uri, &url, Some(&token)).await
}
