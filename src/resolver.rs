//! Extraction of a [`ResultDescriptor`] from a generation response
//!
//! All assumptions about the shape of the generation response live here.
//! The extraction path is:
//!
//! ```text
//! candidates[0].content.parts[*].fileData.{fileUri, mimeType}
//! ```
//!
//! Keys are accepted in both the REST (`camelCase`) and SDK (`snake_case`)
//! spellings. Anything that does not match fails loudly with a
//! [`ResolutionError`] rather than guessing.

use serde_json::Value;

use crate::error::{ResolutionError, Result};
use crate::types::ResultDescriptor;

/// Finish reasons that mean the output was withheld
const FILTERED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

/// Look up a key by its camelCase or snake_case spelling
fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    value.get(camel).or_else(|| value.get(snake))
}

fn field_str<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a str> {
    field(value, camel, snake).and_then(Value::as_str)
}

/// Extract the video location from a raw generation response
///
/// # Errors
///
/// Returns [`ResolutionError`] when the service reported an error, the prompt
/// or output was blocked, or no video file part can be found.
pub fn resolve(raw: &Value) -> Result<ResultDescriptor> {
    if let Some(error) = raw.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ResolutionError::GenerationFailed { message }.into());
    }

    if let Some(reason) = field(raw, "promptFeedback", "prompt_feedback")
        .and_then(|feedback| field_str(feedback, "blockReason", "block_reason"))
    {
        return Err(ResolutionError::Blocked {
            reason: reason.to_string(),
        }
        .into());
    }

    let candidates = raw
        .get("candidates")
        .ok_or_else(|| ResolutionError::UnrecognizedShape("missing 'candidates'".into()))?
        .as_array()
        .ok_or_else(|| ResolutionError::UnrecognizedShape("'candidates' is not a list".into()))?;
    let candidate = candidates.first().ok_or(ResolutionError::NoCandidates)?;

    let parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .filter(|parts| !parts.is_empty());

    let Some(parts) = parts else {
        // An empty candidate is either filtered output or a shape we do not know
        return match field_str(candidate, "finishReason", "finish_reason") {
            Some(reason) if FILTERED_FINISH_REASONS.contains(&reason) => {
                Err(ResolutionError::Blocked {
                    reason: reason.to_string(),
                }
                .into())
            }
            _ => Err(ResolutionError::UnrecognizedShape(
                "first candidate has no content parts".into(),
            )
            .into()),
        };
    };

    let file_data = parts
        .iter()
        .filter_map(|part| field(part, "fileData", "file_data"))
        .find(|data| {
            field_str(data, "mimeType", "mime_type")
                .is_none_or(|mime| mime.to_ascii_lowercase().starts_with("video/"))
        })
        .ok_or(ResolutionError::NoVideoPart)?;

    let uri = field_str(file_data, "fileUri", "file_uri")
        .map(str::trim)
        .unwrap_or_default();
    if uri.is_empty() {
        return Err(ResolutionError::EmptyUri.into());
    }

    let mime_type = field_str(file_data, "mimeType", "mime_type")
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
        .map(str::to_string);

    tracing::debug!(uri = %uri, mime_type = ?mime_type, "resolved generation result");

    Ok(ResultDescriptor::new(uri, mime_type))
}
