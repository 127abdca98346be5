//! Utility functions: file naming and diagnostic helpers

use chrono::{DateTime, Utc};

/// Extension used when a mime type has no known mapping
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Stem used when neither a name hint nor a prompt yields a usable name
const DEFAULT_STEM: &str = "veo_video";

/// Number of prompt characters carried into generated file names
const PROMPT_PREFIX_CHARS: usize = 20;

/// Video mime types and the extension each one maps to
const VIDEO_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/webm", "webm"),
    ("video/x-matroska", "mkv"),
    ("video/x-msvideo", "avi"),
    ("video/mpeg", "mpeg"),
    ("video/3gpp", "3gp"),
    ("video/ogg", "ogv"),
];

/// Map a mime type to a file extension (without the dot)
///
/// Parameters such as `; codecs=...` are ignored and matching is
/// case-insensitive. Unknown or absent mime types map to [`DEFAULT_EXTENSION`].
///
/// # Examples
///
/// ```
/// use veo_drive::utils::extension_for_mime;
///
/// assert_eq!(extension_for_mime(Some("video/webm")), "webm");
/// assert_eq!(extension_for_mime(Some("application/octet-stream")), "mp4");
/// assert_eq!(extension_for_mime(None), "mp4");
/// ```
pub fn extension_for_mime(mime_type: Option<&str>) -> &'static str {
    let Some(mime) = mime_type else {
        return DEFAULT_EXTENSION;
    };
    let essence = mime.split(';').next().unwrap_or_default().trim();

    VIDEO_EXTENSIONS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
        .unwrap_or(DEFAULT_EXTENSION)
}

/// Whether `name` already ends in a recognised video extension
pub fn has_video_extension(name: &str) -> bool {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    !stem.is_empty()
        && VIDEO_EXTENSIONS
            .iter()
            .any(|(_, known)| known.eq_ignore_ascii_case(ext))
}

/// Append the extension for `mime_type` unless `name` already carries one
///
/// The extension is appended at most once, so the function is idempotent.
/// An empty or whitespace-only name falls back to a default stem.
///
/// # Examples
///
/// ```
/// use veo_drive::utils::ensure_extension;
///
/// assert_eq!(ensure_extension("clip", None), "clip.mp4");
/// assert_eq!(ensure_extension("clip", Some("video/quicktime")), "clip.mov");
/// assert_eq!(ensure_extension("clip.MP4", Some("video/webm")), "clip.MP4");
/// ```
pub fn ensure_extension(name: &str, mime_type: Option<&str>) -> String {
    let name = name.trim();
    let name = if name.is_empty() { DEFAULT_STEM } else { name };

    if has_video_extension(name) {
        name.to_string()
    } else {
        format!("{}.{}", name, extension_for_mime(mime_type))
    }
}

/// Build a file name from the prompt when the caller did not supply one
///
/// Format: `veo_video_<first 20 prompt chars, spaces as _>_<YYYYmmdd-HHMMSS>.<ext>`.
/// Path separators are replaced so the result is always a single name.
pub fn default_file_name(prompt: &str, mime_type: Option<&str>, now: DateTime<Utc>) -> String {
    let prefix: String = prompt
        .trim()
        .chars()
        .take(PROMPT_PREFIX_CHARS)
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    let prefix = prefix.trim_end_matches('_');

    let timestamp = now.format("%Y%m%d-%H%M%S");
    let ext = extension_for_mime(mime_type);

    if prefix.is_empty() {
        format!("{DEFAULT_STEM}_{timestamp}.{ext}")
    } else {
        format!("{DEFAULT_STEM}_{prefix}_{timestamp}.{ext}")
    }
}

/// Truncate a response body for inclusion in an error message
///
/// Cuts on a character boundary and marks the cut with an ellipsis.
pub fn truncate_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
