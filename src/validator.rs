//! Upload size and format checks.

use crate::config::OcrConfig;
use crate::encoder::extension;
use crate::error::OcrError;
use tracing::debug;

/// Check an upload against the configured size ceiling and format allow-list.
///
/// `mime_type` is the resolved type (declared, inferred or fallback).
pub fn validate_file(
    content: &[u8],
    filename: &str,
    mime_type: &str,
    config: &OcrConfig,
) -> Result<(), OcrError> {
    let limit = config.max_file_size();
    if content.len() as u64 > limit {
        return Err(OcrError::file_too_large(limit, Some(content.len())));
    }

    let formats = config.supported_formats();
    if !is_supported(&formats, filename, mime_type) {
        debug!(
            "Rejecting {} ({}), allowed formats: {:?}",
            filename, mime_type, formats
        );
        return Err(OcrError::UnsupportedFormat {
            mime_type: mime_type.to_string(),
            filename: filename.to_string(),
        });
    }

    Ok(())
}

/// True if any allow-list entry matches the MIME type or the file extension.
pub fn is_supported(formats: &[String], filename: &str, mime_type: &str) -> bool {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    let ext = extension(filename);

    formats.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        if entry.is_empty() {
            return false;
        }

        if entry.contains('/') {
            match entry.strip_suffix("/*") {
                Some(top) => mime_type
                    .split_once('/')
                    .is_some_and(|(t, _)| t == top),
                None => entry == mime_type,
            }
        } else {
            let wanted = entry.strip_prefix('.').unwrap_or(&entry);
            ext.as_deref() == Some(wanted)
        }
    })
}
