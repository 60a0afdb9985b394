//! Request normalization: multipart and JSON uploads into one [`ParsedInput`].

use crate::config::OcrConfig;
use crate::encoder;
use crate::error::OcrError;
use crate::tasks::TaskType;
use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, HeaderMap, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Filename used when the client doesn't provide one.
pub const DEFAULT_FILENAME: &str = "upload";

/// Multipart field carrying the binary upload.
const IMAGE_FIELD: &str = "image";

/// Normalized upload, independent of how it arrived.
#[derive(Debug, Clone)]
pub struct ParsedInput {
    pub content: Bytes,
    pub filename: String,
    pub task_type: TaskType,
    pub custom_prompt: Option<String>,
    pub target_text: Option<String>,
    /// Multipart part content type or data-URI media type.
    pub declared_mime_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Multipart,
    Json,
}

/// Classify the request by its Content-Type header.
pub fn content_kind(headers: &HeaderMap) -> Result<ContentKind, OcrError> {
    let raw = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let essence = raw
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if essence == "multipart/form-data" {
        Ok(ContentKind::Multipart)
    } else if essence == "application/json" || essence.ends_with("+json") {
        Ok(ContentKind::Json)
    } else if essence.is_empty() {
        Err(OcrError::UnsupportedMediaType("missing Content-Type".to_string()))
    } else {
        Err(OcrError::UnsupportedMediaType(essence))
    }
}

// ============================================================================
// Multipart fields
// ============================================================================

/// A binary multipart part.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    File(FilePart),
    Text(String),
}

/// Pre-parsed multipart form: every value of every field, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    fields: HashMap<String, Vec<FieldValue>>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.entry(name.into()).or_default().push(value);
    }

    /// Drain a multipart stream into memory. `max_file_size` is only used to report overflows.
    pub async fn read(mut multipart: Multipart, max_file_size: u64) -> Result<Self, OcrError> {
        let mut form = Self::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| body_error(e.status(), "Malformed multipart body", e.body_text(), max_file_size))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let is_file = filename.is_some() || content_type.is_some();

            let bytes = field.bytes().await.map_err(|e| {
                body_error(
                    e.status(),
                    &format!("Failed to read multipart field '{}'", name),
                    e.body_text(),
                    max_file_size,
                )
            })?;

            let value = if is_file {
                FieldValue::File(FilePart {
                    bytes,
                    filename,
                    content_type,
                })
            } else {
                FieldValue::Text(String::from_utf8_lossy(&bytes).into_owned())
            };
            form.push(name, value);
        }

        Ok(form)
    }

    /// First value of a field, if it is binary.
    pub fn first_file(&self, name: &str) -> Option<&FilePart> {
        match self.fields.get(name)?.first()? {
            FieldValue::File(part) => Some(part),
            FieldValue::Text(_) => None,
        }
    }

    /// First value of a field as trimmed text; blank counts as absent.
    ///
    /// A typed part without a filename (`text/plain; charset=utf-8` form fields) reads as text.
    pub fn first_text(&self, name: &str) -> Option<String> {
        match self.fields.get(name)?.first()? {
            FieldValue::Text(text) => non_blank(Some(text.as_str())),
            FieldValue::File(part) if part.filename.is_none() => {
                non_blank(std::str::from_utf8(&part.bytes).ok())
            }
            FieldValue::File(_) => None,
        }
    }
}

// ============================================================================
// Normalization
// ============================================================================

/// Raw upload as read from the wire, before normalization.
#[derive(Debug)]
pub enum RawUpload {
    Multipart(FormFields),
    Json(Bytes),
}

/// Read the request body according to its content type.
pub async fn read_upload(request: Request, max_file_size: u64) -> Result<RawUpload, OcrError> {
    match content_kind(request.headers())? {
        ContentKind::Multipart => {
            let multipart = Multipart::from_request(request, &()).await.map_err(|e| {
                body_error(e.status(), "Malformed multipart body", e.body_text(), max_file_size)
            })?;
            Ok(RawUpload::Multipart(FormFields::read(multipart, max_file_size).await?))
        }
        ContentKind::Json => {
            let body = Bytes::from_request(request, &()).await.map_err(|e| {
                body_error(e.status(), "Failed to read request body", e.body_text(), max_file_size)
            })?;
            Ok(RawUpload::Json(body))
        }
    }
}

/// Body read failures are malformed uploads, except hitting the body limit.
fn body_error(status: StatusCode, message: &str, details: String, max_file_size: u64) -> OcrError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return OcrError::file_too_large(max_file_size, None);
    }
    OcrError::InvalidFile {
        message: message.to_string(),
        details: Some(details),
    }
}

/// Read and normalize a request. `forced` is the task bound to an alias endpoint.
pub async fn parse(
    request: Request,
    forced: Option<TaskType>,
    config: &OcrConfig,
) -> Result<ParsedInput, OcrError> {
    let raw = read_upload(request, config.max_file_size()).await?;
    normalize(raw, forced)
}

pub fn normalize(raw: RawUpload, forced: Option<TaskType>) -> Result<ParsedInput, OcrError> {
    match raw {
        RawUpload::Multipart(form) => from_form(&form, forced),
        RawUpload::Json(body) => from_json(&body, forced),
    }
}

fn from_form(form: &FormFields, forced: Option<TaskType>) -> Result<ParsedInput, OcrError> {
    let part = form.first_file(IMAGE_FIELD).ok_or_else(|| {
        OcrError::invalid_file(format!("Multipart field '{}' must contain a file", IMAGE_FIELD))
    })?;
    if part.bytes.is_empty() {
        return Err(OcrError::invalid_file("Uploaded file is empty"));
    }

    let task_type = resolve_task(forced, form.first_text("taskType").as_deref())?;
    let filename = non_blank(part.filename.as_deref()).unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    debug!(
        "Multipart upload: {} ({} bytes, declared {:?})",
        filename,
        part.bytes.len(),
        part.content_type
    );

    Ok(ParsedInput {
        content: part.bytes.clone(),
        filename,
        task_type,
        custom_prompt: form.first_text("prompt"),
        target_text: form.first_text("text"),
        declared_mime_type: part.content_type.clone(),
    })
}

/// JSON upload body. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonUpload {
    image: Option<String>,
    filename: Option<String>,
    prompt: Option<String>,
    text: Option<String>,
    task_type: Option<String>,
}

fn from_json(body: &[u8], forced: Option<TaskType>) -> Result<ParsedInput, OcrError> {
    let upload: JsonUpload = serde_json::from_slice(body).map_err(|e| OcrError::InvalidJson {
        details: e.to_string(),
    })?;

    let image = non_blank(upload.image.as_deref()).ok_or(OcrError::MissingImage)?;
    let task_type = resolve_task(forced, non_blank(upload.task_type.as_deref()).as_deref())?;

    let decoded = encoder::from_base64(&image).map_err(|e| OcrError::InvalidFile {
        message: "Image is not valid base64".to_string(),
        details: Some(e.to_string()),
    })?;
    if decoded.bytes.is_empty() {
        return Err(OcrError::invalid_file("Decoded image is empty"));
    }

    let filename = non_blank(upload.filename.as_deref()).unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    debug!(
        "JSON upload: {} ({} bytes decoded)",
        filename,
        decoded.bytes.len()
    );

    Ok(ParsedInput {
        content: Bytes::from(decoded.bytes),
        filename,
        task_type,
        custom_prompt: non_blank(upload.prompt.as_deref()),
        target_text: non_blank(upload.text.as_deref()),
        declared_mime_type: decoded.mime_type,
    })
}

/// A forced task always wins; otherwise the declared one must be a known id.
pub fn resolve_task(forced: Option<TaskType>, declared: Option<&str>) -> Result<TaskType, OcrError> {
    if let Some(task) = forced {
        return Ok(task);
    }

    let declared = declared.ok_or(OcrError::MissingTaskType)?;
    TaskType::from_id(declared).ok_or_else(|| OcrError::InvalidTaskType(declared.to_string()))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
