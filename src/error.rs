//! Error taxonomy for the OCR pipeline and its HTTP mapping.

use crate::schema::{ErrorBody, ResponseEnvelope};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tracing::error;

/// Message returned to callers for failures we did not anticipate.
pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred while processing the request";

/// Every failure a request can end in.
///
/// Domain variants are raised where they are detected and reach the HTTP
/// boundary unchanged. Anything else is wrapped in [`OcrError::Internal`].
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("{message}")]
    InvalidFile {
        message: String,
        details: Option<String>,
    },

    #[error("Invalid JSON body")]
    InvalidJson { details: String },

    #[error("Request body is missing base64 image data")]
    MissingImage,

    #[error("taskType is required")]
    MissingTaskType,

    #[error("Unknown taskType: {0}")]
    InvalidTaskType(String),

    #[error("Task {0} requires target text in the 'text' field")]
    MissingTargetText(String),

    #[error("File exceeds maximum size of {limit_mb} MB")]
    FileTooLarge {
        limit_mb: u64,
        size: Option<usize>,
        limit: u64,
    },

    #[error("Unsupported file format: {mime_type}")]
    UnsupportedFormat { mime_type: String, filename: String },

    #[error("OCR API key is not configured")]
    MissingApiKey,

    #[error("{message}")]
    Upstream {
        status: u16,
        message: String,
        details: String,
    },

    #[error("{0}")]
    EmptyResponse(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OcrError {
    pub fn invalid_file(message: impl Into<String>) -> Self {
        Self::InvalidFile {
            message: message.into(),
            details: None,
        }
    }

    /// Upload larger than `limit` bytes. `size` is unknown when the body was cut off.
    pub fn file_too_large(limit: u64, size: Option<usize>) -> Self {
        Self::FileTooLarge {
            limit_mb: limit.div_ceil(1024 * 1024).max(1),
            size,
            limit,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InvalidFile { .. }
            | Self::InvalidJson { .. }
            | Self::MissingImage
            | Self::MissingTaskType
            | Self::InvalidTaskType(_)
            | Self::MissingTargetText(_)
            | Self::UnsupportedFormat { .. } => StatusCode::BAD_REQUEST,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MissingApiKey | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::EmptyResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            Self::InvalidFile { .. } => "INVALID_FILE",
            Self::InvalidJson { .. } => "INVALID_JSON",
            Self::MissingImage => "MISSING_IMAGE",
            Self::MissingTaskType => "MISSING_TASK_TYPE",
            Self::InvalidTaskType(_) => "INVALID_TASK_TYPE",
            Self::MissingTargetText(_) => "MISSING_TARGET_TEXT",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::MissingApiKey => "MISSING_API_KEY",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::EmptyResponse(_) => "EMPTY_RESPONSE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        use serde_json::json;

        match self {
            Self::InvalidFile { details, .. } => details.clone().map(Into::into),
            Self::InvalidJson { details } => Some(details.clone().into()),
            Self::InvalidTaskType(_) => Some(json!({
                "allowed": crate::tasks::TaskType::ALL.map(|t| t.id()),
            })),
            Self::FileTooLarge { size, limit, .. } => {
                let mut details = json!({ "maxSize": limit });
                if let Some(size) = size {
                    details["size"] = json!(size);
                }
                Some(details)
            }
            Self::UnsupportedFormat { filename, .. } => Some(json!({ "filename": filename })),
            Self::Upstream { details, .. } if !details.is_empty() => Some(details.clone().into()),
            _ => None,
        }
    }

    /// Convert into the error envelope body. Internal detail never leaves the process.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        };

        ErrorBody {
            code: self.code().to_string(),
            message,
            details: self.details(),
        }
    }
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref e) = self {
            error!("Unhandled error while processing OCR request: {:#}", e);
        }

        let status = self.status();
        let envelope: ResponseEnvelope<()> = ResponseEnvelope::failure(self.to_body());
        (status, Json(envelope)).into_response()
    }
}
