//! Response envelope returned by every OCR endpoint.

use crate::tasks::TaskType;
use serde::Serialize;

/// Uniform success/error wrapper. Exactly one of `data`/`error` is set.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ResponseEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Payload of a successful OCR response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrData {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<serde_json::Value>,
    /// Upstream call duration in milliseconds, two decimals.
    pub processing_time: f64,
    pub model: String,
    pub task_type: TaskType,
    pub prompt_used: String,
    pub filename: String,
}

/// Round a millisecond duration to two decimal places.
pub fn round_millis(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
