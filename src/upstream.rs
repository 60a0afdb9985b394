//! Chat-completion client for the vision-language OCR API.

use crate::config::OcrConfig;
use crate::encoder::PreparedFile;
use crate::error::OcrError;
use anyhow::Context;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Outcome of a successful upstream call. `text` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    pub text: String,
    pub confidence: Option<Value>,
    pub model: String,
}

/// Anything that can run a prompt against an image.
#[async_trait::async_trait]
pub trait VisionBackend: Send + Sync {
    async fn invoke(
        &self,
        file: &PreparedFile,
        prompt: &str,
        config: &OcrConfig,
    ) -> Result<OcrResult, OcrError>;
}

/// Client for OpenAI-compatible chat completion endpoints.
#[derive(Clone, Default)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl VisionBackend for UpstreamClient {
    async fn invoke(
        &self,
        file: &PreparedFile,
        prompt: &str,
        config: &OcrConfig,
    ) -> Result<OcrResult, OcrError> {
        let api_key = config.api_key().ok_or(OcrError::MissingApiKey)?;
        let model = config.model();
        let url = endpoint_url(config.base_url());

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![Message::user_with_image(file.data_url(), prompt)],
            temperature: 0.0,
        };

        debug!(
            "Sending {} ({}, {} base64 chars) to {} with model={}",
            file.filename,
            file.mime_type,
            file.base64_content.len(),
            url,
            model
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OCR API")?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("Failed to read OCR API response body")?;

        let result = parse_completion(status.as_u16(), status.canonical_reason(), &raw, model)?;
        info!(
            "OCR API returned {} chars for {} (model={})",
            result.text.len(),
            file.filename,
            result.model
        );
        Ok(result)
    }
}

/// Join the base URL and the completions path, dropping trailing slashes.
pub fn endpoint_url(base_url: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), CHAT_COMPLETIONS_PATH)
}

/// Interpret a raw upstream response.
///
/// A body that is not JSON is treated as an absent payload, not as an error.
pub fn parse_completion(
    status: u16,
    reason: Option<&str>,
    raw: &str,
    requested_model: &str,
) -> Result<OcrResult, OcrError> {
    let payload: Option<Value> = serde_json::from_str(raw).ok();

    if !(200..300).contains(&status) {
        let message = payload
            .as_ref()
            .and_then(error_message)
            .unwrap_or_else(|| match reason {
                Some(reason) => format!("OCR API request failed with status {} {}", status, reason),
                None => format!("OCR API request failed with status {}", status),
            });
        warn!("OCR API error ({}): {}", status, message);
        return Err(OcrError::Upstream {
            status,
            message,
            details: raw.to_string(),
        });
    }

    let Some(choice) = payload
        .as_ref()
        .and_then(|p| p.get("choices"))
        .and_then(|c| c.get(0))
    else {
        return Err(OcrError::EmptyResponse(
            "OCR API returned no choices".to_string(),
        ));
    };

    if let Some(usage) = payload.as_ref().and_then(|p| p.get("usage")) {
        debug!("OCR API usage: {}", usage);
    }

    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .map(extract_content)
        .unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(OcrError::EmptyResponse(
            "OCR API returned empty text".to_string(),
        ));
    }

    let confidence = choice
        .get("confidence")
        .or_else(|| payload.as_ref().and_then(|p| p.get("confidence")))
        .filter(|c| !c.is_null())
        .cloned();

    let model = payload
        .as_ref()
        .and_then(|p| p.get("model"))
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(requested_model)
        .to_string();

    Ok(OcrResult {
        text: text.to_string(),
        confidence,
        model,
    })
}

/// Message content is either a string or a list of parts; text parts are joined by newlines.
fn extract_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error");
    error
        .and_then(|e| e.get("message"))
        .or_else(|| error.filter(|e| e.is_string()))
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: Role,
    content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ImageUrl {
    url: String,
}

impl Message {
    /// User message with one image reference followed by the prompt.
    fn user_with_image(data_url: String, prompt: &str) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
                ContentPart::Text {
                    text: prompt.to_string(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::json;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    fn ok(body: Value) -> Result<OcrResult, OcrError> {
        parse_completion(200, Some("OK"), &body.to_string(), "requested-model")
    }

    #[test]
    fn test_endpoint_url_trims_trailing_slash() {
        assert_eq!(
            endpoint_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint_url("http://localhost:8000/v1"),
            "http://localhost:8000/v1/chat/completions"
        );
    }

    #[test]
    fn test_empty_choices() {
        let err = ok(json!({ "choices": [] })).unwrap_err();
        assert_eq!(err.code(), "EMPTY_RESPONSE");
        assert_eq!(err.status(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_empty_content() {
        let err = ok(json!({ "choices": [{ "message": { "content": "" } }] })).unwrap_err();
        assert!(matches!(err, OcrError::EmptyResponse(_)));

        let err = ok(json!({ "choices": [{ "message": { "content": "  \n " } }] })).unwrap_err();
        assert!(matches!(err, OcrError::EmptyResponse(_)));

        let err = ok(json!({ "choices": [{ "message": {} }] })).unwrap_err();
        assert!(matches!(err, OcrError::EmptyResponse(_)));
    }

    #[test]
    fn test_content_parts_joined() {
        let result = ok(json!({
            "choices": [{ "message": { "content": [{ "text": "A" }, { "text": "B" }] } }]
        }))
        .unwrap();
        assert_eq!(result.text, "A\nB");
        assert_eq!(result.model, "requested-model");
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn test_non_text_parts_skipped() {
        let result = ok(json!({
            "choices": [{ "message": { "content": [
                { "type": "text", "text": " A" },
                { "type": "image_url", "image_url": { "url": "x" } },
                { "text": 5 },
                { "type": "text", "text": "B " }
            ] } }]
        }))
        .unwrap();
        assert_eq!(result.text, "A\nB");
    }

    #[test]
    fn test_model_and_confidence_passthrough() {
        let result = ok(json!({
            "model": "served-model",
            "choices": [{ "message": { "content": " text " }, "confidence": 0.93 }]
        }))
        .unwrap();
        assert_eq!(result.text, "text");
        assert_eq!(result.model, "served-model");
        assert_eq!(result.confidence, Some(json!(0.93)));
    }

    #[test]
    fn test_malformed_success_body_is_empty_response() {
        let err = parse_completion(200, Some("OK"), "<html>oops</html>", "m").unwrap_err();
        assert_eq!(err.code(), "EMPTY_RESPONSE");
    }

    #[test]
    fn test_upstream_error_message_sources() {
        let err = parse_completion(
            401,
            Some("Unauthorized"),
            r#"{"error":{"message":"Invalid token"}}"#,
            "m",
        )
        .unwrap_err();
        match err {
            OcrError::Upstream {
                status,
                message,
                details,
            } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid token");
                assert_eq!(details, r#"{"error":{"message":"Invalid token"}}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = parse_completion(400, None, r#"{"message":"bad model"}"#, "m").unwrap_err();
        assert_eq!(err.to_string(), "bad model");

        let err = parse_completion(503, Some("Service Unavailable"), "upstream down", "m").unwrap_err();
        assert_eq!(
            err.to_string(),
            "OCR API request failed with status 503 Service Unavailable"
        );
        assert_eq!(err.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = UpstreamClient::default();
        let file = PreparedFile::new(b"png", "a.png", None);
        let err = client
            .invoke(&file, "prompt", &OcrConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_connection_failure_is_internal_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = OcrConfig {
            api_key: Some("secret".into()),
            base_url: Some(format!("http://{}/v1", addr)),
            ..Default::default()
        };
        let file = PreparedFile::new(b"png", "a.png", None);

        let err = UpstreamClient::default()
            .invoke(&file, "prompt", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Internal(_)));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        let body = err.to_body();
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.message, crate::error::INTERNAL_ERROR_MESSAGE);
        assert!(body.details.is_none());
    }

    /// Serve a canned completion and record what the client sent.
    async fn make_mock_server(
        reply: Value,
    ) -> (SocketAddr, Arc<Mutex<Option<(String, Value)>>>) {
        let seen = Arc::new(Mutex::new(None));
        let recorder = seen.clone();

        let app = Router::new().route(
            "/v1/chat/completions",
            post(
                move |headers: axum::http::HeaderMap, Json(body): Json<Value>| {
                    let recorder = recorder.clone();
                    let reply = reply.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *recorder.lock().unwrap() = Some((auth, body));
                        Json(reply)
                    }
                },
            ),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, seen)
    }

    #[tokio::test]
    async fn test_invoke_sends_chat_completion() {
        let (addr, seen) = make_mock_server(json!({
            "model": "mock-ocr",
            "choices": [{ "message": { "content": "# Title" } }]
        }))
        .await;

        let config = OcrConfig {
            api_key: Some("secret".into()),
            base_url: Some(format!("http://{}/v1/", addr)),
            model: Some("my-model".into()),
            ..Default::default()
        };
        let file = PreparedFile::new(b"hi", "doc.png", None);

        let result = UpstreamClient::default()
            .invoke(&file, "Convert.", &config)
            .await
            .unwrap();
        assert_eq!(result.text, "# Title");
        assert_eq!(result.model, "mock-ocr");

        let (auth, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(auth, "Bearer secret");
        assert_eq!(
            body,
            json!({
                "model": "my-model",
                "temperature": 0.0,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": "data:image/png;base64,aGk=" } },
                        { "type": "text", "text": "Convert." }
                    ]
                }]
            })
        );
    }
}
