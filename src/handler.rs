//! Request orchestration: one linear pass from upload to response envelope.

use crate::config::OcrConfig;
use crate::encoder::{resolve_mime_type, PreparedFile};
use crate::error::OcrError;
use crate::input;
use crate::prompt::build_prompt;
use crate::schema::{round_millis, OcrData, ResponseEnvelope};
use crate::tasks::TaskType;
use crate::upstream::VisionBackend;
use crate::validator::validate_file;
use axum::extract::Request;
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<OcrConfig>,
    pub backend: Arc<dyn VisionBackend>,
}

/// Shared handler behind every OCR endpoint. `forced` is set for alias routes.
pub async fn handle(state: AppState, forced: Option<TaskType>, request: Request) -> Response {
    let span = info_span!(
        "ocr_request",
        request_id = %Uuid::new_v4(),
        forced_task = forced.map(TaskType::id).unwrap_or("-"),
    );

    async move {
        match process(state.backend.as_ref(), &state.config, forced, request).await {
            Ok(data) => Json(ResponseEnvelope::success(data)).into_response(),
            Err(e) => {
                info!("OCR request failed: {} ({})", e.code(), e.status());
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

/// normalize → prompt → validate → encode → upstream. The first failure ends the request.
pub async fn process(
    backend: &dyn VisionBackend,
    config: &OcrConfig,
    forced: Option<TaskType>,
    request: Request,
) -> Result<OcrData, OcrError> {
    let input = input::parse(request, forced, config).await?;
    let task = input.task_type.config();

    let prompt = build_prompt(
        task,
        input.custom_prompt.as_deref(),
        input.target_text.as_deref(),
    )?;

    let mime_type = resolve_mime_type(
        input.declared_mime_type.as_deref(),
        &input.filename,
        &input.content,
    );
    validate_file(&input.content, &input.filename, &mime_type, config)?;

    let file = PreparedFile::new(&input.content, &input.filename, Some(&mime_type));

    let started = Instant::now();
    let result = backend.invoke(&file, &prompt, config).await?;
    let processing_time = round_millis(started.elapsed().as_secs_f64() * 1000.0);

    info!(
        "Processed {} as {} in {} ms",
        file.filename, input.task_type, processing_time
    );

    Ok(OcrData {
        text: result.text,
        confidence: result.confidence,
        processing_time,
        model: result.model,
        task_type: input.task_type,
        prompt_used: prompt,
        filename: file.filename,
    })
}
