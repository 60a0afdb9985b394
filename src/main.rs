//! Vision OCR - adapter between client uploads and a vision-language OCR API.

mod config;
mod encoder;
mod error;
mod handler;
mod input;
mod prompt;
mod schema;
mod tasks;
mod upstream;
mod validator;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    response::Json,
    routing::{get, post, MethodRouter},
    Router,
};
use config::OcrConfig;
use handler::AppState;
use std::sync::Arc;
use tasks::{TaskConfig, TaskType};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upstream::UpstreamClient;

/// Fixed-task endpoints. Each ignores any `taskType` in the request.
const ALIAS_ROUTES: [(&str, TaskType); 6] = [
    ("/api/ocr/document-markdown", TaskType::DocumentMarkdown),
    ("/api/ocr/general", TaskType::GeneralOcr),
    ("/api/ocr/free", TaskType::FreeOcr),
    ("/api/ocr/figure", TaskType::ParseFigure),
    ("/api/ocr/describe", TaskType::DescribeImage),
    ("/api/ocr/locate", TaskType::LocateText),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vision_ocr=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OcrConfig::from_env();
    if config.api_key().is_none() {
        warn!("OCR_API_KEY is not set; OCR requests will fail with MISSING_API_KEY");
    }
    info!(
        "OCR backend: {} (model={}, max file size={} bytes)",
        config.base_url(),
        config.model(),
        config.max_file_size()
    );

    let state = AppState {
        config: Arc::new(config),
        backend: Arc::new(UpstreamClient::new(reqwest::Client::new())),
    };
    let app = build_router(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let body_limit = state.config.body_limit();

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/tasks", get(list_tasks))
        .route("/api/ocr", ocr_route(None));

    for (path, task) in ALIAS_ROUTES {
        router = router.route(path, ocr_route(Some(task)));
    }

    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST route into the shared OCR handler, optionally bound to one task.
fn ocr_route(forced: Option<TaskType>) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, request: Request| {
        handler::handle(state, forced, request)
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List supported tasks and their prompt templates.
async fn list_tasks() -> Json<&'static [TaskConfig]> {
    Json(tasks::all())
}
