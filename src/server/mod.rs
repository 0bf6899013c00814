use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::resolver::{resolve, VideoId};
use crate::transcribe::TranscriptPipeline;
use crate::{ClassifiedError, Result};

const HOME_MESSAGE: &str =
    "YouTube Transcript Processor API is running. Use POST /process_youtube to process a YouTube URL.";

/// Shared, read-only request state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<TranscriptPipeline>,
    request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(pipeline: Arc<TranscriptPipeline>, request_timeout: Option<Duration>) -> Self {
        Self {
            pipeline,
            request_timeout,
        }
    }
}

/// Body of `POST /process_youtube`
#[derive(Debug, Deserialize)]
pub struct TranscriptRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub improved_transcript: String,
}

/// JSON error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ClassifiedError> for ApiError {
    fn from(err: ClassifiedError) -> Self {
        Self {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// HTTP status for each classified failure
pub fn status_for(err: &ClassifiedError) -> StatusCode {
    match err {
        ClassifiedError::InvalidUrl | ClassifiedError::TranscriptsDisabled => StatusCode::BAD_REQUEST,
        ClassifiedError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        ClassifiedError::TranscriptFetchFailed { .. }
        | ClassifiedError::ImprovementFailed { .. }
        | ClassifiedError::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ClassifiedError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/process_youtube", post(process_youtube))
        .with_state(state)
}

/// Bind and serve until Ctrl+C
pub async fn serve(config: &Config) -> Result<()> {
    let pipeline = TranscriptPipeline::from_config(config)?;
    tracing::info!("Improvement policy: {}", pipeline.policy());

    let state = AppState::new(Arc::new(pipeline), config.request_timeout());
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn home() -> &'static str {
    HOME_MESSAGE
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn process_youtube(
    State(state): State<AppState>,
    payload: std::result::Result<Json<TranscriptRequest>, JsonRejection>,
) -> ApiResult<Json<TranscriptResponse>> {
    let span = tracing::info_span!("request", id = %Uuid::new_v4());
    handle_process(state, payload).instrument(span).await
}

async fn handle_process(
    state: AppState,
    payload: std::result::Result<Json<TranscriptRequest>, JsonRejection>,
) -> ApiResult<Json<TranscriptResponse>> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        ApiError::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    })?;

    let url = request
        .url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::bad_request("No YouTube URL provided"))?;

    tracing::info!("Processing {}", url);

    let video_id = resolve(&url).ok_or_else(|| {
        tracing::warn!("Could not find a video id in {}", url);
        ClassifiedError::InvalidUrl
    })?;

    let improved_transcript = run_isolated(&state, video_id).await.map_err(|err| {
        tracing::warn!("Request failed: {}", err);
        ApiError::from(err)
    })?;

    tracing::info!("Request completed ({} chars)", improved_transcript.len());
    Ok(Json(TranscriptResponse { improved_transcript }))
}

/// Run the pipeline in its own task so a panic becomes a classified error.
///
/// The task is cancelled when the handler is dropped or the request timeout
/// elapses.
async fn run_isolated(state: &AppState, video_id: VideoId) -> std::result::Result<String, ClassifiedError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let pipeline = Arc::clone(&state.pipeline);
    let task_cancel = cancel.clone();
    let handle = tokio::spawn(
        async move { pipeline.run_with_cancel(&video_id, &task_cancel).await }.in_current_span(),
    );

    let joined = match state.request_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!("Request timed out after {:?}", timeout);
                cancel.cancel();
                return Err(ClassifiedError::Cancelled);
            }
        },
        None => handle.await,
    };

    joined.map_err(|err| ClassifiedError::Unexpected {
        message: if err.is_panic() {
            "transcript task panicked".to_string()
        } else {
            format!("transcript task failed: {}", err)
        },
    })?
}
