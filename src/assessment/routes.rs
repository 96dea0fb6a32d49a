//! REST endpoints driving the wizard for a UI client.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, WizardError};
use crate::export::MarkdownExporter;

use super::engine::WizardEngine;

/// Shared state for assessment routes.
#[derive(Clone)]
pub struct AssessmentRouteState {
    pub engine: Arc<Mutex<WizardEngine>>,
}

/// Build the assessment REST routes.
pub fn assessment_routes(state: AssessmentRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/catalog", get(get_catalog))
        .route("/api/assessment", get(get_view).delete(reset))
        .route("/api/assessment/next", post(next_step))
        .route("/api/assessment/previous", post(previous_step))
        .route("/api/assessment/save", post(save_progress))
        .route("/api/assessment/values/{id}/toggle", post(toggle_value))
        .route("/api/assessment/priorities/{index}/up", post(move_up))
        .route("/api/assessment/priorities/{index}/down", post(move_down))
        .route("/api/assessment/reflections/{id}", put(update_reflection))
        .route("/api/assessment/report", get(report))
        .with_state(state)
}

/// Error body: `{"error": "...", "kind": "...", "blockedBy": {...}}`.
struct ApiError(WizardError);

impl From<WizardError> for ApiError {
    fn from(e: WizardError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            WizardError::CapacityExceeded { .. } => (StatusCode::CONFLICT, "capacity_exceeded"),
            WizardError::InvalidStepTransition { .. } => {
                (StatusCode::CONFLICT, "invalid_step_transition")
            }
            WizardError::WrongStep { .. } => (StatusCode::CONFLICT, "wrong_step"),
            WizardError::UnknownValueId { .. } => (StatusCode::NOT_FOUND, "unknown_value_id"),
            WizardError::PersistenceFailed(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "persistence_failed")
            }
        };
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": kind,
            "blockedBy": self.0.blocker(),
        });
        (status, Json(body)).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "values-assessment"
    }))
}

/// GET /api/catalog
async fn get_catalog(State(state): State<AssessmentRouteState>) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    let values: Vec<_> = engine.catalog().iter().cloned().collect();
    Json(values)
}

/// GET /api/assessment
///
/// Current state plus the guard results the UI renders from.
async fn get_view(State(state): State<AssessmentRouteState>) -> impl IntoResponse {
    Json(state.engine.lock().await.view())
}

/// DELETE /api/assessment
async fn reset(State(state): State<AssessmentRouteState>) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    engine.reset().await?;
    Ok(Json(engine.view()).into_response())
}

/// POST /api/assessment/next
async fn next_step(State(state): State<AssessmentRouteState>) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    engine.next_step().await?;
    Ok(Json(engine.view()).into_response())
}

/// POST /api/assessment/previous
async fn previous_step(State(state): State<AssessmentRouteState>) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    engine.previous_step().await?;
    Ok(Json(engine.view()).into_response())
}

/// POST /api/assessment/save
async fn save_progress(State(state): State<AssessmentRouteState>) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    engine.save_progress().await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// POST /api/assessment/values/{id}/toggle
async fn toggle_value(
    State(state): State<AssessmentRouteState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    let selected = engine.toggle_value(&id).await?;
    Ok(Json(serde_json::json!({
        "selected": selected,
        "view": engine.view(),
    }))
    .into_response())
}

/// POST /api/assessment/priorities/{index}/up
async fn move_up(
    State(state): State<AssessmentRouteState>,
    Path(index): Path<usize>,
) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    let moved = engine.move_value_up(index).await?;
    Ok(Json(serde_json::json!({ "moved": moved, "view": engine.view() })).into_response())
}

/// POST /api/assessment/priorities/{index}/down
async fn move_down(
    State(state): State<AssessmentRouteState>,
    Path(index): Path<usize>,
) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    let moved = engine.move_value_down(index).await?;
    Ok(Json(serde_json::json!({ "moved": moved, "view": engine.view() })).into_response())
}

#[derive(Deserialize)]
struct ReflectionRequest {
    text: String,
}

/// PUT /api/assessment/reflections/{id}
async fn update_reflection(
    State(state): State<AssessmentRouteState>,
    Path(id): Path<String>,
    Json(body): Json<ReflectionRequest>,
) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    let update = engine.update_reflection(&id, &body.text).await?;
    Ok(Json(serde_json::json!({ "update": update, "view": engine.view() })).into_response())
}

/// GET /api/assessment/report
///
/// Markdown summary of a finished assessment. Archives it on first export.
async fn report(State(state): State<AssessmentRouteState>) -> Result<Response, ApiError> {
    let mut engine = state.engine.lock().await;
    match engine.finalize(&MarkdownExporter).await {
        Ok(markdown) => Ok((
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            markdown,
        )
            .into_response()),
        Err(Error::Wizard(e)) => Err(e.into()),
        Err(e) => {
            warn!("Report export failed: {}", e);
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string(), "kind": "export_failed" })),
            )
                .into_response())
        }
    }
}
