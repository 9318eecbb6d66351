use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::cascade::{SelectionError, Snapshot};
use crate::location::Level;

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub(super) struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

impl From<SelectionError> for ApiError {
    fn from(e: SelectionError) -> Self {
        let status = match e {
            SelectionError::MissingParent { .. } => StatusCode::CONFLICT,
            SelectionError::ControllerClosed => StatusCode::SERVICE_UNAVAILABLE,
        };
        api_error(status, e.to_string())
    }
}

fn parse_level(raw: &str) -> Result<Level, ApiError> {
    raw.parse().map_err(|e: String| api_error(StatusCode::NOT_FOUND, e))
}

// ─── GET /health ─────────────────────────────────────────────────

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

// ─── GET /api/cascade ────────────────────────────────────────────

pub async fn cascade(State(state): State<Arc<AppState>>) -> Json<Snapshot> {
    Json(state.cascade.snapshot())
}

// ─── POST /api/cascade/{level} ───────────────────────────────────

#[derive(Deserialize)]
pub struct SelectBody {
    #[serde(default)]
    pub value: String,
}

pub async fn select(
    State(state): State<Arc<AppState>>,
    Path(level): Path<String>,
    Json(body): Json<SelectBody>,
) -> Result<Json<Snapshot>, ApiError> {
    let start = Instant::now();
    let level = parse_level(&level)?;

    let snapshot = state.cascade.select(level, body.value.clone()).await?;

    tracing::info!(
        %level,
        value = %body.value,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "POST /api/cascade/{}",
        level
    );
    Ok(Json(snapshot))
}

// ─── POST /api/cascade/retry/{level} ─────────────────────────────

pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(level): Path<String>,
) -> Result<Json<Snapshot>, ApiError> {
    let level = parse_level(&level)?;
    let snapshot = state.cascade.retry(level).await?;
    tracing::info!(%level, "POST /api/cascade/retry/{}", level);
    Ok(Json(snapshot))
}
