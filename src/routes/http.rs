// GET handlers: version, stats history, live sample

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::AppState;
use crate::collector::SampleSource;
use crate::models::{EntityMap, TimeSeriesPoint, TimeWindow};
use crate::query::QueryError;
use crate::scheduler::now_ms;
use crate::store::PointStore;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// History window when the request names no start.
const DEFAULT_HISTORY_MS: i64 = 3_600_000;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidWindow { .. } => ApiError::BadRequest(e.to_string()),
            QueryError::Store(e) => {
                warn!(error = %e, "history query failed");
                ApiError::Internal("history query failed".into())
            }
        }
    }
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryParams {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct HistoryResponse {
    start: i64,
    end: i64,
    points: Vec<TimeSeriesPoint>,
}

fn parse_instant(field: &str, value: &str) -> Result<i64, ApiError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| ApiError::BadRequest(format!("{field}: {e}")))
}

/// GET /api/stats/history?start=&end=: RFC 3339 bounds; defaults to the last hour.
pub(super) async fn history_handler<S: PointStore, C: SampleSource>(
    State(state): State<AppState<S, C>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let now = now_ms();
    let end = match params.end.as_deref() {
        Some(v) => parse_instant("end", v)?,
        None => now,
    };
    let start = match params.start.as_deref() {
        Some(v) => parse_instant("start", v)?,
        None => end - DEFAULT_HISTORY_MS,
    };
    let points = state
        .history
        .query(TimeWindow::new(start, end), now)
        .await?;
    Ok(Json(HistoryResponse { start, end, points }))
}

#[derive(Debug, Serialize)]
pub(super) struct LiveResponse {
    timestamp: i64,
    entities: EntityMap,
}

/// GET /api/stats/live: one fresh sample, not persisted.
pub(super) async fn live_handler<S: PointStore, C: SampleSource>(
    State(state): State<AppState<S, C>>,
) -> Result<Json<LiveResponse>, ApiError> {
    let Some(source) = state.source.as_ref() else {
        return Err(ApiError::Unavailable("collector disabled".into()));
    };
    let entities = source.collect().await.map_err(|e| {
        warn!(error = %e, "live sample failed");
        ApiError::Unavailable("stats source unavailable".into())
    })?;
    Ok(Json(LiveResponse {
        timestamp: now_ms(),
        entities,
    }))
}
