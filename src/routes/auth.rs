// Bearer token check for /api routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::http::ApiError;

pub(super) async fn require_token(
    State(token): State<Option<Arc<str>>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = token else {
        return next.run(req).await;
    };
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    match presented {
        None => ApiError::Unauthorized("Please provide a valid token").into_response(),
        Some(t) if t != &*expected => ApiError::Unauthorized("Unauthorized").into_response(),
        Some(_) => next.run(req).await,
    }
}
