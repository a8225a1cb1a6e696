// HTTP routes: health, version, stats history and live sample under /api

mod auth;
mod http;

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::cors::{Any, CorsLayer};

use crate::collector::SampleSource;
use crate::history::TieredHistory;
use crate::store::PointStore;

pub(crate) struct AppState<S, C> {
    pub(crate) history: TieredHistory<S>,
    pub(crate) source: Option<Arc<C>>,
}

impl<S, C> Clone for AppState<S, C> {
    fn clone(&self) -> Self {
        Self {
            history: self.history.clone(),
            source: self.source.clone(),
        }
    }
}

/// `api_token` None leaves /api open.
pub fn app<S: PointStore, C: SampleSource>(
    history: TieredHistory<S>,
    source: Option<Arc<C>>,
    api_token: Option<String>,
) -> Router {
    let state = AppState { history, source };
    let token: Option<Arc<str>> = api_token.map(Arc::from);

    let api = Router::new()
        .route("/stats/history", get(http::history_handler::<S, C>)) // GET /api/stats/history
        .route("/stats/live", get(http::live_handler::<S, C>)) // GET /api/stats/live
        .route_layer(middleware::from_fn_with_state(token, auth::require_token));

    Router::new()
        .route("/", get(|| async { "statsrollup: ok" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .nest("/api", api)
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
