// Integration tests: HTTP endpoints

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use common::*;
use statsrollup::history::TieredHistory;
use statsrollup::routes;
use statsrollup::store::{InMemoryStore, PointStore};
use statsrollup::tiers::{TierCatalog, default_specs};

fn rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap()
        .to_rfc3339()
}

fn test_history(store: Arc<InMemoryStore>) -> TieredHistory<InMemoryStore> {
    let catalog = Arc::new(TierCatalog::from_specs(&default_specs()).unwrap());
    TieredHistory::new(catalog, store, Default::default())
}

fn test_server(
    store: Arc<InMemoryStore>,
    source: Option<FakeSource>,
    token: Option<&str>,
) -> TestServer {
    let app = routes::app(
        test_history(store),
        source.map(Arc::new),
        token.map(str::to_string),
    );
    TestServer::try_new(app).unwrap()
}

#[tokio::test]
async fn test_root_endpoint() {
    let server = test_server(Arc::new(InMemoryStore::new()), None, None);
    let response = server.get("/").await;
    response.assert_status_ok();
    response.assert_text("statsrollup: ok");
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = test_server(Arc::new(InMemoryStore::new()), None, None);
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("statsrollup")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_history_returns_recent_raw_points() {
    let store = Arc::new(InMemoryStore::new());
    let now = Utc::now().timestamp_millis();
    store
        .create("stats_realtime", &raw_point(now - 2 * MIN, &[("web", 1.0)]))
        .await
        .unwrap();
    store
        .create("stats_realtime", &raw_point(now - MIN, &[("web", 2.0)]))
        .await
        .unwrap();
    let server = test_server(store, None, None);

    let response = server
        .get("/api/stats/history")
        .add_query_param("start", rfc3339(now - 10 * MIN))
        .add_query_param("end", rfc3339(now))
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    let points = json["points"].as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0]["metadata"]["aggregationType"], "raw");
    assert_eq!(points[1]["entities"]["web"]["cpuPercent"], 2.0);
}

#[tokio::test]
async fn test_history_rejects_bad_window() {
    let server = test_server(Arc::new(InMemoryStore::new()), None, None);
    let now = Utc::now().timestamp_millis();

    let inverted = server
        .get("/api/stats/history")
        .add_query_param("start", rfc3339(now))
        .add_query_param("end", rfc3339(now - MIN))
        .await;
    inverted.assert_status_bad_request();

    let garbage = server
        .get("/api/stats/history")
        .add_query_param("start", "yesterday")
        .await;
    garbage.assert_status_bad_request();
    let json: serde_json::Value = garbage.json();
    assert!(json["error"].as_str().unwrap().contains("start"));
}

#[tokio::test]
async fn test_live_returns_fresh_sample_without_persisting() {
    let store = Arc::new(InMemoryStore::new());
    let source = FakeSource::new(entities(&[("web", 42.0)]));
    let server = test_server(store.clone(), Some(source), None);

    let response = server.get("/api/stats/live").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["entities"]["web"]["cpuPercent"], 42.0);
    assert_eq!(store.calls().creates, 0);
}

#[tokio::test]
async fn test_live_without_collector_is_unavailable() {
    let server = test_server(Arc::new(InMemoryStore::new()), None, None);
    server
        .get("/api/stats/live")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_api_requires_bearer_token_when_configured() {
    let server = test_server(Arc::new(InMemoryStore::new()), None, Some("s3cret"));

    let missing = server.get("/api/stats/history").await;
    missing.assert_status_unauthorized();
    missing.assert_json(&serde_json::json!({ "error": "Please provide a valid token" }));

    let wrong = server
        .get("/api/stats/history")
        .authorization_bearer("nope")
        .await;
    wrong.assert_status_unauthorized();
    wrong.assert_json(&serde_json::json!({ "error": "Unauthorized" }));

    server
        .get("/api/stats/history")
        .authorization_bearer("s3cret")
        .await
        .assert_status_ok();

    // Health and version stay open.
    server.get("/version").await.assert_status_ok();
}
