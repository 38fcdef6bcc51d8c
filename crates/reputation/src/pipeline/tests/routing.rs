use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::pipeline::repository::EventLog;
use crate::pipeline::router::pipeline_router;

async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

fn json_request(method: &str, uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request builds")
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn process_endpoint_accepts_a_known_event() {
    let harness = harness();
    harness
        .log
        .append(gained("evt-1", "ada", 60, midday()))
        .expect("append");
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/reputation/events",
            json!({
                "event_id": "evt-1",
                "event_type": "gained",
                "user_id": "ada",
            }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "accepted");
}

#[tokio::test]
async fn process_endpoint_accepts_unknown_types_as_noops() {
    let harness = harness();
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/reputation/events",
            json!({
                "event_id": "evt-1",
                "event_type": "mystery",
                "user_id": "ada",
            }),
        ))
        .await
        .expect("router responds");

    // Unknown types must never poison the queue.
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn summary_endpoint_returns_404_for_unseen_users() {
    let harness = harness();
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(empty_request("GET", "/api/v1/reputation/users/ghost"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert_eq!(body["user_id"], "ghost");
}

#[tokio::test]
async fn summary_endpoint_serves_the_stored_view() {
    let harness = harness();
    harness
        .log
        .append(gained("evt-1", "ada", 60, midday()))
        .expect("append");
    harness
        .processor
        .process(
            &crate::pipeline::domain::EventId("evt-1".to_string()),
            "gained",
            &crate::pipeline::domain::UserId("ada".to_string()),
            &no_metadata(),
        )
        .expect("processing succeeds");
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(empty_request("GET", "/api/v1/reputation/users/ada"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total_score"], 60);
    assert_eq!(body["level"], "Regular");
}

#[tokio::test]
async fn leaderboard_endpoint_rejects_unknown_kinds() {
    let harness = harness();
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(empty_request(
            "GET",
            "/api/v1/reputation/leaderboards/fortnightly",
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn leaderboard_endpoint_serves_rankings_for_a_date() {
    let harness = harness();
    harness
        .log
        .append(gained("evt-1", "ada", 60, midday()))
        .expect("append");
    harness
        .log
        .append(gained("evt-2", "bob", 90, midday()))
        .expect("append");
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(empty_request(
            "GET",
            "/api/v1/reputation/leaderboards/daily?date=2026-03-10",
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total_participants"], 2);
    assert_eq!(body["rankings"][0]["user_id"], "bob");
    assert_eq!(body["rankings"][0]["rank"], 1);
}

#[tokio::test]
async fn daily_analytics_endpoint_builds_the_snapshot() {
    let harness = harness();
    harness
        .log
        .append(gained("evt-1", "ada", 60, midday()))
        .expect("append");
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(empty_request(
            "POST",
            "/api/v1/reputation/analytics/daily?date=2026-03-10",
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total_users"], 1);
    assert_eq!(body["snapshot_date"], "2026-03-10");
}

#[tokio::test]
async fn user_analytics_refresh_returns_the_updated_snapshot() {
    let harness = harness();
    harness
        .log
        .append(gained("evt-1", "ada", 60, midday()))
        .expect("append");
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(empty_request(
            "POST",
            "/api/v1/reputation/users/ada/analytics/refresh",
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["total_users"], 1);
}

#[tokio::test]
async fn health_endpoint_reports_pipeline_counters() {
    let harness = harness();
    let router = pipeline_router(harness.processor.clone());

    let response = router
        .oneshot(empty_request("GET", "/api/v1/reputation/health"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["events_processed"], 0);
}
