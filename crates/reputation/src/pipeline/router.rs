use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::analytics::AnalyticsError;
use super::domain::{EventId, LeaderboardKind, UserId};
use super::leaderboard::LeaderboardError;
use super::processor::EventProcessor;
use super::repository::{
    EventLog, LeaderboardStore, SnapshotStore, StoreError, SummaryStore,
};

/// Queue-delivery payload accepted by the process endpoint. `event_type` is a
/// free string on purpose: unknown types must reach the processor and be
/// dropped there, not rejected at the transport.
#[derive(Debug, Deserialize)]
pub struct ProcessEventRequest {
    pub event_id: String,
    pub event_type: String,
    pub user_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DateQuery {
    #[serde(default)]
    date: Option<NaiveDate>,
}

/// Router builder exposing the pipeline's inbound interface.
pub fn pipeline_router<E, S, L, SS>(processor: Arc<EventProcessor<E, S, L, SS>>) -> Router
where
    E: EventLog + 'static,
    S: SummaryStore + 'static,
    L: LeaderboardStore + 'static,
    SS: SnapshotStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/reputation/events",
            post(process_event_handler::<E, S, L, SS>),
        )
        .route(
            "/api/v1/reputation/users/:user_id",
            get(summary_handler::<E, S, L, SS>),
        )
        .route(
            "/api/v1/reputation/users/:user_id/analytics/refresh",
            post(user_analytics_handler::<E, S, L, SS>),
        )
        .route(
            "/api/v1/reputation/leaderboards/:kind",
            get(leaderboard_handler::<E, S, L, SS>),
        )
        .route(
            "/api/v1/reputation/leaderboards/:kind/refresh",
            post(leaderboard_handler::<E, S, L, SS>),
        )
        .route(
            "/api/v1/reputation/analytics/daily",
            post(daily_analytics_handler::<E, S, L, SS>),
        )
        .route(
            "/api/v1/reputation/health",
            get(health_metrics_handler::<E, S, L, SS>),
        )
        .with_state(processor)
}

pub(crate) async fn process_event_handler<E, S, L, SS>(
    State(processor): State<Arc<EventProcessor<E, S, L, SS>>>,
    axum::Json(request): axum::Json<ProcessEventRequest>,
) -> Response
where
    E: EventLog + 'static,
    S: SummaryStore + 'static,
    L: LeaderboardStore + 'static,
    SS: SnapshotStore + 'static,
{
    let event_id = EventId(request.event_id);
    let user_id = UserId(request.user_id);

    match processor.process(&event_id, &request.event_type, &user_id, &request.metadata) {
        Ok(()) => {
            let payload = json!({ "status": "accepted", "event_id": event_id.0 });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(err) => {
            let status = if err.is_transient() {
                // Transient: the queue should redeliver.
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            let payload = json!({ "error": err.to_string(), "event_id": event_id.0 });
            (status, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn summary_handler<E, S, L, SS>(
    State(processor): State<Arc<EventProcessor<E, S, L, SS>>>,
    Path(user_id): Path<String>,
) -> Response
where
    E: EventLog + 'static,
    S: SummaryStore + 'static,
    L: LeaderboardStore + 'static,
    SS: SnapshotStore + 'static,
{
    let user = UserId(user_id);
    match processor.summary(&user) {
        Ok(Some(summary)) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Ok(None) => {
            let payload = json!({
                "error": "no reputation summary",
                "user_id": user.0,
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => store_error_response(err),
    }
}

pub(crate) async fn user_analytics_handler<E, S, L, SS>(
    State(processor): State<Arc<EventProcessor<E, S, L, SS>>>,
    Path(user_id): Path<String>,
) -> Response
where
    E: EventLog + 'static,
    S: SummaryStore + 'static,
    L: LeaderboardStore + 'static,
    SS: SnapshotStore + 'static,
{
    let user = UserId(user_id);
    match processor.refresh_user_analytics(&user) {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(AnalyticsError::Store(err)) => store_error_response(err),
    }
}

pub(crate) async fn leaderboard_handler<E, S, L, SS>(
    State(processor): State<Arc<EventProcessor<E, S, L, SS>>>,
    Path(kind): Path<String>,
    Query(query): Query<DateQuery>,
) -> Response
where
    E: EventLog + 'static,
    S: SummaryStore + 'static,
    L: LeaderboardStore + 'static,
    SS: SnapshotStore + 'static,
{
    let Some(kind) = LeaderboardKind::from_label(&kind) else {
        let payload = json!({ "error": format!("unknown leaderboard type '{kind}'") });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    };

    match processor.refresh_leaderboard(kind, query.date) {
        Ok(board) => (StatusCode::OK, axum::Json(board)).into_response(),
        Err(LeaderboardError::Store(err)) => store_error_response(err),
    }
}

pub(crate) async fn daily_analytics_handler<E, S, L, SS>(
    State(processor): State<Arc<EventProcessor<E, S, L, SS>>>,
    Query(query): Query<DateQuery>,
) -> Response
where
    E: EventLog + 'static,
    S: SummaryStore + 'static,
    L: LeaderboardStore + 'static,
    SS: SnapshotStore + 'static,
{
    match processor.generate_daily_analytics(query.date) {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(AnalyticsError::Store(err)) => store_error_response(err),
    }
}

pub(crate) async fn health_metrics_handler<E, S, L, SS>(
    State(processor): State<Arc<EventProcessor<E, S, L, SS>>>,
) -> Response
where
    E: EventLog + 'static,
    S: SummaryStore + 'static,
    L: LeaderboardStore + 'static,
    SS: SnapshotStore + 'static,
{
    (StatusCode::OK, axum::Json(processor.health_metrics())).into_response()
}

fn store_error_response(err: StoreError) -> Response {
    let status = match err {
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::Corrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}
