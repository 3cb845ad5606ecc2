//! Event ingestion and query endpoints
//!
//! POST /events, GET /events, GET /events/:id

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::{error, info};
use traffic_common::store::DEFAULT_LIST_LIMIT;
use traffic_common::{EventIn, EventRecord};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /events query parameters
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Number of records to return, clamped to [1, 1000]
    pub limit: Option<i64>,
}

/// POST /events
///
/// Stores the event and answers 201 with the provisional classification.
/// Enrichment happens after the response and is not reflected here.
pub async fn create_event(
    State(state): State<AppState>,
    payload: Result<Json<EventIn>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<EventRecord>)> {
    let Json(event) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;

    let record = state.coordinator.submit(event).await?;

    info!(
        event_id = record.id,
        sensor_id = %record.sensor_id,
        classification = %record.classification,
        "Event ingested"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /events?limit=N
///
/// Most recent events first. A record whose enrichment is in flight may show
/// either its provisional or its enriched label.
pub async fn list_events(
    State(state): State<AppState>,
    query: Result<Query<ListEventsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<EventRecord>>> {
    let Query(query) = query.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let events = state.store.list_recent(limit).await.map_err(|e| {
        error!(error = %e, limit, "Failed to list events");
        ApiError::Internal("Failed to retrieve events".to_string())
    })?;

    Ok(Json(events))
}

/// GET /events/:id
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<EventRecord>> {
    let event = state.store.get(id).await.map_err(|e| {
        error!(event_id = id, error = %e, "Failed to load event");
        ApiError::Internal("Failed to retrieve event".to_string())
    })?;

    event
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Event not found: {}", id)))
}

/// Build event routes
pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/:id", get(get_event))
}
