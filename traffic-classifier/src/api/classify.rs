//! Classification endpoints
//!
//! POST /classify, POST /classify_by_id

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};
use traffic_common::classification::{self, ClassificationResult};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Response envelope shared by both endpoints
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub result: ClassificationResult,
}

/// POST /classify_by_id request body
#[derive(Debug, Default, Deserialize)]
pub struct ClassifyByIdRequest {
    /// Inline event payload; takes precedence over `event_id`
    #[serde(default)]
    pub event: Option<Value>,
    /// Id of a stored event; `0` is treated as absent
    #[serde(default)]
    pub event_id: Option<i64>,
}

/// POST /classify
///
/// Accepts any JSON payload. Missing or unusable `vehicle_count` and
/// `avg_speed` fields count as zero.
pub async fn classify(
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ClassifyResponse>> {
    let Json(payload) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let result = classification::score_payload(&payload);
    debug!(classification = %result.classification, score = result.score, "Classified payload");

    Ok(Json(ClassifyResponse { result }))
}

/// POST /classify_by_id
pub async fn classify_by_id(
    State(state): State<AppState>,
    payload: Result<Json<ClassifyByIdRequest>, JsonRejection>,
) -> ApiResult<Json<ClassifyResponse>> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    if let Some(event) = request.event {
        let result = classification::score_payload(&event);
        return Ok(Json(ClassifyResponse { result }));
    }

    // Ids start at 1; zero counts as absent
    let Some(event_id) = request.event_id.filter(|id| *id != 0) else {
        return Err(ApiError::BadRequest("provide event or event_id".to_string()));
    };

    let Some(store) = state.store.as_ref() else {
        return Err(ApiError::NotImplemented(
            "event_id lookup requires a configured database".to_string(),
        ));
    };

    let record = store.get(event_id).await.map_err(|e| {
        error!(event_id, error = %e, "Failed to load event for classification");
        ApiError::Internal("Failed to retrieve event".to_string())
    })?;
    let record =
        record.ok_or_else(|| ApiError::NotFound(format!("Event not found: {}", event_id)))?;

    let result = classification::score(record.vehicle_count, record.avg_speed);
    debug!(event_id, classification = %result.classification, "Classified stored event");

    Ok(Json(ClassifyResponse { result }))
}

/// Build classification routes
pub fn classify_routes() -> Router<AppState> {
    Router::new()
        .route("/classify", post(classify))
        .route("/classify_by_id", post(classify_by_id))
}
