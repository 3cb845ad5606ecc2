//! traffic-classifier library - rule-based traffic classification over HTTP
//!
//! Exposes the classification oracle from traffic-common. When a database is
//! configured, events can also be classified by id from the ingest service's
//! store, opened read-only.

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use traffic_common::EventStore;

pub mod api;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Read-only event lookup; `None` disables `/classify_by_id` lookups
    pub store: Option<Arc<dyn EventStore>>,
    /// Service startup timestamp
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Option<Arc<dyn EventStore>>) -> Self {
        Self {
            store,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::classify_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
