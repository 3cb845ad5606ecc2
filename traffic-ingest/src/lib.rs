//! traffic-ingest library - sensor event ingestion with async classification
//!
//! Accepts traffic events over HTTP, stores them with a provisional label and
//! hands each one to a background task that asks traffic-classifier for the
//! real label.

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use traffic_common::EventStore;

pub mod api;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use services::{ClassificationService, EnrichmentWorker, IngestionCoordinator};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Event storage shared with the enrichment tasks
    pub store: Arc<dyn EventStore>,
    /// Accept-and-store path
    pub coordinator: IngestionCoordinator,
    /// Service startup timestamp
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the ingestion pipeline around a store and a classification service
    pub fn new(store: Arc<dyn EventStore>, classifier: Arc<dyn ClassificationService>) -> Self {
        let worker = EnrichmentWorker::new(store.clone(), classifier);
        let coordinator = IngestionCoordinator::new(store.clone(), worker);
        Self {
            store,
            coordinator,
            startup_time: Utc::now(),
        }
    }

    pub fn worker(&self) -> &EnrichmentWorker {
        self.coordinator.worker()
    }
}

/// Build application router
///
/// Routes are served at the root and mirrored under `/v1`.
pub fn build_router(state: AppState) -> Router {
    let routes = || Router::new().merge(api::health_routes()).merge(api::event_routes());

    Router::new()
        .merge(routes())
        .nest("/v1", routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
