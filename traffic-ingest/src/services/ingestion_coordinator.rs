//! Event ingestion
//!
//! Validate, label provisionally, persist, schedule enrichment, return. The
//! only await on this path is the store write.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};
use traffic_common::classification::provisional_label;
use traffic_common::{time, EventIn, EventRecord, EventStore, NewEvent};

use super::enrichment_worker::EnrichmentWorker;

/// Synchronous ingestion failures, visible to the caller
#[derive(Debug, Error)]
pub enum IngestError {
    /// Event rejected before anything was stored
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store write failed; nothing stored, nothing scheduled
    #[error("Persistence error: {0}")]
    Persistence(#[source] traffic_common::Error),
}

#[derive(Clone)]
pub struct IngestionCoordinator {
    store: Arc<dyn EventStore>,
    worker: EnrichmentWorker,
}

impl IngestionCoordinator {
    pub fn new(store: Arc<dyn EventStore>, worker: EnrichmentWorker) -> Self {
        Self { store, worker }
    }

    pub fn worker(&self) -> &EnrichmentWorker {
        &self.worker
    }

    /// Accept an event and return the stored record
    ///
    /// The returned record carries the provisional classification. Remote
    /// enrichment runs afterwards on its own task and its outcome is never
    /// reported here.
    pub async fn submit(&self, event: EventIn) -> Result<EventRecord, IngestError> {
        if let Err(e) = event.validate() {
            let message = match e {
                traffic_common::Error::InvalidInput(message) => message,
                other => other.to_string(),
            };
            return Err(IngestError::Validation(message));
        }

        let classification = provisional_label(event.vehicle_count);
        let new_event = NewEvent::from_input(event, classification, time::now());

        let id = self.store.create(&new_event).await.map_err(|e| {
            error!(sensor_id = %new_event.sensor_id, error = %e, "Failed to store event");
            IngestError::Persistence(e)
        })?;

        let record = new_event.into_record(id);
        debug!(
            event_id = id,
            sensor_id = %record.sensor_id,
            classification = %record.classification,
            "Event stored, scheduling enrichment"
        );

        self.worker.spawn(record.clone());

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier_client::{
        ClassificationService, ClassifierError, RemoteClassification,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use traffic_common::MemoryEventStore;

    /// Counts calls and never answers with a label
    #[derive(Default)]
    struct CountingClassifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClassificationService for CountingClassifier {
        async fn classify(
            &self,
            _event: &EventRecord,
        ) -> Result<RemoteClassification, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteClassification::default())
        }
    }

    /// Store whose writes always fail
    struct BrokenStore;

    #[async_trait]
    impl EventStore for BrokenStore {
        async fn create(&self, _event: &NewEvent) -> traffic_common::Result<i64> {
            Err(traffic_common::Error::Internal("disk full".to_string()))
        }

        async fn get(&self, _id: i64) -> traffic_common::Result<Option<EventRecord>> {
            Ok(None)
        }

        async fn update_classification(
            &self,
            _id: i64,
            _classification: &str,
            _processed_at: DateTime<Utc>,
        ) -> traffic_common::Result<bool> {
            Ok(false)
        }

        async fn list_recent(&self, _limit: i64) -> traffic_common::Result<Vec<EventRecord>> {
            Ok(Vec::new())
        }
    }

    fn coordinator_with(
        store: Arc<dyn EventStore>,
    ) -> (IngestionCoordinator, Arc<CountingClassifier>) {
        let classifier = Arc::new(CountingClassifier::default());
        let worker = EnrichmentWorker::new(store.clone(), classifier.clone());
        (IngestionCoordinator::new(store, worker), classifier)
    }

    fn event(vehicle_count: i64, avg_speed: f64) -> EventIn {
        EventIn {
            sensor_id: "s1".to_string(),
            timestamp: Utc::now(),
            vehicle_count,
            avg_speed,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_provisional_classification() {
        let (coordinator, _) = coordinator_with(Arc::new(MemoryEventStore::new()));

        for (count, expected) in [(0, "low"), (4, "low"), (5, "high"), (14, "high"), (40, "high")] {
            let record = coordinator.submit(event(count, 30.0)).await.unwrap();
            assert_eq!(record.classification, expected, "vehicle_count = {}", count);
        }
    }

    #[tokio::test]
    async fn test_submit_persists_and_schedules_one_enrichment() {
        let store = Arc::new(MemoryEventStore::new());
        let (coordinator, classifier) = coordinator_with(store.clone());

        let record = coordinator.submit(event(3, 45.2)).await.unwrap();
        assert_eq!(store.get(record.id).await.unwrap(), Some(record));

        assert!(coordinator.worker().drain(Duration::from_secs(5)).await);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_error_has_no_side_effects() {
        let store = Arc::new(MemoryEventStore::new());
        let (coordinator, classifier) = coordinator_with(store.clone());

        let result = coordinator.submit(event(-1, 10.0)).await;
        assert!(matches!(
            result,
            Err(IngestError::Validation(ref msg)) if msg.contains("vehicle_count")
        ));

        let result = coordinator.submit(event(1, -10.0)).await;
        assert!(matches!(result, Err(IngestError::Validation(_))));

        assert!(coordinator.worker().drain(Duration::from_secs(1)).await);
        assert!(store.is_empty().await);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persistence_error_schedules_nothing() {
        let (coordinator, classifier) = coordinator_with(Arc::new(BrokenStore));

        let result = coordinator.submit(event(3, 45.2)).await;
        assert!(matches!(result, Err(IngestError::Persistence(_))));

        assert!(coordinator.worker().drain(Duration::from_secs(1)).await);
        assert_eq!(coordinator.worker().in_flight(), 0);
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    }
}
