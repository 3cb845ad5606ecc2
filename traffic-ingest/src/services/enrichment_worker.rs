//! Background classification enrichment
//!
//! Each accepted event gets one fire-and-forget task that asks the
//! classification service for a label and writes it back over the
//! provisional one. Enrichment is best effort: any failure leaves the
//! provisional label in place for good. There is no retry, and nothing is
//! ever reported back to the request that created the event.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use traffic_common::{EventRecord, EventStore};

use super::classifier_client::{ClassificationService, ClassifierError};

/// Why an enrichment attempt was dropped
#[derive(Debug, Error)]
pub enum EnrichmentFailure {
    #[error("Classification call failed: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Store access failed: {0}")]
    Store(#[from] traffic_common::Error),
}

/// Result of one enrichment attempt, for logging and tests only
#[derive(Debug)]
pub enum EnrichmentOutcome {
    /// Record now carries the remote label
    Applied { classification: String },
    /// Service answered without a usable label; record untouched
    NoLabel,
    /// Record was gone by the time the label arrived
    StaleRecordSkip,
    /// Remote call or store access failed; record untouched
    Failed(EnrichmentFailure),
}

/// Runs enrichment tasks against a shared store
#[derive(Clone)]
pub struct EnrichmentWorker {
    store: Arc<dyn EventStore>,
    classifier: Arc<dyn ClassificationService>,
    tracker: TaskTracker,
}

impl EnrichmentWorker {
    pub fn new(store: Arc<dyn EventStore>, classifier: Arc<dyn ClassificationService>) -> Self {
        Self {
            store,
            classifier,
            tracker: TaskTracker::new(),
        }
    }

    /// Schedule enrichment of `snapshot` and return immediately
    ///
    /// The snapshot is moved into the task; the task never touches request
    /// state. Callers are free to drop the handle.
    pub fn spawn(&self, snapshot: EventRecord) -> JoinHandle<EnrichmentOutcome> {
        let worker = self.clone();
        self.tracker.spawn(async move { worker.enrich(snapshot).await })
    }

    /// Number of enrichment tasks still running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait up to `grace` for running tasks to finish
    ///
    /// Nothing is cancelled. Returns `false` if tasks were still running when
    /// the grace period ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        self.tracker.reopen();
        drained
    }

    /// Enrich one event
    ///
    /// Performs at most one store update and never returns an error.
    pub async fn enrich(&self, snapshot: EventRecord) -> EnrichmentOutcome {
        let event_id = snapshot.id;
        debug!(
            event_id,
            provisional = %snapshot.classification,
            "Starting classification enrichment"
        );

        let remote = match self.classifier.classify(&snapshot).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!(
                    event_id,
                    error = %e,
                    "Classification failed, keeping provisional label"
                );
                return EnrichmentOutcome::Failed(e.into());
            }
        };

        let Some(label) = remote.label() else {
            warn!(event_id, "Classification service returned no label, record left unchanged");
            return EnrichmentOutcome::NoLabel;
        };

        info!(
            event_id,
            classification = %label,
            score = ?remote.score,
            model_version = ?remote.model_version,
            "Received classification"
        );

        // The snapshot may be stale by now; check the record still exists
        match self.store.get(event_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(event_id, "Event no longer stored, skipping classification update");
                return EnrichmentOutcome::StaleRecordSkip;
            }
            Err(e) => {
                error!(
                    event_id,
                    error = %e,
                    "Failed to re-read event before classification update"
                );
                return EnrichmentOutcome::Failed(e.into());
            }
        }

        match self
            .store
            .update_classification(event_id, label, Utc::now())
            .await
        {
            Ok(true) => {
                info!(event_id, classification = %label, "Updated event classification");
                EnrichmentOutcome::Applied {
                    classification: label.to_string(),
                }
            }
            Ok(false) => {
                info!(event_id, "Event removed before classification update, skipping");
                EnrichmentOutcome::StaleRecordSkip
            }
            Err(e) => {
                error!(event_id, error = %e, "Failed to update event classification");
                EnrichmentOutcome::Failed(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier_client::RemoteClassification;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use traffic_common::{MemoryEventStore, NewEvent};

    /// Fake service returning a fixed answer
    struct FixedClassifier {
        answer: Result<Option<&'static str>, u16>,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn label(label: &'static str) -> Self {
            Self { answer: Ok(Some(label)), calls: AtomicUsize::new(0) }
        }

        fn no_label() -> Self {
            Self { answer: Ok(None), calls: AtomicUsize::new(0) }
        }

        fn failing(status: u16) -> Self {
            Self { answer: Err(status), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ClassificationService for FixedClassifier {
        async fn classify(
            &self,
            _event: &EventRecord,
        ) -> Result<RemoteClassification, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Ok(label) => Ok(RemoteClassification {
                    classification: label.map(str::to_string),
                    score: Some(0.6),
                    model_version: None,
                }),
                Err(status) => Err(ClassifierError::Api(status, "unavailable".to_string())),
            }
        }
    }

    async fn stored_event(store: &MemoryEventStore, vehicle_count: i64) -> EventRecord {
        let event = NewEvent {
            sensor_id: "s1".to_string(),
            timestamp: Utc::now(),
            vehicle_count,
            avg_speed: 40.0,
            metadata: None,
            classification: "high".to_string(),
            processed_at: Utc::now(),
        };
        let id = store.create(&event).await.unwrap();
        event.into_record(id)
    }

    #[tokio::test]
    async fn test_applies_remote_label_and_bumps_processed_at() {
        let store = Arc::new(MemoryEventStore::new());
        let snapshot = stored_event(&store, 10).await;
        let classifier = Arc::new(FixedClassifier::label("medium"));
        let worker = EnrichmentWorker::new(store.clone(), classifier);

        let outcome = worker.enrich(snapshot.clone()).await;

        assert!(matches!(
            outcome,
            EnrichmentOutcome::Applied { ref classification } if classification == "medium"
        ));
        let record = store.get(snapshot.id).await.unwrap().unwrap();
        assert_eq!(record.classification, "medium");
        assert!(record.processed_at >= snapshot.processed_at);
    }

    #[tokio::test]
    async fn test_missing_label_leaves_record_untouched() {
        let store = Arc::new(MemoryEventStore::new());
        let snapshot = stored_event(&store, 10).await;
        let worker = EnrichmentWorker::new(store.clone(), Arc::new(FixedClassifier::no_label()));

        assert!(matches!(worker.enrich(snapshot.clone()).await, EnrichmentOutcome::NoLabel));
        assert_eq!(store.get(snapshot.id).await.unwrap().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_provisional_label() {
        let store = Arc::new(MemoryEventStore::new());
        let snapshot = stored_event(&store, 10).await;
        let classifier = Arc::new(FixedClassifier::failing(503));
        let worker = EnrichmentWorker::new(store.clone(), classifier.clone());

        let outcome = worker.enrich(snapshot.clone()).await;

        assert!(matches!(
            outcome,
            EnrichmentOutcome::Failed(EnrichmentFailure::Classifier(ClassifierError::Api(503, _)))
        ));
        // No retry
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(snapshot.id).await.unwrap().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_removed_record_is_skipped() {
        let store = Arc::new(MemoryEventStore::new());
        let snapshot = stored_event(&store, 10).await;
        store.remove(snapshot.id).await;
        let classifier = Arc::new(FixedClassifier::label("medium"));
        let worker = EnrichmentWorker::new(store.clone(), classifier);

        let outcome = worker.enrich(snapshot.clone()).await;

        assert!(matches!(outcome, EnrichmentOutcome::StaleRecordSkip));
        assert!(store.get(snapshot.id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_spawned_tasks_drain() {
        let store = Arc::new(MemoryEventStore::new());
        let worker = EnrichmentWorker::new(store.clone(), Arc::new(FixedClassifier::label("low")));

        let mut ids = Vec::new();
        for count in [1, 2, 3] {
            let snapshot = stored_event(&store, count).await;
            ids.push(snapshot.id);
            worker.spawn(snapshot);
        }

        assert!(worker.drain(Duration::from_secs(5)).await);
        assert_eq!(worker.in_flight(), 0);
        for id in ids {
            assert_eq!(store.get(id).await.unwrap().unwrap().classification, "low");
        }
    }
}
