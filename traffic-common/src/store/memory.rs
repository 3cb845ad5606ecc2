//! In-memory event store
//!
//! Process-lifetime storage for running the ingest service without a
//! database file. Optionally bounded: once `capacity` records are held, each
//! insert evicts the oldest record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{clamp_limit, EventStore};
use crate::models::{EventRecord, NewEvent};
use crate::Result;

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    records: BTreeMap<i64, EventRecord>,
}

/// Event store held in a lock-guarded ordered map
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: RwLock<Inner>,
    capacity: Option<usize>,
}

impl MemoryEventStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps at most `capacity` records (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Drop a record; returns whether it was present
    pub async fn remove(&self, id: i64) -> bool {
        self.inner.write().await.records.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn create(&self, event: &NewEvent) -> Result<i64> {
        let mut inner = self.inner.write().await;

        inner.last_id += 1;
        let id = inner.last_id;
        inner.records.insert(id, event.clone().into_record(id));

        if let Some(capacity) = self.capacity {
            while inner.records.len() > capacity {
                if let Some((evicted, _)) = inner.records.pop_first() {
                    debug!(event_id = evicted, "Evicted oldest event (capacity {})", capacity);
                }
            }
        }

        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<EventRecord>> {
        Ok(self.inner.read().await.records.get(&id).cloned())
    }

    async fn update_classification(
        &self,
        id: i64,
        classification: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.records.get_mut(&id) {
            Some(record) => {
                record.classification = classification.to_string();
                record.processed_at = processed_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<EventRecord>> {
        let limit = clamp_limit(limit) as usize;
        let inner = self.inner.read().await;
        Ok(inner.records.values().rev().take(limit).cloned().collect())
    }
}
