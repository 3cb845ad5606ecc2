//! Event store abstraction
//!
//! The store is the only shared mutable state in the pipeline. It is handed
//! to the ingest path and to every enrichment task as an `Arc<dyn EventStore>`;
//! implementations must make each operation safe to call concurrently without
//! any locking by callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{EventRecord, NewEvent};
use crate::Result;

mod memory;
mod sqlite;

pub use memory::MemoryEventStore;
pub use sqlite::SqliteEventStore;

/// Smallest accepted `list_recent` limit
pub const MIN_LIST_LIMIT: i64 = 1;
/// Largest accepted `list_recent` limit
pub const MAX_LIST_LIMIT: i64 = 1000;
/// Limit used when the caller does not supply one
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// Clamp a requested list size into `[MIN_LIST_LIMIT, MAX_LIST_LIMIT]`
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(MIN_LIST_LIMIT, MAX_LIST_LIMIT)
}

/// Durable keyed storage for event records
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event and return its id
    ///
    /// Ids are unique and strictly increasing in creation order. The record
    /// is durable once this returns.
    async fn create(&self, event: &NewEvent) -> Result<i64>;

    /// Fetch a record by id
    async fn get(&self, id: i64) -> Result<Option<EventRecord>>;

    /// Overwrite `classification` and `processed_at` in one atomic write
    ///
    /// Returns `Ok(false)` when no record with `id` exists. Absence is not an
    /// error.
    async fn update_classification(
        &self,
        id: i64,
        classification: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Most recently created records first, `limit` clamped to `[1, 1000]`
    async fn list_recent(&self, limit: i64) -> Result<Vec<EventRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(1), 1);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(1000), 1000);
        assert_eq!(clamp_limit(5000), 1000);
    }
}
