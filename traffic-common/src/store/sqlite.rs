//! SQLite-backed event store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{clamp_limit, EventStore};
use crate::models::{EventRecord, Metadata, NewEvent};
use crate::time::{from_storage, to_storage};
use crate::Result;

const SELECT_COLUMNS: &str =
    "id, sensor_id, timestamp, vehicle_count, avg_speed, metadata, processed_at, classification";

/// Event store over the shared `events` table
///
/// Each operation is a single SQL statement, so per-record atomicity comes
/// from SQLite itself.
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Wrap a pool whose database already has the `events` table
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_record(row: &SqliteRow) -> Result<EventRecord> {
    let timestamp: String = row.get("timestamp");
    let processed_at: String = row.get("processed_at");
    let metadata: Option<String> = row.get("metadata");
    let metadata = metadata
        .map(|raw| serde_json::from_str::<Metadata>(&raw))
        .transpose()?;

    Ok(EventRecord {
        id: row.get("id"),
        sensor_id: row.get("sensor_id"),
        timestamp: from_storage(&timestamp)?,
        vehicle_count: row.get("vehicle_count"),
        avg_speed: row.get("avg_speed"),
        metadata,
        processed_at: from_storage(&processed_at)?,
        classification: row.get("classification"),
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn create(&self, event: &NewEvent) -> Result<i64> {
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                sensor_id, timestamp, vehicle_count, avg_speed,
                metadata, processed_at, classification
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.sensor_id)
        .bind(to_storage(&event.timestamp))
        .bind(event.vehicle_count)
        .bind(event.avg_speed)
        .bind(metadata)
        .bind(to_storage(&event.processed_at))
        .bind(&event.classification)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Option<EventRecord>> {
        let sql = format!("SELECT {} FROM events WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn update_classification(
        &self,
        id: i64,
        classification: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE events SET classification = ?, processed_at = ? WHERE id = ?",
        )
        .bind(classification)
        .bind(to_storage(&processed_at))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<EventRecord>> {
        let sql = format!("SELECT {} FROM events ORDER BY id DESC LIMIT ?", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(clamp_limit(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use serde_json::json;

    async fn test_store() -> (SqliteEventStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("events.db")).await.unwrap();
        (SqliteEventStore::new(pool), dir)
    }

    fn new_event(sensor_id: &str, vehicle_count: i64) -> NewEvent {
        NewEvent {
            sensor_id: sensor_id.to_string(),
            timestamp: Utc::now(),
            vehicle_count,
            avg_speed: 42.5,
            metadata: None,
            classification: "low".to_string(),
            processed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip_with_metadata() {
        let (store, _dir) = test_store().await;

        let mut event = new_event("s1", 3);
        event.metadata = json!({"lane": 1, "weather": "rain"}).as_object().cloned();

        let id = store.create(&event).await.unwrap();
        let record = store.get(id).await.unwrap().expect("record should exist");

        assert_eq!(record, event.clone().into_record(id));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (store, _dir) = test_store().await;
        assert!(store.get(12345).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ids_strictly_increase() {
        let (store, _dir) = test_store().await;

        let a = store.create(&new_event("a", 1)).await.unwrap();
        let b = store.create(&new_event("b", 1)).await.unwrap();
        sqlx::query("DELETE FROM events WHERE id = ?")
            .bind(b)
            .execute(store.pool())
            .await
            .unwrap();
        let c = store.create(&new_event("c", 1)).await.unwrap();

        assert!(a < b);
        assert!(b < c, "AUTOINCREMENT must not reuse a deleted id");
    }

    #[tokio::test]
    async fn test_update_classification() {
        let (store, _dir) = test_store().await;
        let id = store.create(&new_event("s1", 12)).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(5);
        assert!(store.update_classification(id, "medium", later).await.unwrap());

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.classification, "medium");
        assert_eq!(record.processed_at, later);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_applied() {
        let (store, _dir) = test_store().await;
        let applied = store
            .update_classification(99, "medium", Utc::now())
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let (store, _dir) = test_store().await;
        for sensor in ["A", "B", "C"] {
            store.create(&new_event(sensor, 1)).await.unwrap();
        }

        let recent = store.list_recent(2).await.unwrap();
        let sensors: Vec<&str> = recent.iter().map(|r| r.sensor_id.as_str()).collect();
        assert_eq!(sensors, vec!["C", "B"]);

        // Zero is clamped up to one
        assert_eq!(store.list_recent(0).await.unwrap().len(), 1);
    }
}
