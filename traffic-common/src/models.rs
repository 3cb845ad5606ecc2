//! Traffic event models
//!
//! Three shapes of the same observation:
//! - [`EventIn`]: payload as accepted from a sensor (`POST /events`)
//! - [`NewEvent`]: validated event with its provisional classification, ready to persist
//! - [`EventRecord`]: persisted event with store-assigned `id`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Free-form sensor metadata, opaque to the pipeline
pub type Metadata = Map<String, Value>;

/// Incoming traffic event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventIn {
    /// Identifier of the reporting sensor
    pub sensor_id: String,
    /// When the observation was made (caller clock, accepted as-is; no
    /// offset means UTC)
    #[serde(deserialize_with = "crate::time::deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Vehicles counted during the observation window
    pub vehicle_count: i64,
    /// Average speed over the observation window
    pub avg_speed: f64,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl EventIn {
    /// Reject events the pipeline cannot store
    ///
    /// Only counts and speeds are checked. `timestamp` is trusted; clock skew
    /// is the sensor's problem.
    pub fn validate(&self) -> Result<()> {
        if self.vehicle_count < 0 {
            return Err(Error::InvalidInput(format!(
                "vehicle_count must be non-negative, got {}",
                self.vehicle_count
            )));
        }
        if !self.avg_speed.is_finite() || self.avg_speed < 0.0 {
            return Err(Error::InvalidInput(format!(
                "avg_speed must be a non-negative number, got {}",
                self.avg_speed
            )));
        }
        Ok(())
    }
}

/// Event ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub vehicle_count: i64,
    pub avg_speed: f64,
    pub metadata: Option<Metadata>,
    pub classification: String,
    pub processed_at: DateTime<Utc>,
}

impl NewEvent {
    /// Attach an initial classification to an accepted event
    pub fn from_input(
        event: EventIn,
        classification: impl Into<String>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id: event.sensor_id,
            timestamp: event.timestamp,
            vehicle_count: event.vehicle_count,
            avg_speed: event.avg_speed,
            metadata: event.metadata,
            classification: classification.into(),
            processed_at,
        }
    }

    /// Materialize the stored record once the store has assigned an id
    pub fn into_record(self, id: i64) -> EventRecord {
        EventRecord {
            id,
            sensor_id: self.sensor_id,
            timestamp: self.timestamp,
            vehicle_count: self.vehicle_count,
            avg_speed: self.avg_speed,
            metadata: self.metadata,
            processed_at: self.processed_at,
            classification: self.classification,
        }
    }
}

/// Persisted traffic event
///
/// Serialized as the `POST /events` response body and as the payload sent to
/// the classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub vehicle_count: i64,
    pub avg_speed: f64,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Time of the last classification write
    pub processed_at: DateTime<Utc>,
    /// Provisional or enriched label, never empty
    pub classification: String,
}
