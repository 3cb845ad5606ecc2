//! Traffic classification rules
//!
//! Two rules live here and they are intentionally different:
//! - [`provisional_label`]: two-tier placeholder assigned at ingestion so the
//!   HTTP response never waits on the classification service
//! - [`score`]: three-tier oracle served by the classification service; its
//!   result replaces the placeholder during enrichment

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier reported alongside every oracle result
pub const MODEL_VERSION: &str = "rule_v1";

/// Vehicle count at or above which the provisional label is "high"
pub const PROVISIONAL_HIGH_THRESHOLD: i64 = 5;

/// Traffic density tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficLevel {
    Low,
    Medium,
    High,
}

impl TrafficLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLevel::Low => "low",
            TrafficLevel::Medium => "medium",
            TrafficLevel::High => "high",
        }
    }

    fn base_confidence(&self) -> f64 {
        match self {
            TrafficLevel::Low => 0.2,
            TrafficLevel::Medium => 0.6,
            TrafficLevel::High => 0.9,
        }
    }
}

impl std::fmt::Display for TrafficLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Oracle output, serialized as the `result` object of `/classify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classification: TrafficLevel,
    /// Confidence in [0.0, 1.0], rounded to 3 decimals
    pub score: f64,
    pub model_version: String,
}

/// Placeholder label computed at ingestion time
pub fn provisional_label(vehicle_count: i64) -> &'static str {
    if vehicle_count < PROVISIONAL_HIGH_THRESHOLD {
        TrafficLevel::Low.as_str()
    } else {
        TrafficLevel::High.as_str()
    }
}

/// Score an observation
///
/// Count picks the tier; speed nudges confidence (slow traffic reads as
/// congestion, fast traffic as free flow).
pub fn score(vehicle_count: i64, avg_speed: f64) -> ClassificationResult {
    let level = if vehicle_count < 5 {
        TrafficLevel::Low
    } else if vehicle_count < 15 {
        TrafficLevel::Medium
    } else {
        TrafficLevel::High
    };

    let mut confidence = level.base_confidence();
    if avg_speed < 20.0 {
        confidence = (confidence + 0.1).min(1.0);
    } else if avg_speed > 80.0 {
        confidence = (confidence - 0.1).max(0.0);
    }

    ClassificationResult {
        classification: level,
        score: (confidence * 1000.0).round() / 1000.0,
        model_version: MODEL_VERSION.to_string(),
    }
}

/// Score an arbitrary JSON event payload
///
/// Total over its input: missing, null or non-numeric fields count as zero.
pub fn score_payload(payload: &Value) -> ClassificationResult {
    let vehicle_count = payload.get("vehicle_count").map(count_from_json).unwrap_or(0);
    let avg_speed = payload.get("avg_speed").map(speed_from_json).unwrap_or(0.0);
    score(vehicle_count, avg_speed)
}

fn count_from_json(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn speed_from_json(value: &Value) -> f64 {
    let speed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if speed.is_finite() {
        speed
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provisional_rule() {
        assert_eq!(provisional_label(0), "low");
        assert_eq!(provisional_label(4), "low");
        assert_eq!(provisional_label(5), "high");
        assert_eq!(provisional_label(500), "high");
    }

    #[test]
    fn test_score_tiers() {
        assert_eq!(score(4, 50.0).classification, TrafficLevel::Low);
        assert_eq!(score(5, 50.0).classification, TrafficLevel::Medium);
        assert_eq!(score(14, 50.0).classification, TrafficLevel::Medium);
        assert_eq!(score(15, 50.0).classification, TrafficLevel::High);
    }

    #[test]
    fn test_score_base_confidence_in_normal_speed_band() {
        assert_eq!(score(1, 20.0).score, 0.2);
        assert_eq!(score(10, 50.0).score, 0.6);
        assert_eq!(score(30, 80.0).score, 0.9);
    }

    #[test]
    fn test_speed_adjustment() {
        assert_eq!(score(1, 10.0).score, 0.3);
        assert_eq!(score(10, 90.0).score, 0.5);
        assert_eq!(score(30, 5.0).score, 1.0);
        assert_eq!(score(30, 120.0).score, 0.8);
    }

    #[test]
    fn test_model_version() {
        assert_eq!(score(0, 0.0).model_version, "rule_v1");
    }

    #[test]
    fn test_score_payload_reads_fields() {
        let result = score_payload(&json!({"vehicle_count": 20, "avg_speed": 90.0}));
        assert_eq!(result.classification, TrafficLevel::High);
        assert_eq!(result.score, 0.8);
    }

    #[test]
    fn test_score_payload_missing_fields_are_zero() {
        let result = score_payload(&json!({"sensor_id": "s1"}));
        assert_eq!(result, score(0, 0.0));

        let result = score_payload(&json!({"vehicle_count": null, "avg_speed": null}));
        assert_eq!(result, score(0, 0.0));
    }

    #[test]
    fn test_score_payload_non_numeric_is_zero() {
        let result = score_payload(&json!({"vehicle_count": "lots", "avg_speed": [1, 2]}));
        assert_eq!(result, score(0, 0.0));

        let result = score_payload(&json!("not an object"));
        assert_eq!(result, score(0, 0.0));
    }

    #[test]
    fn test_score_payload_numeric_strings_and_floats() {
        let result = score_payload(&json!({"vehicle_count": "12", "avg_speed": "85.5"}));
        assert_eq!(result.classification, TrafficLevel::Medium);
        assert_eq!(result.score, 0.5);

        let result = score_payload(&json!({"vehicle_count": 15.9, "avg_speed": 50}));
        assert_eq!(result.classification, TrafficLevel::High);
    }

    #[test]
    fn test_result_serialization_shape() {
        let json = serde_json::to_value(score(10, 50.0)).unwrap();
        assert_eq!(json["classification"], "medium");
        assert_eq!(json["score"], 0.6);
        assert_eq!(json["model_version"], "rule_v1");
    }
}
