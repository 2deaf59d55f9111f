// Telemetry data domain models
use super::parameter::{ParameterId, Status};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One wire-level sample as delivered by a device, elements still keyed by
/// their numeric IO id.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTelemetryRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default, rename = "io_elements", alias = "elements")]
    pub elements: serde_json::Value,
}

impl RawTelemetryRecord {
    pub fn new(timestamp: DateTime<Utc>, speed: Option<f64>, elements: serde_json::Value) -> Self {
        Self {
            timestamp,
            speed,
            elements,
        }
    }
}

/// Accepts RFC 3339 as well as the naive UTC timestamps the fleet database
/// stores (`2024-03-01T08:15:00` or `2024-03-01 08:15:00.123`).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedSample {
    pub timestamp: DateTime<Utc>,
    pub speed: Option<f64>,
    pub values: BTreeMap<ParameterId, f64>,
}

impl DecodedSample {
    pub fn new(timestamp: DateTime<Utc>, speed: Option<f64>) -> Self {
        Self {
            timestamp,
            speed,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, id: ParameterId, value: f64) -> Self {
        self.values.insert(id, value);
        self
    }

    pub fn value(&self, id: ParameterId) -> Option<f64> {
        self.values.get(&id).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterStats {
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub status: Status,
    pub samples: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01T08:15:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T10:15:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T08:15:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 08:15:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_raw_record_from_api_json() {
        let json = r#"{
            "timestamp": "2024-03-01 08:15:00.250",
            "latitude": 44.81,
            "speed": 52,
            "io_elements": {"36": 2100, "48": 40}
        }"#;
        let record: RawTelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.speed, Some(52.0));
        assert_eq!(record.elements["36"], 2100);
        assert_eq!(record.timestamp.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_raw_record_tolerates_missing_elements() {
        let json = r#"{"timestamp": "2024-03-01T08:15:00Z", "speed": null}"#;
        let record: RawTelemetryRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.speed, None);
        assert!(record.elements.is_null());
    }
}
