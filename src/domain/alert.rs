// Alert domain model
use super::parameter::{ParameterId, Status};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    /// Only warning and critical classifications raise alerts.
    pub fn from_status(status: Status) -> Option<Self> {
        match status {
            Status::Warning => Some(Severity::Warning),
            Status::Critical => Some(Severity::Critical),
            Status::Normal | Status::Low => None,
        }
    }
}

/// Identity of one alert condition within one time bucket. Ordered by bucket
/// first so that a sorted set of keys is also time ordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DedupeKey {
    pub bucket: i64,
    pub entity_id: String,
    pub parameter: ParameterId,
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.entity_id, self.parameter, self.bucket)
    }
}

impl Serialize for DedupeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMetadata {
    pub value: f64,
    pub unit: String,
    pub label: String,
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub severity: Severity,
    pub parameter_id: ParameterId,
    pub message: String,
    pub metadata: AlertMetadata,
    pub dedupe_key: DedupeKey,
}
