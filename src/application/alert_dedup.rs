// Alert deduplication - at most one alert per vehicle, parameter and time bucket
use crate::application::thresholds::classify;
use crate::domain::alert::{AlertEvent, AlertMetadata, DedupeKey, Severity};
use crate::domain::catalog::ParameterCatalog;
use crate::domain::parameter::{ParameterId, ParameterSpec};
use crate::domain::telemetry::DecodedSample;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupPolicy {
    /// Width of one dedup bucket.
    pub bucket: Duration,
    /// How many buckets behind the newest sample are remembered.
    pub retention_buckets: i64,
    /// Hard cap on remembered keys; the oldest are evicted first.
    pub max_keys: usize,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            bucket: Duration::from_secs(60),
            retention_buckets: 24 * 60,
            max_keys: 4096,
        }
    }
}

/// Remembers which alert keys were already emitted for one vehicle.
///
/// Keys live in a set ordered by bucket, so pruning is a split at the
/// retention horizon. Samples older than the horizon are treated as handled:
/// after pruning they could otherwise alert a second time when the same
/// telemetry window is fetched again.
#[derive(Debug, Clone)]
pub struct AlertDeduplicator {
    policy: DedupPolicy,
    emitted: BTreeSet<DedupeKey>,
    horizon: Option<i64>,
}

impl AlertDeduplicator {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            emitted: BTreeSet::new(),
            horizon: None,
        }
    }

    fn bucket_millis(&self) -> i64 {
        (self.policy.bucket.as_millis() as i64).max(1)
    }

    /// Coarse time bucket of a timestamp, by integer division of UTC epoch time.
    pub fn bucket_of(&self, timestamp: DateTime<Utc>) -> i64 {
        timestamp.timestamp_millis().div_euclid(self.bucket_millis())
    }

    /// Decide whether `sample` raises a new alert for `spec`. The key is
    /// recorded before the event is returned, so a failed delivery is never
    /// retried.
    pub fn consider(
        &mut self,
        entity_id: &str,
        sample: &DecodedSample,
        spec: &ParameterSpec,
    ) -> Option<AlertEvent> {
        let message = spec.alert_message?;
        let value = sample.value(spec.id)?;
        let status = classify(value, spec);
        let severity = Severity::from_status(status)?;

        let bucket = self.bucket_of(sample.timestamp);
        if self.horizon.is_some_and(|horizon| bucket < horizon) {
            return None;
        }

        let key = DedupeKey {
            bucket,
            entity_id: entity_id.to_string(),
            parameter: spec.id,
        };
        if !self.emitted.insert(key.clone()) {
            return None;
        }
        self.enforce_capacity();

        Some(AlertEvent {
            severity,
            parameter_id: spec.id,
            message: message.to_string(),
            metadata: AlertMetadata {
                value,
                unit: spec.unit.to_string(),
                label: spec.label.to_string(),
                status,
                timestamp: sample.timestamp,
            },
            dedupe_key: key,
        })
    }

    /// Run `consider` for every alerting parameter of the catalog.
    pub fn consider_sample(
        &mut self,
        entity_id: &str,
        sample: &DecodedSample,
        catalog: &ParameterCatalog,
    ) -> Vec<AlertEvent> {
        catalog
            .all()
            .iter()
            .filter(|spec| spec.alert_message.is_some())
            .filter_map(|spec| self.consider(entity_id, sample, spec))
            .collect()
    }

    /// Forget buckets that fell out of the retention window ending at `now`.
    /// Returns how many keys were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = self.bucket_of(now) - self.policy.retention_buckets;
        self.raise_horizon(horizon);

        let before = self.emitted.len();
        let split = DedupeKey {
            bucket: horizon,
            entity_id: String::new(),
            parameter: ParameterId::ALL[0],
        };
        self.emitted = self.emitted.split_off(&split);
        before - self.emitted.len()
    }

    fn enforce_capacity(&mut self) {
        while self.emitted.len() > self.policy.max_keys {
            match self.emitted.pop_first() {
                Some(evicted) => self.raise_horizon(evicted.bucket),
                None => break,
            }
        }
    }

    fn raise_horizon(&mut self, horizon: i64) {
        self.horizon = Some(self.horizon.map_or(horizon, |h| h.max(horizon)));
    }

    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }
}
