// Diagnostics service - one fetch, decode, aggregate and evaluate cycle
use crate::application::alert_dedup::AlertDeduplicator;
use crate::application::decoder::Decoder;
use crate::application::statistics::aggregate_all;
use crate::application::telemetry_source::{AlertSink, FetchError, TelemetrySource};
use crate::domain::alert::AlertEvent;
use crate::domain::catalog::ParameterCatalog;
use crate::domain::parameter::ParameterId;
use crate::domain::telemetry::{DecodedSample, ParameterStats, RawTelemetryRecord};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub vehicle_id: String,
    /// Oldest first.
    pub samples: Vec<DecodedSample>,
    pub stats: BTreeMap<ParameterId, ParameterStats>,
    pub alerts: Vec<AlertEvent>,
    pub decode_warnings: usize,
}

#[derive(Clone)]
pub struct DiagnosticsService {
    source: Arc<dyn TelemetrySource>,
    sink: Arc<dyn AlertSink>,
    catalog: Arc<ParameterCatalog>,
    decoder: Decoder,
    telemetry_limit: usize,
}

impl DiagnosticsService {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        sink: Arc<dyn AlertSink>,
        catalog: Arc<ParameterCatalog>,
        telemetry_limit: usize,
    ) -> Self {
        Self {
            source,
            sink,
            decoder: Decoder::new(catalog.clone()),
            catalog,
            telemetry_limit,
        }
    }

    pub fn catalog(&self) -> &Arc<ParameterCatalog> {
        &self.catalog
    }

    /// Fetch the latest window for a vehicle and run it through the pipeline.
    /// Nothing is delivered here; the caller dispatches the report's alerts
    /// once it knows the result is still wanted.
    pub async fn run_cycle(
        &self,
        vehicle_id: &str,
        dedup: &mut AlertDeduplicator,
    ) -> Result<CycleReport, FetchError> {
        let mut records = self
            .source
            .fetch_telemetry(vehicle_id, self.telemetry_limit)
            .await?;
        // The source answers newest first
        records.reverse();

        Ok(self.evaluate(vehicle_id, &records, dedup))
    }

    /// Decode, aggregate and deduplicate an oldest-first window. Pure apart
    /// from the deduplicator state.
    pub fn evaluate(
        &self,
        vehicle_id: &str,
        records: &[RawTelemetryRecord],
        dedup: &mut AlertDeduplicator,
    ) -> CycleReport {
        let (samples, decode_warnings) = self.decoder.decode_batch(records);
        let stats = aggregate_all(&samples, &self.catalog);

        if let Some(latest) = samples.last() {
            let pruned = dedup.prune(latest.timestamp);
            if pruned > 0 {
                tracing::debug!(
                    "Pruned {} alert keys for {} ({} retained)",
                    pruned,
                    vehicle_id,
                    dedup.len()
                );
            }
        }

        let alerts: Vec<AlertEvent> = samples
            .iter()
            .flat_map(|sample| dedup.consider_sample(vehicle_id, sample, &self.catalog))
            .collect();

        tracing::debug!(
            "Evaluated {} samples for {}: {} parameters, {} new alerts, {} decode warnings",
            samples.len(),
            vehicle_id,
            stats.len(),
            alerts.len(),
            decode_warnings
        );

        CycleReport {
            vehicle_id: vehicle_id.to_string(),
            samples,
            stats,
            alerts,
            decode_warnings,
        }
    }

    /// Fire-and-forget delivery; failures are logged and never retried.
    pub fn dispatch_alerts(&self, vehicle_id: &str, alerts: &[AlertEvent]) {
        for alert in alerts {
            let sink = self.sink.clone();
            let vehicle_id = vehicle_id.to_string();
            let alert = alert.clone();

            tokio::spawn(async move {
                match sink.submit_alert(&vehicle_id, &alert).await {
                    Ok(()) => tracing::info!(
                        "Delivered {:?} alert {} for {}",
                        alert.severity,
                        alert.dedupe_key,
                        vehicle_id
                    ),
                    Err(e) => tracing::warn!(
                        "Could not deliver alert {} for {}: {}",
                        alert.dedupe_key,
                        vehicle_id,
                        e
                    ),
                }
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::application::telemetry_source::SinkError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Serves canned newest-first windows per vehicle.
    #[derive(Default)]
    pub struct FakeSource {
        pub windows: Mutex<HashMap<String, Vec<RawTelemetryRecord>>>,
        pub delay: Option<Duration>,
        pub calls: Mutex<usize>,
    }

    impl FakeSource {
        pub fn with_window(vehicle_id: &str, newest_first: Vec<RawTelemetryRecord>) -> Self {
            let source = Self::default();
            source
                .windows
                .lock()
                .unwrap()
                .insert(vehicle_id.to_string(), newest_first);
            source
        }
    }

    #[async_trait]
    impl TelemetrySource for FakeSource {
        async fn fetch_telemetry(
            &self,
            vehicle_id: &str,
            limit: usize,
        ) -> Result<Vec<RawTelemetryRecord>, FetchError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let windows = self.windows.lock().unwrap();
            match windows.get(vehicle_id) {
                Some(records) => Ok(records.iter().take(limit).cloned().collect()),
                None => Err(FetchError::Status {
                    status: 404,
                    body: "unknown vehicle".to_string(),
                }),
            }
        }
    }

    /// Forwards every submitted alert to a channel, optionally failing.
    pub struct ChannelSink {
        pub tx: mpsc::UnboundedSender<(String, AlertEvent)>,
        pub fail: bool,
    }

    impl ChannelSink {
        pub fn new(fail: bool) -> (Self, mpsc::UnboundedReceiver<(String, AlertEvent)>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { tx, fail }, rx)
        }
    }

    #[async_trait]
    impl AlertSink for ChannelSink {
        async fn submit_alert(&self, vehicle_id: &str, alert: &AlertEvent) -> Result<(), SinkError> {
            let _ = self.tx.send((vehicle_id.to_string(), alert.clone()));
            if self.fail {
                Err(SinkError::Transport("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }
}
