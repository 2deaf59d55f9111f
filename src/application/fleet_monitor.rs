// Fleet monitor - periodic per-vehicle polling with in-flight and stale guards
use crate::application::alert_dedup::{AlertDeduplicator, DedupPolicy};
use crate::application::diagnostics_service::{CycleReport, DiagnosticsService};
use crate::domain::parameter::ParameterId;
use crate::domain::telemetry::{DecodedSample, ParameterStats, RawTelemetryRecord};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Latest state of one watched vehicle.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub vehicle_id: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub sample_count: usize,
    pub stats: BTreeMap<ParameterId, ParameterStats>,
    pub alerts_emitted: usize,
    /// Set when the most recent cycle could not fetch telemetry; the
    /// statistics then still describe the last good window.
    pub last_error: Option<String>,
    #[serde(skip)]
    pub samples: Arc<Vec<DecodedSample>>,
}

impl VehicleSnapshot {
    fn empty(vehicle_id: &str) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            updated_at: None,
            sample_count: 0,
            stats: BTreeMap::new(),
            alerts_emitted: 0,
            last_error: None,
            samples: Arc::new(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Completed,
    /// A cycle for this vehicle is already running.
    InFlight,
    NotWatched,
    /// The vehicle was unwatched or re-watched while the cycle ran; its
    /// result was discarded.
    Stale,
}

struct VehicleEntry {
    generation: u64,
    dedup: Arc<tokio::sync::Mutex<AlertDeduplicator>>,
    snapshot: VehicleSnapshot,
    task: Option<JoinHandle<()>>,
}

struct MonitorInner {
    service: DiagnosticsService,
    poll_interval: Duration,
    policy: DedupPolicy,
    generations: AtomicU64,
    vehicles: Mutex<HashMap<String, VehicleEntry>>,
}

impl MonitorInner {
    fn vehicles(&self) -> MutexGuard<'_, HashMap<String, VehicleEntry>> {
        self.vehicles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generation and deduplicator of a watched vehicle.
    fn handle(&self, vehicle_id: &str) -> Option<(u64, Arc<tokio::sync::Mutex<AlertDeduplicator>>)> {
        self.vehicles()
            .get(vehicle_id)
            .map(|entry| (entry.generation, entry.dedup.clone()))
    }
}

#[derive(Clone)]
pub struct FleetMonitor {
    inner: Arc<MonitorInner>,
}

impl FleetMonitor {
    pub fn new(service: DiagnosticsService, poll_interval: Duration, policy: DedupPolicy) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                service,
                poll_interval,
                policy,
                generations: AtomicU64::new(0),
                vehicles: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn service(&self) -> &DiagnosticsService {
        &self.inner.service
    }

    /// Start polling a vehicle. Returns false if it was already watched.
    pub fn watch(&self, vehicle_id: &str) -> bool {
        self.register(vehicle_id, true)
    }

    /// Register a vehicle whose device pushes its own telemetry. No timer is
    /// started; cycles only run on explicit refresh. Returns false if it was
    /// already watched.
    pub fn watch_manual(&self, vehicle_id: &str) -> bool {
        self.register(vehicle_id, false)
    }

    fn register(&self, vehicle_id: &str, poll: bool) -> bool {
        let mut vehicles = self.inner.vehicles();
        if vehicles.contains_key(vehicle_id) {
            return false;
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let task = poll.then(|| {
            tokio::spawn(poll_loop(
                Arc::downgrade(&self.inner),
                vehicle_id.to_string(),
                self.inner.poll_interval,
            ))
        });
        vehicles.insert(
            vehicle_id.to_string(),
            VehicleEntry {
                generation,
                dedup: Arc::new(tokio::sync::Mutex::new(AlertDeduplicator::new(
                    self.inner.policy,
                ))),
                snapshot: VehicleSnapshot::empty(vehicle_id),
                task,
            },
        );
        tracing::info!("Watching vehicle {} (generation {})", vehicle_id, generation);
        true
    }

    /// Stop polling a vehicle. Its timer is cancelled, an in-flight fetch is
    /// dropped and any cycle still running elsewhere is discarded on arrival.
    pub fn unwatch(&self, vehicle_id: &str) -> bool {
        let removed = self.inner.vehicles().remove(vehicle_id);
        match removed {
            Some(entry) => {
                if let Some(task) = entry.task {
                    task.abort();
                }
                tracing::info!("Stopped watching vehicle {}", vehicle_id);
                true
            }
            None => false,
        }
    }

    pub fn watched(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.vehicles().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self, vehicle_id: &str) -> Option<VehicleSnapshot> {
        self.inner
            .vehicles()
            .get(vehicle_id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Run one cycle now, unless one is already in flight for this vehicle.
    pub async fn refresh(&self, vehicle_id: &str) -> RefreshOutcome {
        refresh(&self.inner, vehicle_id).await
    }

    /// Refresh every watched vehicle concurrently.
    pub async fn refresh_all(&self) -> BTreeMap<String, RefreshOutcome> {
        let ids = self.watched();
        let outcomes = join_all(ids.iter().map(|id| refresh(&self.inner, id))).await;
        ids.into_iter().zip(outcomes).collect()
    }

    /// Evaluate records that arrived out of band (oldest first) with the
    /// vehicle's deduplicator. Waits for a running cycle instead of skipping.
    pub async fn ingest(
        &self,
        vehicle_id: &str,
        records: &[RawTelemetryRecord],
    ) -> Option<CycleReport> {
        let (_, dedup) = self.inner.handle(vehicle_id)?;
        let mut dedup = dedup.lock().await;

        let service = &self.inner.service;
        let report = service.evaluate(vehicle_id, records, &mut dedup);
        service.dispatch_alerts(vehicle_id, &report.alerts);
        Some(report)
    }

    pub fn shutdown(&self) {
        for (_, entry) in self.inner.vehicles().drain() {
            if let Some(task) = entry.task {
                task.abort();
            }
        }
    }
}

async fn refresh(inner: &MonitorInner, vehicle_id: &str) -> RefreshOutcome {
    let Some((generation, dedup)) = inner.handle(vehicle_id) else {
        return RefreshOutcome::NotWatched;
    };

    // Holding the deduplicator for the whole cycle is the in-flight guard
    let Ok(mut dedup) = dedup.try_lock() else {
        tracing::debug!("Cycle for {} already in flight, skipping", vehicle_id);
        return RefreshOutcome::InFlight;
    };

    let result = inner.service.run_cycle(vehicle_id, &mut dedup).await;

    let mut vehicles = inner.vehicles();
    let Some(entry) = vehicles
        .get_mut(vehicle_id)
        .filter(|entry| entry.generation == generation)
    else {
        tracing::debug!("Discarding stale cycle result for {}", vehicle_id);
        return RefreshOutcome::Stale;
    };

    let snapshot = &mut entry.snapshot;
    match result {
        Ok(report) => {
            // Still holding the deduplicator, so a newer cycle cannot interleave
            inner.service.dispatch_alerts(vehicle_id, &report.alerts);
            snapshot.updated_at = Some(Utc::now());
            snapshot.sample_count = report.samples.len();
            snapshot.stats = report.stats;
            snapshot.alerts_emitted += report.alerts.len();
            snapshot.last_error = None;
            snapshot.samples = Arc::new(report.samples);
        }
        Err(e) => {
            tracing::warn!("Telemetry fetch for {} failed: {}", vehicle_id, e);
            snapshot.last_error = Some(e.to_string());
        }
    }
    RefreshOutcome::Completed
}

async fn poll_loop(inner: Weak<MonitorInner>, vehicle_id: String, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match refresh(&inner, &vehicle_id).await {
            RefreshOutcome::Completed | RefreshOutcome::InFlight => {}
            RefreshOutcome::NotWatched | RefreshOutcome::Stale => break,
        }
    }
}
