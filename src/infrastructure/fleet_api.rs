// Fleet API client - telemetry retrieval and alert submission over HTTP
use crate::application::telemetry_source::{AlertSink, FetchError, SinkError, TelemetrySource};
use crate::domain::alert::AlertEvent;
use crate::domain::telemetry::RawTelemetryRecord;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FleetApiClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

/// The API has served both a bare array and a wrapped object over time.
/// Records stay as raw values so one malformed entry can be dropped alone.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TelemetryPayload {
    Records(Vec<Value>),
    Wrapped { telemetry: Vec<Value> },
}

impl TelemetryPayload {
    fn into_records(self) -> Vec<Value> {
        match self {
            TelemetryPayload::Records(records) => records,
            TelemetryPayload::Wrapped { telemetry } => telemetry,
        }
    }
}

impl FleetApiClient {
    pub fn new(base_url: String, token: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn telemetry_url(&self, vehicle_id: &str, limit: usize) -> String {
        format!(
            "{}/api/vehicles/{}/telemetry?limit={}",
            self.base_url,
            urlencoding::encode(vehicle_id),
            limit
        )
    }

    fn alerts_url(&self, vehicle_id: &str) -> String {
        format!(
            "{}/api/vehicles/{}/alerts",
            self.base_url,
            urlencoding::encode(vehicle_id)
        )
    }
}

fn parse_payload(body: &[u8]) -> Result<Vec<RawTelemetryRecord>, FetchError> {
    let entries = serde_json::from_slice::<TelemetryPayload>(body)
        .map(TelemetryPayload::into_records)
        .map_err(|e| FetchError::Payload(e.to_string()))?;

    let total = entries.len();
    let records: Vec<RawTelemetryRecord> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping telemetry record {}: {}", index, e);
                None
            }
        })
        .collect();

    if records.len() < total {
        tracing::warn!("Kept {} of {} telemetry records", records.len(), total);
    }
    Ok(records)
}

fn fetch_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(e.to_string())
    }
}

#[async_trait]
impl TelemetrySource for FleetApiClient {
    async fn fetch_telemetry(
        &self,
        vehicle_id: &str,
        limit: usize,
    ) -> Result<Vec<RawTelemetryRecord>, FetchError> {
        let url = self.telemetry_url(vehicle_id, limit);
        tracing::debug!("Fetching telemetry: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(fetch_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let body = response.bytes().await.map_err(fetch_error)?;
        parse_payload(&body)
    }
}

#[async_trait]
impl AlertSink for FleetApiClient {
    async fn submit_alert(&self, vehicle_id: &str, alert: &AlertEvent) -> Result<(), SinkError> {
        let response = self
            .client
            .post(self.alerts_url(vehicle_id))
            .bearer_auth(&self.token)
            .json(alert)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected { status, body });
        }
        Ok(())
    }
}
