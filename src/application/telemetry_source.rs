// Collaborator traits for telemetry retrieval and alert delivery
use crate::domain::alert::AlertEvent;
use crate::domain::telemetry::RawTelemetryRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("telemetry request timed out")]
    Timeout,
    #[error("telemetry request failed: {0}")]
    Transport(String),
    #[error("telemetry source answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed telemetry payload: {0}")]
    Payload(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert delivery failed: {0}")]
    Transport(String),
    #[error("alert sink rejected the alert with {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Latest `limit` records for a vehicle, newest first.
    async fn fetch_telemetry(
        &self,
        vehicle_id: &str,
        limit: usize,
    ) -> Result<Vec<RawTelemetryRecord>, FetchError>;
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn submit_alert(&self, vehicle_id: &str, alert: &AlertEvent) -> Result<(), SinkError>;
}
