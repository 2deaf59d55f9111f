// HTTP request handlers
use crate::application::fleet_monitor::{RefreshOutcome, VehicleSnapshot};
use crate::domain::alert::AlertEvent;
use crate::domain::parameter::{ParameterId, ParameterSpec};
use crate::domain::telemetry::ParameterStats;
use crate::infrastructure::codec8::{ack, parse_packet};
use crate::infrastructure::http_response::{accepts_brotli, svg_response};
use crate::infrastructure::svg_surface::render_svg;
use crate::presentation::api_error::ApiError;
use crate::presentation::app_state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const MAX_CHART_SIDE: f64 = 4096.0;
const MIN_CHART_SIDE: f64 = 64.0;

#[derive(Deserialize)]
pub struct ChartQuery {
    pub width: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub accepted: usize,
    /// Acknowledgement a device would receive, hex encoded.
    pub ack: String,
    pub crc_valid: bool,
    pub decode_warnings: usize,
    pub stats: BTreeMap<ParameterId, ParameterStats>,
    pub alerts: Vec<AlertEvent>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_parameters(State(state): State<Arc<AppState>>) -> Json<Vec<ParameterSpec>> {
    Json(state.catalog().all().to_vec())
}

pub async fn list_vehicles(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.monitor.watched())
}

pub async fn get_diagnostics(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<VehicleSnapshot>, ApiError> {
    state
        .monitor
        .snapshot(&id)
        .map(Json)
        .ok_or(ApiError::NotWatched(id))
}

/// Run a cycle now rather than waiting for the next tick
pub async fn refresh_vehicle(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<VehicleSnapshot>), ApiError> {
    match state.monitor.refresh(&id).await {
        RefreshOutcome::Completed => state
            .monitor
            .snapshot(&id)
            .map(|snapshot| (StatusCode::ACCEPTED, Json(snapshot)))
            .ok_or(ApiError::NotWatched(id)),
        RefreshOutcome::InFlight => Err(ApiError::InFlight(id)),
        RefreshOutcome::NotWatched => Err(ApiError::NotWatched(id)),
        RefreshOutcome::Stale => Err(ApiError::Discarded(id)),
    }
}

pub async fn refresh_all(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, RefreshOutcome>> {
    Json(state.monitor.refresh_all().await)
}

pub async fn watch_vehicle(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> StatusCode {
    if state.monitor.watch(&id) {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

pub async fn unwatch_vehicle(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    if state.monitor.unwatch(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotWatched(id))
    }
}

/// Render one parameter of the latest window as SVG
pub async fn get_chart(
    Path((id, parameter)): Path<(String, String)>,
    Query(query): Query<ChartQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let spec = state.catalog().lookup(&parameter)?;
    let snapshot = state
        .monitor
        .snapshot(&id)
        .ok_or_else(|| ApiError::NotWatched(id.clone()))?;

    let side = |requested: Option<f64>, default: f64| {
        requested
            .filter(|v| v.is_finite())
            .unwrap_or(default)
            .clamp(MIN_CHART_SIDE, MAX_CHART_SIDE)
    };
    let (svg, rendered) = render_svg(
        side(query.width, state.chart.width),
        side(query.height, state.chart.height),
        state.chart.device_pixel_ratio,
        |surface| state.renderer.render(surface, &snapshot.samples, spec),
    )
    .map_err(|e| {
        tracing::error!("Chart for {} failed: {}", id, e);
        ApiError::Internal(StatusCode::INTERNAL_SERVER_ERROR)
    })?;

    let chart_status = match rendered {
        Ok(summary) => {
            tracing::debug!(
                "Rendered {} for {}: {} points, {} anomalies",
                spec.id,
                id,
                summary.points,
                summary.anomalies
            );
            None
        }
        Err(e) => {
            tracing::debug!("Placeholder chart for {}: {}", id, e);
            Some("insufficient-data")
        }
    };

    svg_response(svg, accepts_brotli(&headers), chart_status)
        .await
        .map_err(ApiError::Internal)
}

/// Evaluate a raw Codec 8 packet against a watched vehicle's alert state
pub async fn ingest_codec8(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IngestSummary>, ApiError> {
    let packet = parse_packet(&body)?;
    let crc_valid = packet.crc_valid;
    let mut records = packet.into_raw_records();
    records.sort_by_key(|record| record.timestamp);

    let report = state
        .monitor
        .ingest(&id, &records)
        .await
        .ok_or_else(|| ApiError::NotWatched(id.clone()))?;

    tracing::info!(
        "Ingested {} codec 8 records for {} ({} alerts)",
        records.len(),
        id,
        report.alerts.len()
    );

    Ok(Json(IngestSummary {
        accepted: records.len(),
        ack: ack(records.len()).iter().map(|b| format!("{:02x}", b)).collect(),
        crc_valid,
        decode_warnings: report.decode_warnings,
        stats: report.stats,
        alerts: report.alerts,
    }))
}
