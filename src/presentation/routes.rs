// Router wiring for the HTTP surface
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_chart, get_diagnostics, health_check, ingest_codec8, list_parameters, list_vehicles,
    refresh_all, refresh_vehicle, unwatch_vehicle, watch_vehicle,
};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Compression is handled per response for charts, so no CompressionLayer here
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/parameters", get(list_parameters))
        .route("/vehicles", get(list_vehicles))
        .route("/vehicles/refresh", post(refresh_all))
        .route("/vehicles/:id/diagnostics", get(get_diagnostics))
        .route("/vehicles/:id/refresh", post(refresh_vehicle))
        .route("/vehicles/:id/watch", put(watch_vehicle).delete(unwatch_vehicle))
        .route("/vehicles/:id/charts/:parameter", get(get_chart))
        .route("/vehicles/:id/codec8", post(ingest_codec8))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
