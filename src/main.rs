// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::chart_renderer::{ChartStyle, SeriesRenderer};
use crate::application::diagnostics_service::DiagnosticsService;
use crate::application::fleet_monitor::FleetMonitor;
use crate::domain::catalog::ParameterCatalog;
use crate::infrastructure::config::{load_fleet_config, load_monitor_config};
use crate::infrastructure::device_server::DeviceServer;
use crate::infrastructure::fleet_api::FleetApiClient;
use crate::presentation::app_state::AppState;
use crate::presentation::routes::router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let fleet_config = load_fleet_config().context("Failed to load config/fleet")?;
    let monitor_config = load_monitor_config().context("Failed to load config/monitor")?;

    // Fleet API client serves as both telemetry source and alert sink
    let client = Arc::new(FleetApiClient::new(
        fleet_config.api.base_url,
        fleet_config.api.token,
        Duration::from_secs(fleet_config.api.timeout_secs),
    )?);

    // Create services (application layer)
    let catalog = Arc::new(ParameterCatalog::standard());
    let service = DiagnosticsService::new(
        client.clone(),
        client,
        catalog,
        monitor_config.monitor.telemetry_limit,
    );
    let monitor = FleetMonitor::new(
        service,
        monitor_config.monitor.poll_interval(),
        monitor_config.dedup.policy(),
    );

    for vehicle_id in &monitor_config.vehicles {
        monitor.watch(vehicle_id);
    }
    tracing::info!(
        "Monitoring {} vehicles every {}s",
        monitor_config.vehicles.len(),
        monitor_config.monitor.poll_interval().as_secs()
    );

    // Devices pushing Codec 8 over TCP feed the same monitor
    let device_addr: SocketAddr = monitor_config
        .devices
        .bind
        .parse()
        .with_context(|| format!("Invalid device bind address {}", monitor_config.devices.bind))?;
    let device_listener = tokio::net::TcpListener::bind(device_addr).await?;
    tracing::info!(
        "Accepting Codec 8 devices on {} ({} known)",
        device_addr,
        monitor_config.devices.imei.len()
    );
    let devices = DeviceServer::new(monitor.clone(), monitor_config.devices.imei.clone());
    let device_task = tokio::spawn(async move {
        if let Err(e) = devices.run(device_listener).await {
            tracing::error!("Device listener stopped: {}", e);
        }
    });

    // Create application state
    let state = Arc::new(AppState {
        monitor: monitor.clone(),
        renderer: SeriesRenderer::new(ChartStyle::default()),
        chart: monitor_config.chart.clone(),
    });

    // Build router (presentation layer)
    let app = router(state);

    // Start server
    let addr: SocketAddr = monitor_config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", monitor_config.server.bind))?;
    tracing::info!("Starting fleet-diagnostics service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    device_task.abort();
    monitor.shutdown();
    Ok(())
}
