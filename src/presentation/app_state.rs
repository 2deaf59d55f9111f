// Application state for HTTP handlers
use crate::application::chart_renderer::SeriesRenderer;
use crate::application::fleet_monitor::FleetMonitor;
use crate::domain::catalog::ParameterCatalog;
use crate::infrastructure::config::ChartSettings;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub monitor: FleetMonitor,
    pub renderer: SeriesRenderer,
    pub chart: ChartSettings,
}

impl AppState {
    pub fn catalog(&self) -> &Arc<ParameterCatalog> {
        self.monitor.service().catalog()
    }
}
