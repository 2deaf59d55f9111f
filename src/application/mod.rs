// Application layer - Diagnostics pipeline and monitoring
pub mod alert_dedup;
pub mod chart_renderer;
pub mod decoder;
pub mod diagnostics_service;
pub mod fleet_monitor;
pub mod statistics;
pub mod surface;
pub mod telemetry_source;
pub mod thresholds;
