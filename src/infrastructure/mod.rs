// Infrastructure layer - External dependencies and adapters
pub mod codec8;
pub mod config;
pub mod device_server;
pub mod fleet_api;
pub mod http_response;
pub mod svg_surface;
