// Domain layer - Diagnostic models with no I/O
pub mod alert;
pub mod catalog;
pub mod parameter;
pub mod telemetry;
