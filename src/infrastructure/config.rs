use crate::application::alert_dedup::DedupPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct FleetConfig {
    pub api: ApiSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub monitor: PollSettings,
    #[serde(default)]
    pub dedup: DedupSettings,
    #[serde(default)]
    pub chart: ChartSettings,
    #[serde(default)]
    pub devices: DeviceSettings,
    #[serde(default)]
    pub vehicles: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollSettings {
    pub poll_interval_secs: u64,
    pub telemetry_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupSettings {
    pub bucket_secs: u64,
    pub retention_minutes: u64,
    pub max_keys: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChartSettings {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

/// Codec 8 listener for devices that push telemetry over TCP.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceSettings {
    pub bind: String,
    /// Device IMEI to vehicle id; frames from other devices are refused.
    pub imei: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5055".to_string(),
            imei: HashMap::new(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            telemetry_limit: 500,
        }
    }
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            bucket_secs: 60,
            retention_minutes: 24 * 60,
            max_keys: 4096,
        }
    }
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 300.0,
            device_pixel_ratio: 1.0,
        }
    }
}

impl PollSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl DedupSettings {
    pub fn policy(&self) -> DedupPolicy {
        let bucket_secs = self.bucket_secs.max(1);
        let retention_secs = self.retention_minutes * 60;
        DedupPolicy {
            bucket: Duration::from_secs(bucket_secs),
            retention_buckets: retention_secs.div_ceil(bucket_secs) as i64,
            max_keys: self.max_keys.max(1),
        }
    }
}

pub fn load_fleet_config() -> anyhow::Result<FleetConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/fleet"))
        .add_source(config::Environment::with_prefix("FLEET").separator("__"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_monitor_config() -> anyhow::Result<MonitorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/monitor").required(false))
        .add_source(
            config::Environment::with_prefix("MONITOR")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("vehicles")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
