// Diagnostic parameter domain model
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symbolic identity of every quantity the decoder knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterId {
    Rpm,
    CoolantTemp,
    EngineLoad,
    ObdSpeed,
    FuelLevel,
    BatteryVoltage,
    ExternalVoltage,
    IntakeAirTemp,
    ThrottlePosition,
    DtcCount,
    Odometer,
}

impl ParameterId {
    pub const ALL: [ParameterId; 11] = [
        ParameterId::Rpm,
        ParameterId::CoolantTemp,
        ParameterId::EngineLoad,
        ParameterId::ObdSpeed,
        ParameterId::FuelLevel,
        ParameterId::BatteryVoltage,
        ParameterId::ExternalVoltage,
        ParameterId::IntakeAirTemp,
        ParameterId::ThrottlePosition,
        ParameterId::DtcCount,
        ParameterId::Odometer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterId::Rpm => "rpm",
            ParameterId::CoolantTemp => "coolant_temp",
            ParameterId::EngineLoad => "engine_load",
            ParameterId::ObdSpeed => "obd_speed",
            ParameterId::FuelLevel => "fuel_level",
            ParameterId::BatteryVoltage => "battery_voltage",
            ParameterId::ExternalVoltage => "external_voltage",
            ParameterId::IntakeAirTemp => "intake_air_temp",
            ParameterId::ThrottlePosition => "throttle_position",
            ParameterId::DtcCount => "dtc_count",
            ParameterId::Odometer => "odometer",
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownParameter(pub String);

impl FromStr for ParameterId {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParameterId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownParameter(s.to_string()))
    }
}

/// One edge of a threshold band. `Max` bands grow worse upwards, `Min` bands
/// grow worse downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    Max(f64),
    Min(f64),
}

impl Bound {
    pub fn value(self) -> f64 {
        match self {
            Bound::Max(v) | Bound::Min(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub normal: Bound,
    pub warning: Bound,
    pub critical: Bound,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidRange {
    pub min: f64,
    pub max: f64,
}

impl ValidRange {
    /// Width of the domain, never below 1 so it can be used as a divisor.
    pub fn span(&self) -> f64 {
        (self.max - self.min).max(1.0)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min.min(self.max), self.max.max(self.min))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Normal,
    Warning,
    Critical,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParameterSpec {
    pub id: ParameterId,
    pub label: &'static str,
    pub unit: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub valid_range: ValidRange,
    pub thresholds: Option<Thresholds>,
    pub inverted: bool,
    pub alert_message: Option<&'static str>,
    pub raw_code: u16,
    #[serde(skip)]
    pub convert: Option<fn(f64) -> f64>,
}

impl ParameterSpec {
    pub fn convert(&self, raw: f64) -> f64 {
        match self.convert {
            Some(convert) => convert(raw),
            None => raw,
        }
    }
}
