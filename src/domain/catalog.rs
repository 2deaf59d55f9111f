// Parameter catalog - the fixed wire code to parameter table
use super::parameter::{Bound, ParameterId, ParameterSpec, Thresholds, ValidRange};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("unknown parameter: {0}")]
    NotFound(String),
}

/// Milli-units (mV, m) to base units (V, km).
fn from_milli(raw: f64) -> f64 {
    raw / 1000.0
}

/// One-byte IO elements carrying two's complement temperatures.
fn signed_byte(raw: f64) -> f64 {
    f64::from(raw as i64 as u8 as i8)
}

const fn max_bands(normal: f64, warning: f64, critical: f64) -> Option<Thresholds> {
    Some(Thresholds {
        normal: Bound::Max(normal),
        warning: Bound::Max(warning),
        critical: Bound::Max(critical),
    })
}

const fn min_bands(normal: f64, warning: f64, critical: f64) -> Option<Thresholds> {
    Some(Thresholds {
        normal: Bound::Min(normal),
        warning: Bound::Min(warning),
        critical: Bound::Min(critical),
    })
}

// Teltonika FMB OBD IO element ids
const STANDARD: &[ParameterSpec] = &[
    ParameterSpec {
        id: ParameterId::Rpm,
        label: "Engine RPM",
        unit: "rpm",
        icon: "gauge",
        color: "#3b82f6",
        valid_range: ValidRange { min: 0.0, max: 8000.0 },
        thresholds: max_bands(4000.0, 6000.0, 8000.0),
        inverted: false,
        alert_message: Some("Engine RPM is too high"),
        raw_code: 36,
        convert: None,
    },
    ParameterSpec {
        id: ParameterId::CoolantTemp,
        label: "Coolant temperature",
        unit: "°C",
        icon: "thermometer",
        color: "#ef4444",
        valid_range: ValidRange { min: -40.0, max: 140.0 },
        thresholds: max_bands(95.0, 105.0, 140.0),
        inverted: false,
        alert_message: Some("Engine coolant is overheating"),
        raw_code: 32,
        convert: Some(signed_byte),
    },
    ParameterSpec {
        id: ParameterId::EngineLoad,
        label: "Engine load",
        unit: "%",
        icon: "activity",
        color: "#8b5cf6",
        valid_range: ValidRange { min: 0.0, max: 100.0 },
        thresholds: max_bands(80.0, 90.0, 100.0),
        inverted: false,
        alert_message: Some("Engine load is sustained near its limit"),
        raw_code: 31,
        convert: None,
    },
    ParameterSpec {
        id: ParameterId::ObdSpeed,
        label: "Vehicle speed",
        unit: "km/h",
        icon: "navigation",
        color: "#0ea5e9",
        valid_range: ValidRange { min: 0.0, max: 250.0 },
        thresholds: max_bands(90.0, 130.0, 250.0),
        inverted: false,
        alert_message: Some("Vehicle is speeding"),
        raw_code: 37,
        convert: None,
    },
    ParameterSpec {
        id: ParameterId::FuelLevel,
        label: "Fuel level",
        unit: "%",
        icon: "fuel",
        color: "#f59e0b",
        valid_range: ValidRange { min: 0.0, max: 100.0 },
        thresholds: min_bands(25.0, 10.0, 0.0),
        inverted: true,
        alert_message: Some("Fuel level is low"),
        raw_code: 48,
        convert: None,
    },
    ParameterSpec {
        id: ParameterId::BatteryVoltage,
        label: "Battery voltage",
        unit: "V",
        icon: "battery",
        color: "#22c55e",
        valid_range: ValidRange { min: 0.0, max: 16.0 },
        thresholds: min_bands(12.4, 12.0, 11.5),
        inverted: true,
        alert_message: Some("Battery voltage is low"),
        raw_code: 67,
        convert: Some(from_milli),
    },
    ParameterSpec {
        id: ParameterId::ExternalVoltage,
        label: "External voltage",
        unit: "V",
        icon: "plug",
        color: "#14b8a6",
        valid_range: ValidRange { min: 0.0, max: 30.0 },
        thresholds: None,
        inverted: false,
        alert_message: None,
        raw_code: 66,
        convert: Some(from_milli),
    },
    ParameterSpec {
        id: ParameterId::IntakeAirTemp,
        label: "Intake air temperature",
        unit: "°C",
        icon: "wind",
        color: "#06b6d4",
        valid_range: ValidRange { min: -40.0, max: 100.0 },
        thresholds: None,
        inverted: false,
        alert_message: None,
        raw_code: 39,
        convert: Some(signed_byte),
    },
    ParameterSpec {
        id: ParameterId::ThrottlePosition,
        label: "Throttle position",
        unit: "%",
        icon: "sliders",
        color: "#a855f7",
        valid_range: ValidRange { min: 0.0, max: 100.0 },
        thresholds: None,
        inverted: false,
        alert_message: None,
        raw_code: 41,
        convert: None,
    },
    ParameterSpec {
        id: ParameterId::DtcCount,
        label: "Trouble codes",
        unit: "codes",
        icon: "alert-triangle",
        color: "#f97316",
        valid_range: ValidRange { min: 0.0, max: 20.0 },
        thresholds: max_bands(1.0, 3.0, 20.0),
        inverted: false,
        alert_message: Some("Diagnostic trouble codes reported"),
        raw_code: 30,
        convert: None,
    },
    ParameterSpec {
        id: ParameterId::Odometer,
        label: "Odometer",
        unit: "km",
        icon: "map",
        color: "#64748b",
        valid_range: ValidRange { min: 0.0, max: 2_000_000.0 },
        thresholds: None,
        inverted: false,
        alert_message: None,
        raw_code: 16,
        convert: Some(from_milli),
    },
];

#[derive(Debug, Clone)]
pub struct ParameterCatalog {
    specs: Vec<ParameterSpec>,
}

impl ParameterCatalog {
    pub fn new(specs: Vec<ParameterSpec>) -> Self {
        Self { specs }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD.to_vec())
    }

    pub fn all(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn get(&self, id: ParameterId) -> Result<&ParameterSpec, CatalogError> {
        self.specs
            .iter()
            .find(|spec| spec.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Resolve a parameter from its symbolic name, e.g. a URL segment.
    pub fn lookup(&self, id: &str) -> Result<&ParameterSpec, CatalogError> {
        let parsed: ParameterId = id
            .parse()
            .map_err(|_| CatalogError::NotFound(id.to_string()))?;
        self.get(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_standard_catalog_covers_every_parameter() {
        let catalog = ParameterCatalog::standard();
        for id in ParameterId::ALL {
            assert_eq!(catalog.get(id).unwrap().id, id);
        }
        assert_eq!(catalog.all().len(), ParameterId::ALL.len());
    }

    #[test]
    fn test_raw_codes_are_unique() {
        let catalog = ParameterCatalog::standard();
        let codes: HashSet<u16> = catalog.all().iter().map(|s| s.raw_code).collect();
        assert_eq!(codes.len(), catalog.all().len());
    }

    #[test]
    fn test_threshold_bands_are_ordered_and_messaged() {
        for spec in ParameterCatalog::standard().all() {
            let Some(t) = spec.thresholds else { continue };
            assert!(spec.alert_message.is_some(), "{} has bands but no message", spec.id);
            let (n, w, c) = (t.normal.value(), t.warning.value(), t.critical.value());
            if spec.inverted {
                assert!(matches!(t.normal, Bound::Min(_)), "{}", spec.id);
                assert!(c < w && w < n, "{} inverted bands out of order", spec.id);
            } else {
                assert!(matches!(t.normal, Bound::Max(_)), "{}", spec.id);
                assert!(n < w && w < c, "{} bands out of order", spec.id);
            }
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let catalog = ParameterCatalog::standard();
        assert_eq!(catalog.lookup("rpm").unwrap().raw_code, 36);
        assert_eq!(catalog.lookup("fuel_level").unwrap().id, ParameterId::FuelLevel);
        assert_eq!(
            catalog.lookup("tyre_pressure").unwrap_err(),
            CatalogError::NotFound("tyre_pressure".to_string())
        );
    }

    #[test]
    fn test_get_on_partial_catalog_reports_not_found() {
        let catalog = ParameterCatalog::new(vec![]);
        assert!(matches!(
            catalog.get(ParameterId::Rpm),
            Err(CatalogError::NotFound(name)) if name == "rpm"
        ));
    }

    #[test]
    fn test_conversions() {
        let catalog = ParameterCatalog::standard();
        let battery = catalog.get(ParameterId::BatteryVoltage).unwrap();
        assert!((battery.convert(12_650.0) - 12.65).abs() < 1e-9);

        let coolant = catalog.get(ParameterId::CoolantTemp).unwrap();
        assert_eq!(coolant.convert(90.0), 90.0);
        assert_eq!(coolant.convert(251.0), -5.0);

        let rpm = catalog.get(ParameterId::Rpm).unwrap();
        assert_eq!(rpm.convert(2400.0), 2400.0);
    }
}
