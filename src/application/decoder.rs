// Decoder - turns sparse IO element maps into named physical quantities
use crate::domain::catalog::ParameterCatalog;
use crate::domain::parameter::ParameterId;
use crate::domain::telemetry::{DecodedSample, RawTelemetryRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeWarning {
    #[error("element map of record at {timestamp} is {kind}, not an object")]
    MalformedElements {
        timestamp: DateTime<Utc>,
        kind: &'static str,
    },
    #[error("element {code} ({parameter}) of record at {timestamp} is not numeric")]
    NonNumericElement {
        timestamp: DateTime<Utc>,
        code: u16,
        parameter: ParameterId,
    },
    #[error("element {code} ({parameter}) of record at {timestamp} converts {raw} to a non-finite value")]
    ConversionFailed {
        timestamp: DateTime<Utc>,
        code: u16,
        parameter: ParameterId,
        raw: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Decoded {
    pub sample: DecodedSample,
    pub warnings: Vec<DecodeWarning>,
}

#[derive(Clone)]
pub struct Decoder {
    catalog: Arc<ParameterCatalog>,
}

impl Decoder {
    pub fn new(catalog: Arc<ParameterCatalog>) -> Self {
        Self { catalog }
    }

    /// Decode one record. Never fails: anything unusable is left out of the
    /// sample and reported as a warning.
    pub fn decode(&self, record: &RawTelemetryRecord) -> Decoded {
        let mut sample = DecodedSample::new(record.timestamp, record.speed);
        let mut warnings = Vec::new();

        let elements = match &record.elements {
            Value::Object(map) => map,
            // No elements reported at all
            Value::Null => return Decoded { sample, warnings },
            other => {
                warnings.push(DecodeWarning::MalformedElements {
                    timestamp: record.timestamp,
                    kind: json_kind(other),
                });
                return Decoded { sample, warnings };
            }
        };

        for spec in self.catalog.all() {
            let Some(raw) = elements.get(&spec.raw_code.to_string()) else {
                continue;
            };
            let Some(raw) = numeric(raw) else {
                warnings.push(DecodeWarning::NonNumericElement {
                    timestamp: record.timestamp,
                    code: spec.raw_code,
                    parameter: spec.id,
                });
                continue;
            };
            let value = spec.convert(raw);
            if !value.is_finite() {
                warnings.push(DecodeWarning::ConversionFailed {
                    timestamp: record.timestamp,
                    code: spec.raw_code,
                    parameter: spec.id,
                    raw,
                });
                continue;
            }
            sample.values.insert(spec.id, value);
        }

        Decoded { sample, warnings }
    }

    /// Decode a batch in order, logging warnings instead of returning them.
    pub fn decode_batch(&self, records: &[RawTelemetryRecord]) -> (Vec<DecodedSample>, usize) {
        let mut warning_count = 0;
        let samples = records
            .iter()
            .map(|record| {
                let decoded = self.decode(record);
                for warning in &decoded.warnings {
                    tracing::warn!("Decode warning: {}", warning);
                }
                warning_count += decoded.warnings.len();
                decoded.sample
            })
            .collect();
        (samples, warning_count)
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parameter::{ParameterSpec, ValidRange};
    use chrono::TimeZone;
    use serde_json::json;

    fn decoder() -> Decoder {
        Decoder::new(Arc::new(ParameterCatalog::standard()))
    }

    fn record(elements: Value) -> RawTelemetryRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        RawTelemetryRecord::new(ts, Some(48.0), elements)
    }

    #[test]
    fn test_present_codes_are_decoded_and_converted() {
        let decoded = decoder().decode(&record(json!({
            "36": 2150,
            "67": 12650,
            "48": 8,
            "32": 250
        })));

        assert!(decoded.warnings.is_empty());
        let sample = decoded.sample;
        assert_eq!(sample.value(ParameterId::Rpm), Some(2150.0));
        assert_eq!(sample.value(ParameterId::FuelLevel), Some(8.0));
        assert_eq!(sample.value(ParameterId::CoolantTemp), Some(-6.0));
        assert!((sample.value(ParameterId::BatteryVoltage).unwrap() - 12.65).abs() < 1e-9);
        assert_eq!(sample.speed, Some(48.0));
    }

    #[test]
    fn test_absent_codes_are_omitted_not_zeroed() {
        let sample = decoder().decode(&record(json!({ "36": 0 }))).sample;
        assert_eq!(sample.value(ParameterId::Rpm), Some(0.0));
        assert_eq!(sample.value(ParameterId::FuelLevel), None);
        assert_eq!(sample.values.len(), 1);
    }

    #[test]
    fn test_unknown_codes_are_ignored_silently() {
        let decoded = decoder().decode(&record(json!({ "241": 24602, "78": 0, "36": 900 })));
        assert!(decoded.warnings.is_empty());
        assert_eq!(decoded.sample.values.len(), 1);
    }

    #[test]
    fn test_malformed_map_yields_empty_sample_and_warning() {
        let decoded = decoder().decode(&record(json!([36, 2100])));
        assert!(decoded.sample.values.is_empty());
        assert!(matches!(
            decoded.warnings.as_slice(),
            [DecodeWarning::MalformedElements { kind: "an array", .. }]
        ));
    }

    #[test]
    fn test_null_map_is_an_empty_report() {
        let decoded = decoder().decode(&record(Value::Null));
        assert!(decoded.sample.values.is_empty());
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn test_bad_element_only_drops_that_parameter() {
        let decoded = decoder().decode(&record(json!({ "36": "n/a", "48": "37" })));
        assert_eq!(decoded.sample.value(ParameterId::Rpm), None);
        assert_eq!(decoded.sample.value(ParameterId::FuelLevel), Some(37.0));
        assert_eq!(
            decoded.warnings,
            vec![DecodeWarning::NonNumericElement {
                timestamp: decoded.sample.timestamp,
                code: 36,
                parameter: ParameterId::Rpm,
            }]
        );
    }

    #[test]
    fn test_non_finite_conversion_is_a_warning() {
        fn reciprocal(raw: f64) -> f64 {
            1.0 / raw
        }
        let catalog = ParameterCatalog::new(vec![ParameterSpec {
            id: ParameterId::ThrottlePosition,
            label: "Throttle",
            unit: "%",
            icon: "sliders",
            color: "#a855f7",
            valid_range: ValidRange { min: 0.0, max: 100.0 },
            thresholds: None,
            inverted: false,
            alert_message: None,
            raw_code: 41,
            convert: Some(reciprocal),
        }]);
        let decoded = Decoder::new(Arc::new(catalog)).decode(&record(json!({ "41": 0 })));
        assert!(decoded.sample.values.is_empty());
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn test_batch_keeps_going_past_corrupt_records() {
        let records = vec![
            record(json!({ "36": 1000 })),
            record(json!("garbage")),
            record(json!({ "36": 1200 })),
        ];
        let (samples, warnings) = decoder().decode_batch(&records);
        assert_eq!(samples.len(), 3);
        assert_eq!(warnings, 1);
        assert!(samples[1].values.is_empty());
        assert_eq!(samples[2].value(ParameterId::Rpm), Some(1200.0));
    }
}
