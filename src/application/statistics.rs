// Statistics aggregation over a window of decoded samples
use crate::application::thresholds::classify;
use crate::domain::catalog::ParameterCatalog;
use crate::domain::parameter::{ParameterId, ParameterSpec};
use crate::domain::telemetry::{DecodedSample, ParameterStats};
use std::collections::BTreeMap;

/// Current/min/max/avg of one parameter over `samples` (oldest first).
/// Returns `None` when no sample carries the parameter.
pub fn aggregate(samples: &[DecodedSample], spec: &ParameterSpec) -> Option<ParameterStats> {
    let mut values = samples.iter().filter_map(|s| s.value(spec.id));
    let first = values.next()?;

    let (mut min, mut max, mut sum, mut count, mut current) = (first, first, first, 1usize, first);
    for value in values {
        min = min.min(value);
        max = max.max(value);
        sum += value;
        count += 1;
        current = value;
    }

    Some(ParameterStats {
        current,
        min,
        max,
        avg: sum / count as f64,
        status: classify(current, spec),
        samples: count,
    })
}

/// Stats for every catalog parameter that appears in the window.
pub fn aggregate_all(
    samples: &[DecodedSample],
    catalog: &ParameterCatalog,
) -> BTreeMap<ParameterId, ParameterStats> {
    catalog
        .all()
        .iter()
        .filter_map(|spec| aggregate(samples, spec).map(|stats| (spec.id, stats)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parameter::Status;
    use chrono::{Duration, TimeZone, Utc};

    fn window(values: &[Option<f64>]) -> Vec<DecodedSample> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let sample = DecodedSample::new(start + Duration::seconds(30 * i as i64), None);
                match v {
                    Some(v) => sample.with_value(ParameterId::Rpm, *v),
                    None => sample,
                }
            })
            .collect()
    }

    fn rpm() -> ParameterSpec {
        ParameterCatalog::standard().get(ParameterId::Rpm).unwrap().clone()
    }

    #[test]
    fn test_empty_window_is_none() {
        assert_eq!(aggregate(&[], &rpm()), None);
        assert_eq!(aggregate(&window(&[None, None]), &rpm()), None);
    }

    #[test]
    fn test_stats_skip_samples_without_the_parameter() {
        let stats = aggregate(&window(&[Some(1000.0), None, Some(5000.0), Some(3000.0), None]), &rpm())
            .unwrap();
        assert_eq!(stats.current, 3000.0);
        assert_eq!(stats.min, 1000.0);
        assert_eq!(stats.max, 5000.0);
        assert_eq!(stats.avg, 3000.0);
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.status, Status::Normal);
    }

    #[test]
    fn test_status_follows_the_latest_value() {
        let stats = aggregate(&window(&[Some(7000.0), Some(4500.0)]), &rpm()).unwrap();
        assert_eq!(stats.status, Status::Warning);
        assert_eq!(stats.max, 7000.0);
    }

    #[test]
    fn test_zero_values_are_data_not_absence() {
        let stats = aggregate(&window(&[Some(0.0), Some(0.0)]), &rpm()).unwrap();
        assert_eq!(stats.avg, 0.0);
        assert_eq!(stats.samples, 2);
    }

    #[test]
    fn test_non_finite_values_propagate_into_avg() {
        let stats = aggregate(&window(&[Some(1.0), Some(f64::INFINITY)]), &rpm()).unwrap();
        assert!(stats.avg.is_infinite());
    }

    #[test]
    fn test_aggregate_all_only_reports_present_parameters() {
        let catalog = ParameterCatalog::standard();
        let samples = window(&[Some(1200.0)]);
        let all = aggregate_all(&samples, &catalog);
        assert_eq!(all.len(), 1);
        assert!(all.contains_key(&ParameterId::Rpm));
    }
}
