// Threshold evaluation - classify a value against a parameter's bands
use crate::domain::parameter::{Bound, ParameterSpec, Status};

/// Classify `value` against the bands of `spec`.
///
/// Both directions walk the same ladder: the first band edge the value falls
/// below decides the status, and values past every edge take the ceiling
/// status. The outermost `critical` edge bounds the valid range and is not a
/// decision point of its own.
pub fn classify(value: f64, spec: &ParameterSpec) -> Status {
    let Some(bands) = &spec.thresholds else {
        return Status::Normal;
    };

    let (ladder, ceiling): ([(Bound, Status); 2], Status) = if spec.inverted {
        (
            [(bands.warning, Status::Critical), (bands.normal, Status::Low)],
            Status::Normal,
        )
    } else {
        (
            [(bands.normal, Status::Normal), (bands.warning, Status::Warning)],
            Status::Critical,
        )
    };

    ladder
        .iter()
        .find(|(edge, _)| value < edge.value())
        .map(|(_, status)| *status)
        .unwrap_or(ceiling)
}
