// Series renderer - zoned, anomaly-highlighted time-series chart
use crate::application::surface::{Color, Paint, Point, Rect, Stroke, Surface, TextAlign, TextStyle};
use crate::application::thresholds::classify;
use crate::domain::parameter::{ParameterId, ParameterSpec, Status, ValidRange};
use crate::domain::telemetry::DecodedSample;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Fewest points that still make a line.
pub const MIN_POINTS: usize = 2;
const GRID_DIVISIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("insufficient data to chart {parameter}: {available} point(s), need at least 2")]
    InsufficientData {
        parameter: ParameterId,
        available: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartStyle {
    pub padding: Padding,
    pub background: Color,
    pub grid: Stroke,
    pub label: TextStyle,
    pub normal_zone: Color,
    pub warning_zone: Color,
    pub critical_zone: Color,
    pub warning_marker: Color,
    pub critical_marker: Color,
    /// Used when the catalog color does not parse.
    pub fallback_line: Color,
    pub line_width: f64,
    pub marker_radius: f64,
    pub current_radius: f64,
}

impl Default for ChartStyle {
    fn default() -> Self {
        let muted = Color::rgb(148, 163, 184);
        Self {
            padding: Padding {
                top: 20.0,
                right: 20.0,
                bottom: 30.0,
                left: 50.0,
            },
            background: Color::rgb(15, 23, 42),
            grid: Stroke {
                color: muted.with_alpha(0.2),
                width: 1.0,
                dash: Some((4.0, 4.0)),
            },
            label: TextStyle {
                color: muted,
                size: 11.0,
                align: TextAlign::Start,
            },
            normal_zone: Color::rgb(34, 197, 94).with_alpha(0.08),
            warning_zone: Color::rgb(245, 158, 11).with_alpha(0.1),
            critical_zone: Color::rgb(239, 68, 68).with_alpha(0.12),
            warning_marker: Color::rgb(245, 158, 11),
            critical_marker: Color::rgb(239, 68, 68),
            fallback_line: Color::rgb(59, 130, 246),
            line_width: 2.0,
            marker_radius: 3.5,
            current_radius: 5.0,
        }
    }
}

/// A horizontal threshold band in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneBand {
    pub status: Status,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    pub points: usize,
    pub anomalies: usize,
    pub zones: Vec<ZoneBand>,
}

/// Linear value-to-y mapping against the parameter's fixed valid range.
struct Scale {
    plot: Rect,
    range: ValidRange,
}

impl Scale {
    fn y(&self, value: f64) -> f64 {
        let value = self.range.clamp(value);
        self.plot.y + self.plot.height
            - (value - self.range.min) / self.range.span() * self.plot.height
    }
}

/// Zone bands for `spec` inside `plot`. They depend only on the valid range
/// and the thresholds, never on the data, so they stay put across refreshes.
/// Inverted parameters get no zones.
pub fn zone_bands(spec: &ParameterSpec, plot: Rect) -> Vec<ZoneBand> {
    let Some(bands) = spec.thresholds.filter(|_| !spec.inverted) else {
        return Vec::new();
    };
    let range = spec.valid_range;
    let scale = Scale { plot, range };
    let (normal, warning) = (bands.normal.value(), bands.warning.value());

    [
        (range.min, normal, Status::Normal),
        (normal, warning, Status::Warning),
        (warning, range.max, Status::Critical),
    ]
    .into_iter()
    .filter_map(|(low, high, status)| {
        let (low, high) = (range.clamp(low), range.clamp(high));
        (high > low).then(|| ZoneBand {
            status,
            top: scale.y(high),
            bottom: scale.y(low),
        })
    })
    .collect()
}

#[derive(Debug, Clone, Default)]
pub struct SeriesRenderer {
    style: ChartStyle,
}

impl SeriesRenderer {
    pub fn new(style: ChartStyle) -> Self {
        Self { style }
    }

    pub fn plot_area(&self, width: f64, height: f64) -> Rect {
        let p = self.style.padding;
        Rect::new(
            p.left,
            p.top,
            (width - p.left - p.right).max(1.0),
            (height - p.top - p.bottom).max(1.0),
        )
    }

    /// Draw the series of `spec` found in `samples` (oldest first).
    pub fn render(
        &self,
        surface: &mut dyn Surface,
        samples: &[DecodedSample],
        spec: &ParameterSpec,
    ) -> Result<RenderSummary, RenderError> {
        let style = &self.style;
        let (width, height) = surface.size();
        let series: Vec<(DateTime<Utc>, f64)> = samples
            .iter()
            .filter_map(|s| s.value(spec.id).map(|v| (s.timestamp, v)))
            .collect();

        surface.fill_rect(Rect::new(0.0, 0.0, width, height), &Paint::Solid(style.background));

        if series.len() < MIN_POINTS {
            surface.draw_text(
                "Insufficient data",
                Point::new(width / 2.0, height / 2.0),
                &TextStyle {
                    align: TextAlign::Middle,
                    size: style.label.size + 2.0,
                    ..style.label
                },
            );
            return Err(RenderError::InsufficientData {
                parameter: spec.id,
                available: series.len(),
            });
        }

        let plot = self.plot_area(width, height);
        let scale = Scale {
            plot,
            range: spec.valid_range,
        };

        let zones = zone_bands(spec, plot);
        for zone in &zones {
            let rect = Rect::new(plot.x, zone.top, plot.width, zone.bottom - zone.top);
            surface.fill_rect(rect, &Paint::Solid(self.zone_color(zone.status)));
        }

        self.draw_grid(surface, &scale);

        let step = plot.width / (series.len() - 1) as f64;
        let points: Vec<Point> = series
            .iter()
            .enumerate()
            .map(|(i, (_, value))| Point::new(plot.x + step * i as f64, scale.y(*value)))
            .collect();
        let color = Color::from_hex(spec.color).unwrap_or(style.fallback_line);
        surface.stroke_polyline(&points, &Stroke::solid(color, style.line_width));

        let (first, last) = (points[0], points[points.len() - 1]);
        let mut area = points.clone();
        area.push(Point::new(last.x, plot.bottom()));
        area.push(Point::new(first.x, plot.bottom()));
        surface.fill_polygon(
            &area,
            &Paint::VerticalGradient {
                top: plot.y,
                bottom: plot.bottom(),
                from: color.with_alpha(0.35),
                to: color.with_alpha(0.0),
            },
        );

        let mut anomalies = 0;
        for (point, (_, value)) in points.iter().zip(&series) {
            let marker = match classify(*value, spec) {
                Status::Warning => style.warning_marker,
                Status::Critical => style.critical_marker,
                Status::Normal | Status::Low => continue,
            };
            surface.fill_circle(*point, style.marker_radius, marker);
            anomalies += 1;
        }

        surface.fill_circle(last, style.current_radius + 3.0, color.with_alpha(0.25));
        surface.fill_circle(last, style.current_radius, color);

        self.draw_time_axis(surface, &series, &points, plot);

        Ok(RenderSummary {
            points: points.len(),
            anomalies,
            zones,
        })
    }

    fn zone_color(&self, status: Status) -> Color {
        match status {
            Status::Normal | Status::Low => self.style.normal_zone,
            Status::Warning => self.style.warning_zone,
            Status::Critical => self.style.critical_zone,
        }
    }

    fn draw_grid(&self, surface: &mut dyn Surface, scale: &Scale) {
        let range = scale.range;
        let label = TextStyle {
            align: TextAlign::End,
            ..self.style.label
        };
        for i in 0..=GRID_DIVISIONS {
            let value = range.min + range.span() * i as f64 / GRID_DIVISIONS as f64;
            let y = scale.y(value);
            surface.stroke_line(
                Point::new(scale.plot.x, y),
                Point::new(scale.plot.right(), y),
                &self.style.grid,
            );
            surface.draw_text(
                &format_tick(value, range.span()),
                Point::new(scale.plot.x - 6.0, y + label.size / 3.0),
                &label,
            );
        }
    }

    fn draw_time_axis(
        &self,
        surface: &mut dyn Surface,
        series: &[(DateTime<Utc>, f64)],
        points: &[Point],
        plot: Rect,
    ) {
        let last = series.len() - 1;
        let long_window = series[last].0 - series[0].0 >= Duration::hours(24);
        let y = plot.bottom() + 18.0;

        let mut ticks = vec![(0, TextAlign::Start)];
        if series.len() >= 3 {
            ticks.push((last / 2, TextAlign::Middle));
        }
        ticks.push((last, TextAlign::End));

        for (index, align) in ticks {
            let text = format_time(series[index].0, long_window);
            let style = TextStyle {
                align,
                ..self.style.label
            };
            surface.draw_text(&text, Point::new(points[index].x, y), &style);
        }
    }
}

fn format_tick(value: f64, span: f64) -> String {
    if span >= 50.0 {
        format!("{:.0}", value)
    } else if span >= 5.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn format_time(timestamp: DateTime<Utc>, long_window: bool) -> String {
    if long_window {
        timestamp.format("%d.%m %H:%M").to_string()
    } else {
        timestamp.format("%H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::surface::{DrawOp, RecordingSurface};
    use crate::domain::catalog::ParameterCatalog;
    use chrono::TimeZone;

    fn spec(id: ParameterId) -> ParameterSpec {
        ParameterCatalog::standard().get(id).unwrap().clone()
    }

    fn series(id: ParameterId, values: &[f64], gap_secs: &[i64]) -> Vec<DecodedSample> {
        let mut ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                if i > 0 {
                    ts += Duration::seconds(gap_secs.get(i - 1).copied().unwrap_or(30));
                }
                DecodedSample::new(ts, None).with_value(id, *v)
            })
            .collect()
    }

    fn op_index(ops: &[DrawOp], pred: impl Fn(&DrawOp) -> bool) -> usize {
        ops.iter().position(pred).expect("operation not drawn")
    }

    #[test]
    fn test_single_point_draws_placeholder_only() {
        let mut surface = RecordingSurface::new(400.0, 200.0);
        let samples = series(ParameterId::Rpm, &[1200.0], &[]);

        let result = SeriesRenderer::default().render(&mut surface, &samples, &spec(ParameterId::Rpm));

        assert_eq!(
            result,
            Err(RenderError::InsufficientData {
                parameter: ParameterId::Rpm,
                available: 1
            })
        );
        assert_eq!(surface.ops.len(), 2);
        assert!(matches!(surface.ops[0], DrawOp::FillRect(..)));
        assert_eq!(surface.texts(), vec!["Insufficient data"]);
    }

    #[test]
    fn test_samples_missing_the_parameter_do_not_count() {
        let mut surface = RecordingSurface::new(400.0, 200.0);
        let mut samples = series(ParameterId::Rpm, &[1200.0], &[]);
        samples.extend(series(ParameterId::FuelLevel, &[40.0, 41.0, 42.0], &[]));

        let result = SeriesRenderer::default().render(&mut surface, &samples, &spec(ParameterId::Rpm));
        assert!(matches!(result, Err(RenderError::InsufficientData { available: 1, .. })));
    }

    #[test]
    fn test_layers_are_drawn_in_order() {
        let mut surface = RecordingSurface::new(600.0, 300.0);
        let samples = series(ParameterId::Rpm, &[1000.0, 4500.0, 7000.0, 2000.0], &[]);

        let summary = SeriesRenderer::default()
            .render(&mut surface, &samples, &spec(ParameterId::Rpm))
            .unwrap();

        let ops = &surface.ops;
        let first_zone = 1;
        assert!(matches!(ops[first_zone], DrawOp::FillRect(..)));
        let first_grid = op_index(ops, |op| matches!(op, DrawOp::Line(..)));
        let line = op_index(ops, |op| matches!(op, DrawOp::Polyline(..)));
        let fill = op_index(ops, |op| matches!(op, DrawOp::Polygon(..)));
        let first_marker = op_index(ops, |op| matches!(op, DrawOp::Circle(..)));
        let last_text = ops.len() - 1;

        assert!(first_zone < first_grid);
        assert!(first_grid < line);
        assert!(line < fill);
        assert!(fill < first_marker);
        assert!(matches!(ops[last_text], DrawOp::Text(..)));

        assert_eq!(summary.points, 4);
        assert_eq!(summary.anomalies, 2);
        assert_eq!(summary.zones.len(), 3);
        // two anomaly dots plus the two rings of the current marker
        let circles = ops.iter().filter(|op| matches!(op, DrawOp::Circle(..))).count();
        assert_eq!(circles, 4);
    }

    #[test]
    fn test_grid_has_five_divisions_with_labels() {
        let mut surface = RecordingSurface::new(600.0, 300.0);
        let samples = series(ParameterId::Rpm, &[1000.0, 2000.0], &[]);
        SeriesRenderer::default()
            .render(&mut surface, &samples, &spec(ParameterId::Rpm))
            .unwrap();

        let lines = surface.ops.iter().filter(|op| matches!(op, DrawOp::Line(..))).count();
        assert_eq!(lines, GRID_DIVISIONS + 1);
        let texts = surface.texts();
        for label in ["0", "1600", "3200", "4800", "6400", "8000"] {
            assert!(texts.contains(&label), "missing grid label {}", label);
        }
    }

    #[test]
    fn test_points_are_evenly_spaced_by_index() {
        let mut surface = RecordingSurface::new(600.0, 300.0);
        let samples = series(ParameterId::Rpm, &[1000.0, 2000.0, 3000.0], &[5, 3600]);
        SeriesRenderer::default()
            .render(&mut surface, &samples, &spec(ParameterId::Rpm))
            .unwrap();

        let points = surface
            .ops
            .iter()
            .find_map(|op| match op {
                DrawOp::Polyline(points, _) => Some(points.clone()),
                _ => None,
            })
            .unwrap();
        let first_gap = points[1].x - points[0].x;
        let second_gap = points[2].x - points[1].x;
        assert!((first_gap - second_gap).abs() < 1e-9);
        assert_eq!(points[0].x, 50.0);
        assert_eq!(points[2].x, 580.0);
    }

    #[test]
    fn test_zone_bands_ignore_the_data_range() {
        let rpm = spec(ParameterId::Rpm);
        let renderer = SeriesRenderer::default();

        let mut calm = RecordingSurface::new(600.0, 300.0);
        let calm_summary = renderer
            .render(&mut calm, &series(ParameterId::Rpm, &[800.0, 900.0, 850.0], &[]), &rpm)
            .unwrap();

        let mut wild = RecordingSurface::new(600.0, 300.0);
        let wild_summary = renderer
            .render(&mut wild, &series(ParameterId::Rpm, &[100.0, 7900.0], &[]), &rpm)
            .unwrap();

        assert_eq!(calm_summary.zones, wild_summary.zones);
        assert_eq!(calm.ops[1..4], wild.ops[1..4]);

        // plot is 250px tall starting at y=20; 4000 of 8000 rpm sits halfway
        let warning = calm_summary.zones[1];
        assert_eq!(warning.status, Status::Warning);
        assert_eq!(warning.bottom, 145.0);
        assert!((warning.top - 82.5).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_parameters_have_no_zones() {
        let fuel = spec(ParameterId::FuelLevel);
        assert!(zone_bands(&fuel, Rect::new(0.0, 0.0, 100.0, 100.0)).is_empty());

        let mut surface = RecordingSurface::new(600.0, 300.0);
        let summary = SeriesRenderer::default()
            .render(&mut surface, &series(ParameterId::FuelLevel, &[30.0, 8.0], &[]), &fuel)
            .unwrap();
        assert!(summary.zones.is_empty());
        assert_eq!(summary.anomalies, 1);
    }

    #[test]
    fn test_degenerate_range_stays_finite() {
        let mut flat = spec(ParameterId::ThrottlePosition);
        flat.valid_range = ValidRange { min: 5.0, max: 5.0 };
        let mut surface = RecordingSurface::new(300.0, 150.0);
        SeriesRenderer::default()
            .render(&mut surface, &series(ParameterId::ThrottlePosition, &[5.0, 5.0], &[]), &flat)
            .unwrap();

        for op in &surface.ops {
            if let DrawOp::Polyline(points, _) = op {
                assert!(points.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
            }
        }
    }

    #[test]
    fn test_time_labels_first_middle_last() {
        let mut surface = RecordingSurface::new(600.0, 300.0);
        let samples = series(ParameterId::Rpm, &[1.0, 2.0, 3.0, 4.0, 5.0], &[600, 600, 600, 600]);
        SeriesRenderer::default()
            .render(&mut surface, &samples, &spec(ParameterId::Rpm))
            .unwrap();

        let texts = surface.texts();
        let tail = &texts[texts.len() - 3..];
        assert_eq!(tail, ["08:00", "08:20", "08:40"]);
    }

    #[test]
    fn test_two_points_have_no_middle_label() {
        let mut surface = RecordingSurface::new(600.0, 300.0);
        let samples = series(ParameterId::Rpm, &[1.0, 2.0], &[86_400]);
        SeriesRenderer::default()
            .render(&mut surface, &samples, &spec(ParameterId::Rpm))
            .unwrap();

        let texts = surface.texts();
        assert_eq!(&texts[texts.len() - 2..], ["01.03 08:00", "02.03 08:00"]);
    }
}
