// SVG drawing surface backed by plotters
use crate::application::surface::{Color, Paint, Point, Rect, Stroke, Surface, TextAlign, TextStyle};
use plotters::coord::Shift;
use plotters::prelude::{
    Circle, DrawingArea, IntoDrawingArea, IntoFont, PathElement, Polygon, RGBAColor, Rectangle,
    SVGBackend, ShapeStyle,
};
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::fmt::Display;
use thiserror::Error;

/// Strips used to approximate a vertical gradient fill.
const GRADIENT_BANDS: usize = 32;

#[derive(Debug, Error)]
pub enum SvgError {
    #[error("SVG drawing failed: {0}")]
    Drawing(String),
}

/// Draws into a plotters SVG backend over a caller-owned buffer. Callers work
/// in logical pixels; the device pixel ratio scales everything on the way out.
pub struct SvgSurface<'a> {
    area: DrawingArea<SVGBackend<'a>, Shift>,
    width: f64,
    height: f64,
    scale: f64,
    error: Option<String>,
}

impl<'a> SvgSurface<'a> {
    pub fn new(buffer: &'a mut String, width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        let scale = if device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        let size = (
            (width * scale).round().max(1.0) as u32,
            (height * scale).round().max(1.0) as u32,
        );
        Self {
            area: SVGBackend::with_string(buffer, size).into_drawing_area(),
            width,
            height,
            scale,
            error: None,
        }
    }

    /// Flush the document into the buffer. Reports the first drawing error.
    pub fn finish(self) -> Result<(), SvgError> {
        if let Some(error) = self.error {
            return Err(SvgError::Drawing(error));
        }
        self.area
            .present()
            .map_err(|e| SvgError::Drawing(e.to_string()))
    }

    fn px(&self, point: Point) -> (i32, i32) {
        (
            (point.x * self.scale).round() as i32,
            (point.y * self.scale).round() as i32,
        )
    }

    fn pixels(&self, points: &[Point]) -> Vec<(i32, i32)> {
        points.iter().map(|p| self.px(*p)).collect()
    }

    fn stroke_style(&self, stroke: &Stroke) -> ShapeStyle {
        ShapeStyle {
            color: rgba(stroke.color),
            filled: false,
            stroke_width: (stroke.width * self.scale).round().max(1.0) as u32,
        }
    }

    fn note<E: Display>(&mut self, result: Result<(), E>) {
        if let Err(e) = result {
            self.error.get_or_insert_with(|| e.to_string());
        }
    }

    fn fill_solid(&mut self, points: &[Point], color: Color) {
        if points.len() < 3 {
            return;
        }
        let polygon = Polygon::new(self.pixels(points), filled(color));
        let result = self.area.draw(&polygon);
        self.note(result);
    }

    fn stroke_path(&mut self, points: &[Point], stroke: &Stroke) {
        let style = self.stroke_style(stroke);
        let dashes = match stroke.dash {
            Some((on, off)) => dash_segments(points, on, off),
            None => vec![points.to_vec()],
        };
        for dash in dashes.iter().filter(|dash| dash.len() >= 2) {
            let path = PathElement::new(self.pixels(dash), style);
            let result = self.area.draw(&path);
            self.note(result);
        }
    }
}

fn rgba(color: Color) -> RGBAColor {
    RGBAColor(color.r, color.g, color.b, color.a.clamp(0.0, 1.0))
}

fn filled(color: Color) -> ShapeStyle {
    ShapeStyle {
        color: rgba(color),
        filled: true,
        stroke_width: 0,
    }
}

fn mix(from: Color, to: Color, t: f64) -> Color {
    let channel = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    Color {
        r: channel(from.r, to.r),
        g: channel(from.g, to.g),
        b: channel(from.b, to.b),
        a: from.a + (to.a - from.a) * t,
    }
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

/// Clip a polygon to one side of a horizontal line.
fn clip_at(points: &[Point], edge: f64, keep_above: bool) -> Vec<Point> {
    let inside = |p: Point| if keep_above { p.y <= edge } else { p.y >= edge };
    let crossing = |a: Point, b: Point| lerp(a, b, (edge - a.y) / (b.y - a.y));

    let mut clipped = Vec::with_capacity(points.len() + 2);
    for (i, &current) in points.iter().enumerate() {
        let previous = points[(i + points.len() - 1) % points.len()];
        match (inside(previous), inside(current)) {
            (true, true) => clipped.push(current),
            (true, false) => clipped.push(crossing(previous, current)),
            (false, true) => {
                clipped.push(crossing(previous, current));
                clipped.push(current);
            }
            (false, false) => {}
        }
    }
    clipped
}

/// The part of a polygon between two horizontal lines, `top <= y <= bottom`.
fn clip_band(points: &[Point], top: f64, bottom: f64) -> Vec<Point> {
    clip_at(&clip_at(points, top, false), bottom, true)
}

/// Split a path into the visible runs of an on/off dash pattern.
fn dash_segments(points: &[Point], on: f64, off: f64) -> Vec<Vec<Point>> {
    if on <= 0.0 || off <= 0.0 {
        return vec![points.to_vec()];
    }
    let period = on + off;
    let mut dashes = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let mut phase = 0.0;

    for pair in points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let length = (b.x - a.x).hypot(b.y - a.y);
        let mut travelled = 0.0;
        while travelled < length {
            let drawing = phase < on;
            let boundary = if drawing { on } else { period };
            let step = (boundary - phase).min(length - travelled);
            let start = lerp(a, b, travelled / length);
            travelled += step;
            phase += step;

            if drawing {
                if current.is_empty() {
                    current.push(start);
                }
                current.push(lerp(a, b, travelled / length));
                if phase >= on {
                    dashes.push(std::mem::take(&mut current));
                }
            }
            if phase >= period {
                phase = 0.0;
            }
        }
    }
    if current.len() >= 2 {
        dashes.push(current);
    }
    dashes
}

impl Surface for SvgSurface<'_> {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        if rect.width <= 0.0 || rect.height <= 0.0 {
            return;
        }
        match paint {
            Paint::Solid(color) => {
                let corners = [
                    self.px(Point::new(rect.x, rect.y)),
                    self.px(Point::new(rect.right(), rect.bottom())),
                ];
                let result = self.area.draw(&Rectangle::new(corners, filled(*color)));
                self.note(result);
            }
            Paint::VerticalGradient { .. } => {
                let outline = [
                    Point::new(rect.x, rect.y),
                    Point::new(rect.right(), rect.y),
                    Point::new(rect.right(), rect.bottom()),
                    Point::new(rect.x, rect.bottom()),
                ];
                self.fill_polygon(&outline, paint);
            }
        }
    }

    fn stroke_line(&mut self, from: Point, to: Point, stroke: &Stroke) {
        self.stroke_path(&[from, to], stroke);
    }

    fn stroke_polyline(&mut self, points: &[Point], stroke: &Stroke) {
        if points.len() >= 2 {
            self.stroke_path(points, stroke);
        }
    }

    fn fill_polygon(&mut self, points: &[Point], paint: &Paint) {
        match *paint {
            Paint::Solid(color) => self.fill_solid(points, color),
            Paint::VerticalGradient {
                top,
                bottom,
                from,
                to,
            } => {
                let (lowest, highest) = points.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
                    (lo.min(p.y), hi.max(p.y))
                });
                if points.len() < 3 || highest <= lowest {
                    return;
                }
                let band = (highest - lowest) / GRADIENT_BANDS as f64;
                let span = bottom - top;
                for i in 0..GRADIENT_BANDS {
                    let upper = lowest + band * i as f64;
                    let middle = upper + band / 2.0;
                    let t = if span.abs() > f64::EPSILON {
                        ((middle - top) / span).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    let strip = clip_band(points, upper, upper + band);
                    self.fill_solid(&strip, mix(from, to, t));
                }
            }
        }
    }

    fn fill_circle(&mut self, center: Point, radius: f64, color: Color) {
        let radius = (radius * self.scale).round().max(1.0) as u32;
        let circle = Circle::new(self.px(center), radius, filled(color));
        let result = self.area.draw(&circle);
        self.note(result);
    }

    fn draw_text(&mut self, text: &str, at: Point, style: &TextStyle) {
        let h_pos = match style.align {
            TextAlign::Start => HPos::Left,
            TextAlign::Middle => HPos::Center,
            TextAlign::End => HPos::Right,
        };
        let font = ("sans-serif", style.size * self.scale)
            .into_font()
            .color(&rgba(style.color))
            .pos(Pos::new(h_pos, VPos::Bottom));
        let result = self.area.draw_text(text, &font, self.px(at));
        self.note(result);
    }
}

/// Run `draw` against a fresh SVG surface and return the finished document
/// with whatever `draw` produced.
pub fn render_svg<T>(
    width: f64,
    height: f64,
    device_pixel_ratio: f64,
    draw: impl FnOnce(&mut dyn Surface) -> T,
) -> Result<(String, T), SvgError> {
    let mut buffer = String::new();
    let mut surface = SvgSurface::new(&mut buffer, width, height, device_pixel_ratio);
    let output = draw(&mut surface);
    surface.finish()?;
    Ok((buffer, output))
}
