// Drawing surface abstraction used by the chart renderer

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(self, a: f64) -> Self {
        Self { a, ..self }
    }

    /// Parse `#rrggbb` as used by the catalog's display colors.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    Solid(Color),
    /// Linear gradient from `top` to `bottom` in surface coordinates.
    VerticalGradient {
        top: f64,
        bottom: f64,
        from: Color,
        to: Color,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f64,
    pub dash: Option<(f64, f64)>,
}

impl Stroke {
    pub const fn solid(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub color: Color,
    pub size: f64,
    pub align: TextAlign,
}

/// Immediate-mode 2D drawing target. Coordinates are logical pixels; the
/// implementation owns device pixel ratio and output format.
pub trait Surface {
    /// Logical width and height.
    fn size(&self) -> (f64, f64);
    fn fill_rect(&mut self, rect: Rect, paint: &Paint);
    fn stroke_line(&mut self, from: Point, to: Point, stroke: &Stroke);
    fn stroke_polyline(&mut self, points: &[Point], stroke: &Stroke);
    fn fill_polygon(&mut self, points: &[Point], paint: &Paint);
    fn fill_circle(&mut self, center: Point, radius: f64, color: Color);
    fn draw_text(&mut self, text: &str, at: Point, style: &TextStyle);
}

#[cfg(test)]
pub use recording::{DrawOp, RecordingSurface};
