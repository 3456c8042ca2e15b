use fixed::types::I32F32;
use serde::Serialize;

/// Page-space coordinate quantized to thousandths of a point.
///
/// Recorded canvas output goes through `Pt` so that two replays of the same call tree compare
/// equal even when the floating-point path to a value differs.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f64(value: f64) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let milli = (value * 1000.0).round();
        let milli = milli.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        Pt::from_milli_i64(milli)
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_num()
    }

    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let scaled = bits * 1000;
        let adj = if scaled >= 0 { denom / 2 } else { -denom / 2 };
        let milli = (scaled + adj) / denom;
        milli.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn from_milli_i64(milli: i64) -> Pt {
        let milli = milli as i128;
        let denom = 1i128 << 32;
        let adj = if milli >= 0 { 500 } else { -500 };
        let bits = (milli * denom + adj) / 1000;
        let bits = bits.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Pt(I32F32::from_bits(bits))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_add(rhs.to_milli_i64()))
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_i64(self.to_milli_i64().saturating_sub(rhs.to_milli_i64()))
    }
}

impl std::fmt::Display for Pt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let milli = self.to_milli_i64();
        if milli % 1000 == 0 {
            write!(f, "{}", milli / 1000)
        } else {
            write!(f, "{}", milli as f64 / 1000.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in SVG user space (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Point>) -> Option<Rect> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if !min_x.is_finite() || !min_y.is_finite() || !max_x.is_finite() || !max_y.is_finite() {
            return None;
        }
        Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.x + self.width, self.y),
            Point::new(self.x + self.width, self.y + self.height),
            Point::new(self.x, self.y + self.height),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "space", rename_all = "lowercase")]
pub enum Color {
    Rgb { r: u8, g: u8, b: u8 },
    // Components in 0..=1.
    Cmyk { c: f64, m: f64, y: f64, k: f64 },
}

impl Color {
    pub const BLACK: Color = Color::Rgb { r: 0, g: 0, b: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color::Rgb { r, g, b }
    }

    pub fn cmyk(c: f64, m: f64, y: f64, k: f64) -> Self {
        Color::Cmyk {
            c: c.clamp(0.0, 1.0),
            m: m.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
            k: k.clamp(0.0, 1.0),
        }
    }

    /// Lowercase `rrggbb` for RGB colors, `c,m,y,k` percentages for CMYK.
    pub fn to_hex(&self) -> String {
        match *self {
            Color::Rgb { r, g, b } => format!("{r:02x}{g:02x}{b:02x}"),
            Color::Cmyk { c, m, y, k } => format!(
                "{},{},{},{}",
                (c * 100.0).round(),
                (m * 100.0).round(),
                (y * 100.0).round(),
                (k * 100.0).round()
            ),
        }
    }

    /// Components as fractions, in the color's own space.
    pub fn components(&self) -> Vec<f64> {
        match *self {
            Color::Rgb { r, g, b } => vec![r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0],
            Color::Cmyk { c, m, y, k } => vec![c, m, y, k],
        }
    }

    pub fn to_cmyk(&self) -> Color {
        match *self {
            Color::Rgb { r, g, b } => {
                let r = r as f64 / 255.0;
                let g = g as f64 / 255.0;
                let b = b as f64 / 255.0;
                let k = 1.0 - r.max(g).max(b);
                if k >= 1.0 {
                    return Color::cmyk(0.0, 0.0, 0.0, 1.0);
                }
                Color::cmyk(
                    (1.0 - r - k) / (1.0 - k),
                    (1.0 - g - k) / (1.0 - k),
                    (1.0 - b - k) / (1.0 - k),
                    k,
                )
            }
            cmyk => cmyk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl FillRule {
    pub fn parse(value: &str) -> FillRule {
        if value.trim().eq_ignore_ascii_case("evenodd") {
            FillRule::EvenOdd
        } else {
            FillRule::NonZero
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FillRule::NonZero => "nonzero",
            FillRule::EvenOdd => "evenodd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

impl LineCap {
    pub fn parse(value: &str) -> Option<LineCap> {
        match value.trim() {
            "butt" => Some(LineCap::Butt),
            "round" => Some(LineCap::Round),
            "square" => Some(LineCap::Square),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl LineJoin {
    pub fn parse(value: &str) -> Option<LineJoin> {
        match value.trim() {
            "miter" | "miter-clip" | "arcs" => Some(LineJoin::Miter),
            "round" => Some(LineJoin::Round),
            "bevel" => Some(LineJoin::Bevel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_rounds_to_thousandths() {
        assert_eq!(Pt::from_f64(1.23456).to_milli_i64(), 1235);
        assert_eq!((Pt::from_f64(1.5) + Pt::from_f64(2.25)).to_f64(), 3.75);
        assert_eq!(Pt::from_f64(f64::NAN), Pt::ZERO);
        assert_eq!(Pt::from_f64(90.0).to_string(), "90");
    }

    #[test]
    fn rgb_to_cmyk_conversion() {
        let Color::Cmyk { c, m, y, k } = Color::rgb(255, 0, 0).to_cmyk() else {
            panic!("expected cmyk");
        };
        assert!(c.abs() < 1e-9 && (m - 1.0).abs() < 1e-9 && (y - 1.0).abs() < 1e-9);
        assert!(k.abs() < 1e-9);
        assert_eq!(Color::BLACK.to_cmyk().to_hex(), "0,0,0,100");
    }

    #[test]
    fn bounding_rect_from_points() {
        let rect = Rect::from_points([Point::new(4.0, -1.0), Point::new(-2.0, 3.0)])
            .expect("non-empty");
        assert_eq!(rect, Rect::new(-2.0, -1.0, 6.0, 4.0));
        assert!(Rect::from_points(Vec::<Point>::new()).is_none());
    }
}
