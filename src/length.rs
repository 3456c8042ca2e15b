use serde::Serialize;

/// Which viewport dimension a percentage resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    /// `sqrt(w² + h²) / sqrt(2)`, for lengths not tied to an axis (radius, stroke width).
    Diagonal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    None,
    Px,
    Pt,
    Pc,
    Mm,
    Cm,
    In,
    Em,
    Rem,
    Ex,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Length {
    pub value: f64,
    pub unit: Unit,
}

/// Everything relative units need at the point a length is resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthContext {
    pub font_size: f64,
    pub root_font_size: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl Default for LengthContext {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            root_font_size: DEFAULT_FONT_SIZE,
            viewport_width: 0.0,
            viewport_height: 0.0,
        }
    }
}

pub const DEFAULT_FONT_SIZE: f64 = 16.0;

impl LengthContext {
    pub fn diagonal(&self) -> f64 {
        libm::sqrt(self.viewport_width.powi(2) + self.viewport_height.powi(2))
            / std::f64::consts::SQRT_2
    }

    fn reference(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.viewport_width,
            Axis::Y => self.viewport_height,
            Axis::Diagonal => self.diagonal(),
        }
    }
}

impl Length {
    pub const ZERO: Length = Length {
        value: 0.0,
        unit: Unit::None,
    };

    pub const fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    pub fn parse(input: &str) -> Option<Length> {
        let s = input.trim();
        if s.is_empty() {
            return None;
        }
        let split = number_prefix_len(s)?;
        let (number, suffix) = s.split_at(split);
        let value = number.parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        let unit = match suffix.trim().to_ascii_lowercase().as_str() {
            "" => Unit::None,
            "px" => Unit::Px,
            "pt" => Unit::Pt,
            "pc" => Unit::Pc,
            "mm" => Unit::Mm,
            "cm" => Unit::Cm,
            "in" => Unit::In,
            "em" => Unit::Em,
            "rem" => Unit::Rem,
            "ex" => Unit::Ex,
            "%" => Unit::Percent,
            _ => return None,
        };
        Some(Length { value, unit })
    }

    pub fn resolve(&self, ctx: &LengthContext, axis: Axis) -> f64 {
        match self.unit {
            Unit::None | Unit::Px | Unit::Pt => self.value,
            Unit::Pc => self.value * 15.0,
            Unit::Mm => self.value * 3.543307,
            Unit::Cm => self.value * 35.43307,
            Unit::In => self.value * 90.0,
            Unit::Em => self.value * ctx.font_size,
            Unit::Rem => self.value * ctx.root_font_size,
            Unit::Ex => self.value * ctx.font_size / 2.0,
            Unit::Percent => self.value / 100.0 * ctx.reference(axis),
        }
    }

    pub fn is_percent(&self) -> bool {
        self.unit == Unit::Percent
    }
}

/// Parses and resolves in one step; `None` for absent or invalid input.
pub fn resolve_length(input: Option<&str>, ctx: &LengthContext, axis: Axis) -> Option<f64> {
    Length::parse(input?).map(|length| length.resolve(ctx, axis))
}

/// Number or percentage in `0..=1` terms, as used by opacities and gradient stop offsets.
pub fn parse_fraction(input: &str) -> Option<f64> {
    let s = input.trim();
    let value = if let Some(percent) = s.strip_suffix('%') {
        percent.trim().parse::<f64>().ok()? / 100.0
    } else {
        s.parse::<f64>().ok()?
    };
    value.is_finite().then_some(value)
}

fn number_prefix_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let mut digits = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
        digits = true;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
            digits = true;
        }
    }
    if !digits {
        return None;
    }
    // Exponent, but not the "e" of "em"/"ex".
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }
    Some(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> LengthContext {
        LengthContext {
            font_size: 10.0,
            root_font_size: 12.0,
            viewport_width: 200.0,
            viewport_height: 100.0,
        }
    }

    #[test]
    fn absolute_units() {
        let c = ctx();
        assert_eq!(Length::parse("12").map(|l| l.resolve(&c, Axis::X)), Some(12.0));
        assert_eq!(Length::parse("1in").map(|l| l.resolve(&c, Axis::X)), Some(90.0));
        assert_eq!(Length::parse("2pc").map(|l| l.resolve(&c, Axis::X)), Some(30.0));
        let cm = Length::parse("1cm").map(|l| l.resolve(&c, Axis::X)).unwrap_or(0.0);
        assert!((cm - 35.43307).abs() < 1e-9);
    }

    #[test]
    fn relative_units() {
        let c = ctx();
        assert_eq!(resolve_length(Some("2em"), &c, Axis::X), Some(20.0));
        assert_eq!(resolve_length(Some("1rem"), &c, Axis::X), Some(12.0));
        assert_eq!(resolve_length(Some("1ex"), &c, Axis::X), Some(5.0));
        assert_eq!(resolve_length(Some("1e1ex"), &c, Axis::X), Some(50.0));
        assert_eq!(resolve_length(Some("50%"), &c, Axis::X), Some(100.0));
        assert_eq!(resolve_length(Some("50%"), &c, Axis::Y), Some(50.0));
        let diag = resolve_length(Some("100%"), &c, Axis::Diagonal).unwrap_or(0.0);
        assert!((diag - libm::sqrt(50000.0) / std::f64::consts::SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid() {
        assert!(Length::parse("").is_none());
        assert!(Length::parse("abc").is_none());
        assert!(Length::parse("10furlongs").is_none());
        assert!(resolve_length(None, &ctx(), Axis::X).is_none());
    }

    #[test]
    fn fractions() {
        assert_eq!(parse_fraction("50%"), Some(0.5));
        assert_eq!(parse_fraction(" .25 "), Some(0.25));
        assert_eq!(parse_fraction("x"), None);
    }
}
