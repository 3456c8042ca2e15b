use crate::types::{Point, Rect};
use serde::Serialize;
use std::f64::consts::{FRAC_PI_2, PI};

/// Path segment in absolute user-space coordinates.
///
/// Quadratic curves and elliptical arcs never survive parsing: they are converted to cubic
/// Beziers, so consumers only ever see these four shapes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    ClosePath,
}

impl PathCommand {
    pub fn end_point(&self) -> Option<Point> {
        match *self {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) | PathCommand::CurveTo(_, _, p) => {
                Some(p)
            }
            PathCommand::ClosePath => None,
        }
    }

    pub fn map(self, f: impl Fn(Point) -> Point) -> PathCommand {
        match self {
            PathCommand::MoveTo(p) => PathCommand::MoveTo(f(p)),
            PathCommand::LineTo(p) => PathCommand::LineTo(f(p)),
            PathCommand::CurveTo(c1, c2, p) => PathCommand::CurveTo(f(c1), f(c2), f(p)),
            PathCommand::ClosePath => PathCommand::ClosePath,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("invalid character '{0}' in path data at offset {1}")]
    UnexpectedCharacter(char, usize),
    #[error("path data has missing or malformed arguments for command '{0}'")]
    MissingArguments(char),
    #[error("path data must begin with a moveto command")]
    MissingMoveTo,
}

// Radii below this are treated as zero, turning the arc into a straight line.
const ARC_RADIUS_EPSILON: f64 = 1e-10;
// A full ellipse needs four quarter segments; anything beyond is float noise.
const MAX_ARC_SEGMENTS: usize = 4;

/// Bounding box of the control polygon. Curves never leave it, which is all the gradient and
/// mask code needs.
pub fn bounding_box(commands: &[PathCommand]) -> Option<Rect> {
    Rect::from_points(commands.iter().flat_map(|command| match *command {
        PathCommand::MoveTo(p) | PathCommand::LineTo(p) => vec![p],
        PathCommand::CurveTo(c1, c2, p) => vec![c1, c2, p],
        PathCommand::ClosePath => Vec::new(),
    }))
}

pub fn parse_path(d: &str) -> Result<Vec<PathCommand>, PathError> {
    let mut parser = PathBuilder::default();
    let mut scanner = Scanner::new(d);
    let mut first = true;

    loop {
        scanner.skip_separators();
        let Some(byte) = scanner.peek() else {
            break;
        };
        let command = byte as char;
        if !command.is_ascii_alphabetic() {
            return Err(PathError::UnexpectedCharacter(command, scanner.offset()));
        }
        scanner.advance();
        if first && !matches!(command, 'M' | 'm') {
            return Err(PathError::MissingMoveTo);
        }
        first = false;
        parser.run(command, &mut scanner)?;
    }

    Ok(parser.commands)
}

#[derive(Default)]
struct PathBuilder {
    commands: Vec<PathCommand>,
    current: Point,
    subpath_start: Point,
    last_cubic_control: Option<Point>,
    last_quad_control: Option<Point>,
}

impl PathBuilder {
    fn run(&mut self, command: char, scanner: &mut Scanner<'_>) -> Result<(), PathError> {
        let relative = command.is_ascii_lowercase();
        let upper = command.to_ascii_uppercase();
        let arity = match upper {
            'M' | 'L' | 'T' => 2,
            'H' | 'V' => 1,
            'C' => 6,
            'S' | 'Q' => 4,
            'A' => 7,
            'Z' => 0,
            _ => {
                return Err(PathError::UnexpectedCharacter(
                    command,
                    scanner.offset().saturating_sub(1),
                ));
            }
        };

        if arity == 0 {
            self.close();
            return Ok(());
        }

        let mut groups = 0usize;
        loop {
            let args = if upper == 'A' {
                scanner.arc_arguments()
            } else {
                scanner.numbers(arity)
            };
            let Some(args) = args else {
                if groups == 0 {
                    return Err(scanner.argument_error(command));
                }
                break;
            };
            // A bare moveto followed by more pairs continues as lineto.
            let effective = if upper == 'M' && groups > 0 { 'L' } else { upper };
            self.apply(effective, relative, &args);
            groups += 1;

            scanner.skip_separators();
            match scanner.peek() {
                Some(b) if is_number_start(b) => continue,
                _ => break,
            }
        }
        Ok(())
    }

    fn absolute(&self, relative: bool, x: f64, y: f64) -> Point {
        if relative {
            Point::new(self.current.x + x, self.current.y + y)
        } else {
            Point::new(x, y)
        }
    }

    fn apply(&mut self, command: char, relative: bool, args: &[f64]) {
        match command {
            'M' => {
                let p = self.absolute(relative, args[0], args[1]);
                self.commands.push(PathCommand::MoveTo(p));
                self.current = p;
                self.subpath_start = p;
                self.reset_controls();
            }
            'L' => {
                let p = self.absolute(relative, args[0], args[1]);
                self.line_to(p);
            }
            'H' => {
                let x = if relative {
                    self.current.x + args[0]
                } else {
                    args[0]
                };
                self.line_to(Point::new(x, self.current.y));
            }
            'V' => {
                let y = if relative {
                    self.current.y + args[0]
                } else {
                    args[0]
                };
                self.line_to(Point::new(self.current.x, y));
            }
            'C' => {
                let c1 = self.absolute(relative, args[0], args[1]);
                let c2 = self.absolute(relative, args[2], args[3]);
                let p = self.absolute(relative, args[4], args[5]);
                self.cubic_to(c1, c2, p);
            }
            'S' => {
                let c1 = reflect(self.last_cubic_control, self.current);
                let c2 = self.absolute(relative, args[0], args[1]);
                let p = self.absolute(relative, args[2], args[3]);
                self.cubic_to(c1, c2, p);
            }
            'Q' => {
                let q = self.absolute(relative, args[0], args[1]);
                let p = self.absolute(relative, args[2], args[3]);
                self.quad_to(q, p);
            }
            'T' => {
                let q = reflect(self.last_quad_control, self.current);
                let p = self.absolute(relative, args[0], args[1]);
                self.quad_to(q, p);
            }
            'A' => {
                let p = self.absolute(relative, args[5], args[6]);
                let segments = arc_to_cubics(
                    self.current,
                    args[0],
                    args[1],
                    args[2],
                    args[3] != 0.0,
                    args[4] != 0.0,
                    p,
                );
                self.commands.extend(segments);
                self.current = p;
                self.reset_controls();
            }
            _ => {}
        }
    }

    fn line_to(&mut self, p: Point) {
        self.commands.push(PathCommand::LineTo(p));
        self.current = p;
        self.reset_controls();
    }

    fn cubic_to(&mut self, c1: Point, c2: Point, p: Point) {
        self.commands.push(PathCommand::CurveTo(c1, c2, p));
        self.current = p;
        self.last_cubic_control = Some(c2);
        self.last_quad_control = None;
    }

    fn quad_to(&mut self, q: Point, p: Point) {
        let (c1, c2) = quad_to_cubic(self.current, q, p);
        self.commands.push(PathCommand::CurveTo(c1, c2, p));
        self.current = p;
        self.last_quad_control = Some(q);
        self.last_cubic_control = None;
    }

    fn close(&mut self) {
        self.commands.push(PathCommand::ClosePath);
        self.current = self.subpath_start;
        self.reset_controls();
    }

    fn reset_controls(&mut self) {
        self.last_cubic_control = None;
        self.last_quad_control = None;
    }
}

fn reflect(control: Option<Point>, around: Point) -> Point {
    match control {
        Some(c) => Point::new(2.0 * around.x - c.x, 2.0 * around.y - c.y),
        None => around,
    }
}

fn quad_to_cubic(p0: Point, q: Point, p: Point) -> (Point, Point) {
    let c1 = Point::new(
        p0.x + (2.0 / 3.0) * (q.x - p0.x),
        p0.y + (2.0 / 3.0) * (q.y - p0.y),
    );
    let c2 = Point::new(
        p.x + (2.0 / 3.0) * (q.x - p.x),
        p.y + (2.0 / 3.0) * (q.y - p.y),
    );
    (c1, c2)
}

/// Endpoint-parameterized elliptical arc to cubic Beziers (SVG implementation notes F.6).
///
/// Identical endpoints produce nothing; a zero radius produces a straight line.
pub fn arc_to_cubics(
    from: Point,
    rx: f64,
    ry: f64,
    x_axis_rotation: f64,
    large_arc: bool,
    sweep: bool,
    to: Point,
) -> Vec<PathCommand> {
    if (from.x - to.x).abs() < f64::EPSILON && (from.y - to.y).abs() < f64::EPSILON {
        return Vec::new();
    }
    let mut rx = rx.abs();
    let mut ry = ry.abs();
    if rx < ARC_RADIUS_EPSILON || ry < ARC_RADIUS_EPSILON {
        return vec![PathCommand::LineTo(to)];
    }

    let phi = x_axis_rotation.to_radians();
    let (sin_phi, cos_phi) = (libm::sin(phi), libm::cos(phi));

    let dx2 = (from.x - to.x) / 2.0;
    let dy2 = (from.y - to.y) / 2.0;
    let x1p = cos_phi * dx2 + sin_phi * dy2;
    let y1p = -sin_phi * dx2 + cos_phi * dy2;

    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let s = libm::sqrt(lambda);
        rx *= s;
        ry *= s;
    }

    let rx2 = rx * rx;
    let ry2 = ry * ry;
    let num = rx2 * ry2 - rx2 * y1p * y1p - ry2 * x1p * x1p;
    let den = rx2 * y1p * y1p + ry2 * x1p * x1p;
    let mut coef = 0.0;
    if den != 0.0 {
        let sign = if large_arc == sweep { -1.0 } else { 1.0 };
        coef = sign * libm::sqrt((num / den).max(0.0));
    }
    let cxp = coef * (rx * y1p / ry);
    let cyp = coef * (-ry * x1p / rx);

    let cx = cos_phi * cxp - sin_phi * cyp + (from.x + to.x) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (from.y + to.y) / 2.0;

    let ux = (x1p - cxp) / rx;
    let uy = (y1p - cyp) / ry;
    let vx = (-x1p - cxp) / rx;
    let vy = (-y1p - cyp) / ry;

    let start_angle = vector_angle(1.0, 0.0, ux, uy);
    let mut sweep_angle = vector_angle(ux, uy, vx, vy);
    if !sweep && sweep_angle > 0.0 {
        sweep_angle -= 2.0 * PI;
    } else if sweep && sweep_angle < 0.0 {
        sweep_angle += 2.0 * PI;
    }

    let count = (libm::ceil(sweep_angle.abs() / FRAC_PI_2 - 1e-9).max(1.0) as usize)
        .min(MAX_ARC_SEGMENTS);
    let delta = sweep_angle / count as f64;
    let alpha = libm::sin(delta) * (libm::sqrt(4.0 + 3.0 * square(libm::tan(delta / 2.0))) - 1.0)
        / 3.0;

    let ellipse = |theta: f64| {
        let x = rx * libm::cos(theta);
        let y = ry * libm::sin(theta);
        Point::new(
            cx + cos_phi * x - sin_phi * y,
            cy + sin_phi * x + cos_phi * y,
        )
    };
    let derivative = |theta: f64| {
        let x = -rx * libm::sin(theta);
        let y = ry * libm::cos(theta);
        Point::new(cos_phi * x - sin_phi * y, sin_phi * x + cos_phi * y)
    };

    let mut out = Vec::with_capacity(count);
    let mut theta = start_angle;
    let mut start = from;
    for index in 0..count {
        let next = theta + delta;
        let end = if index + 1 == count { to } else { ellipse(next) };
        let d1 = derivative(theta);
        let d2 = derivative(next);
        let c1 = Point::new(start.x + alpha * d1.x, start.y + alpha * d1.y);
        let c2 = Point::new(end.x - alpha * d2.x, end.y - alpha * d2.y);
        out.push(PathCommand::CurveTo(c1, c2, end));
        theta = next;
        start = end;
    }
    out
}

fn vector_angle(ux: f64, uy: f64, vx: f64, vy: f64) -> f64 {
    let dot = ux * vx + uy * vy;
    let det = ux * vy - uy * vx;
    libm::atan2(det, dot)
}

fn square(v: f64) -> f64 {
    v * v
}

fn is_number_start(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.')
}

/// Byte scanner shared by the path, transform and list-attribute grammars.
pub(crate) struct Scanner<'a> {
    bytes: &'a [u8],
    i: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            i: 0,
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.i
    }

    pub(crate) fn peek(&self) -> Option<u8> {
        self.bytes.get(self.i).copied()
    }

    pub(crate) fn advance(&mut self) {
        self.i += 1;
    }

    pub(crate) fn is_empty(&mut self) -> bool {
        self.skip_separators();
        self.i >= self.bytes.len()
    }

    pub(crate) fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.i += 1;
            } else {
                break;
            }
        }
    }

    pub(crate) fn skip_separators(&mut self) {
        self.skip_whitespace();
        if self.peek() == Some(b',') {
            self.i += 1;
            self.skip_whitespace();
        }
    }

    pub(crate) fn number(&mut self) -> Option<f64> {
        self.skip_separators();
        let start = self.i;
        let mut digits = false;

        if matches!(self.peek(), Some(b'+' | b'-')) {
            self.i += 1;
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.i += 1;
            digits = true;
        }
        if self.peek() == Some(b'.') {
            self.i += 1;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.i += 1;
                digits = true;
            }
        }
        if digits && matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.i;
            self.i += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.i += 1;
            }
            let exponent_start = self.i;
            while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
                self.i += 1;
            }
            if exponent_start == self.i {
                self.i = mark;
            }
        }

        if !digits {
            self.i = start;
            return None;
        }
        let text = std::str::from_utf8(&self.bytes[start..self.i]).ok()?;
        text.parse::<f64>().ok()
    }

    fn numbers(&mut self, count: usize) -> Option<Vec<f64>> {
        let start = self.i;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            match self.number() {
                Some(v) => out.push(v),
                None => {
                    self.i = start;
                    return None;
                }
            }
        }
        Some(out)
    }

    /// Error for an argument group that failed to parse: a stray character inside the list is
    /// reported where it sits, running out of input is a missing argument.
    fn argument_error(&mut self, command: char) -> PathError {
        while self.number().is_some() {}
        self.skip_separators();
        match self.peek() {
            Some(b) if !b.is_ascii_alphabetic() => PathError::UnexpectedCharacter(b as char, self.i),
            _ => PathError::MissingArguments(command),
        }
    }

    // Arc flags may be written without separators ("a5 5 0 01 20 20").
    fn flag(&mut self) -> Option<f64> {
        self.skip_separators();
        match self.peek()? {
            b'0' => {
                self.i += 1;
                Some(0.0)
            }
            b'1' => {
                self.i += 1;
                Some(1.0)
            }
            _ => None,
        }
    }

    fn arc_arguments(&mut self) -> Option<Vec<f64>> {
        let start = self.i;
        let parsed = (|| {
            let rx = self.number()?;
            let ry = self.number()?;
            let rotation = self.number()?;
            let large = self.flag()?;
            let sweep = self.flag()?;
            let x = self.number()?;
            let y = self.number()?;
            Some(vec![rx, ry, rotation, large, sweep, x, y])
        })();
        if parsed.is_none() {
            self.i = start;
        }
        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(p: Point, x: f64, y: f64) -> bool {
        (p.x - x).abs() < 1e-6 && (p.y - y).abs() < 1e-6
    }

    #[test]
    fn parses_absolute_and_relative_lines() {
        let commands = parse_path("M 10 10 l 5 0 L 20 20 h -5 v 5 z").expect("valid path");
        assert_eq!(commands.len(), 6);
        assert!(matches!(commands[1], PathCommand::LineTo(p) if approx(p, 15.0, 10.0)));
        assert!(matches!(commands[3], PathCommand::LineTo(p) if approx(p, 15.0, 20.0)));
        assert!(matches!(commands[4], PathCommand::LineTo(p) if approx(p, 15.0, 25.0)));
        assert_eq!(commands[5], PathCommand::ClosePath);
    }

    #[test]
    fn implicit_lineto_after_moveto() {
        let commands = parse_path("m1 1 2 2 3 3").expect("valid path");
        assert_eq!(commands.len(), 3);
        assert!(matches!(commands[0], PathCommand::MoveTo(p) if approx(p, 1.0, 1.0)));
        assert!(matches!(commands[1], PathCommand::LineTo(p) if approx(p, 3.0, 3.0)));
        assert!(matches!(commands[2], PathCommand::LineTo(p) if approx(p, 6.0, 6.0)));
    }

    #[test]
    fn compact_number_syntax() {
        let commands = parse_path("M0,0L.5-.5-1.5e1,2").expect("valid path");
        assert!(matches!(commands[1], PathCommand::LineTo(p) if approx(p, 0.5, -0.5)));
        assert!(matches!(commands[2], PathCommand::LineTo(p) if approx(p, -15.0, 2.0)));
    }

    #[test]
    fn smooth_cubic_reflects_previous_control() {
        let commands = parse_path("M0 0 C 0 10 10 10 10 0 S 20 -10 20 0").expect("valid path");
        let PathCommand::CurveTo(c1, _, _) = commands[2] else {
            panic!("expected curve");
        };
        assert!(approx(c1, 10.0, -10.0));
    }

    #[test]
    fn smooth_cubic_without_previous_uses_current_point() {
        let commands = parse_path("M5 5 S 10 10 20 5").expect("valid path");
        let PathCommand::CurveTo(c1, c2, p) = commands[1] else {
            panic!("expected curve");
        };
        assert!(approx(c1, 5.0, 5.0));
        assert!(approx(c2, 10.0, 10.0));
        assert!(approx(p, 20.0, 5.0));
    }

    #[test]
    fn quadratic_promoted_to_cubic() {
        let commands = parse_path("M0 0 Q 30 30 60 0 T 120 0").expect("valid path");
        let PathCommand::CurveTo(c1, c2, p) = commands[1] else {
            panic!("expected curve");
        };
        assert!(approx(c1, 20.0, 20.0));
        assert!(approx(c2, 40.0, 20.0));
        assert!(approx(p, 60.0, 0.0));
        let PathCommand::CurveTo(c1, _, _) = commands[2] else {
            panic!("expected curve");
        };
        // Reflected quadratic control is (90,-30); first cubic control is 2/3 of the way.
        assert!(approx(c1, 80.0, -20.0));
    }

    #[test]
    fn arc_with_identical_endpoints_is_dropped() {
        let commands = parse_path("M 10 10 A 5 5 0 0 1 10 10").expect("valid path");
        assert_eq!(commands, vec![PathCommand::MoveTo(Point::new(10.0, 10.0))]);
    }

    #[test]
    fn arc_with_zero_radius_is_a_line() {
        let commands = parse_path("M 0 0 A 0 5 0 0 1 10 0").expect("valid path");
        assert_eq!(
            commands,
            vec![
                PathCommand::MoveTo(Point::new(0.0, 0.0)),
                PathCommand::LineTo(Point::new(10.0, 0.0)),
            ]
        );
    }

    #[test]
    fn semicircle_arc_splits_into_quarter_segments() {
        let commands = parse_path("M 0 0 A 10 10 0 0 1 20 0").expect("valid path");
        assert_eq!(commands.len(), 3);
        let PathCommand::CurveTo(c1, c2, mid) = commands[1] else {
            panic!("expected curve");
        };
        // Sweep flag 1 goes through the point above the chord in y-down space.
        assert!(approx(mid, 10.0, -10.0));
        // alpha = sin(90deg) * (sqrt(4 + 3 tan^2(45deg)) - 1) / 3, scaled by the radius.
        let k = 10.0 * (7.0f64.sqrt() - 1.0) / 3.0;
        assert!((c1.y + k).abs() < 1e-3 && c1.x.abs() < 1e-6);
        assert!((c2.x - (10.0 - k)).abs() < 1e-3);
        assert!(matches!(commands[2], PathCommand::CurveTo(_, _, p) if approx(p, 20.0, 0.0)));
    }

    #[test]
    fn small_radii_are_scaled_up() {
        let commands = parse_path("M 0 0 A 1 1 0 0 0 20 0").expect("valid path");
        let end = commands.last().and_then(PathCommand::end_point).expect("end point");
        assert!(approx(end, 20.0, 0.0));
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn compact_arc_flags() {
        let commands = parse_path("M10 10 a5 5 0 01 10 0").expect("valid path");
        assert!(commands.iter().any(|c| matches!(c, PathCommand::CurveTo(..))));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            parse_path("M 0 0 L 10 # 10"),
            Err(PathError::UnexpectedCharacter('#', 11))
        );
        assert_eq!(parse_path("L 10 10"), Err(PathError::MissingMoveTo));
        assert_eq!(parse_path("M 10"), Err(PathError::MissingArguments('M')));
        assert_eq!(parse_path("M 0 0 X 3"), Err(PathError::UnexpectedCharacter('X', 6)));
        assert_eq!(parse_path("M 0 0 L 10"), Err(PathError::MissingArguments('L')));
        assert_eq!(parse_path("M 0 0 L 10 Z"), Err(PathError::MissingArguments('L')));
    }

    #[test]
    fn commands_serialize_externally_tagged() {
        let commands = parse_path("M 1 2 C 0 0 1 1 2 2 Z").expect("valid path");
        let json = serde_json::to_value(&commands).expect("json");
        assert_eq!(
            json,
            serde_json::json!([
                { "move_to": { "x": 1.0, "y": 2.0 } },
                { "curve_to": [
                    { "x": 0.0, "y": 0.0 },
                    { "x": 1.0, "y": 1.0 },
                    { "x": 2.0, "y": 2.0 }
                ] },
                "close_path"
            ])
        );
    }

    #[test]
    fn closepath_returns_to_subpath_start() {
        let commands = parse_path("M 5 5 l 10 0 z l 0 10").expect("valid path");
        assert!(matches!(commands[3], PathCommand::LineTo(p) if approx(p, 5.0, 15.0)));
    }
}
