use crate::types::Point;
use serde::Serialize;

/// 2D affine transform.
///
/// Stored as the six variable entries of the homogeneous matrix
///
/// ```text
/// | a c e |
/// | b d f |
/// | 0 0 1 |
/// ```
///
/// so the bottom row is always `[0 0 1]`. `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub const fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotate(degrees: f64) -> Self {
        let rad = degrees.to_radians();
        let s = libm::sin(rad);
        let c = libm::cos(rad);
        Self::new(c, s, -s, c, 0.0, 0.0)
    }

    pub fn skew_x(degrees: f64) -> Self {
        Self::new(1.0, 0.0, libm::tan(degrees.to_radians()), 1.0, 0.0, 0.0)
    }

    pub fn skew_y(degrees: f64) -> Self {
        Self::new(1.0, libm::tan(degrees.to_radians()), 0.0, 1.0, 0.0, 0.0)
    }

    /// Maps the unit square onto `rect`.
    pub fn bounding_box(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(width, 0.0, 0.0, height, x, y)
    }

    pub fn from_array(values: [f64; 6]) -> Self {
        Self::new(
            values[0], values[1], values[2], values[3], values[4], values[5],
        )
    }

    pub fn to_array(self) -> [f64; 6] {
        [self.a, self.b, self.c, self.d, self.e, self.f]
    }

    /// `self * other`: `other` is applied to a point first.
    pub fn multiply(self, other: Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(self, point: Point) -> Point {
        Point::new(
            self.a * point.x + self.c * point.y + self.e,
            self.b * point.x + self.d * point.y + self.f,
        )
    }

    pub fn determinant(self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn invert(self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        Some(Self {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    pub fn is_identity(self) -> bool {
        self.approx_eq(Self::identity(), 1e-12)
    }

    pub fn approx_eq(self, other: Self, epsilon: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(l, r)| (l - r).abs() <= epsilon)
    }

    /// Geometric mean scale, used for lengths that are not tied to an axis.
    pub fn scale_factor(self) -> f64 {
        libm::sqrt(self.determinant().abs())
    }

    /// Re-expresses a y-down SVG transform in the y-up canvas space whose origin sits
    /// `height` units below the SVG origin: `F * self * F` with `F = (x, height - y)`.
    pub fn to_canvas_space(self, height: f64) -> Self {
        let flip = Self::new(1.0, 0.0, 0.0, -1.0, 0.0, height);
        flip.multiply(self).multiply(flip)
    }

    /// Moves a transform expressed relative to `origin` into absolute page space.
    pub fn rehome(self, origin: Point) -> Self {
        let (left, bottom) = (origin.x, origin.y);
        Self {
            e: self.e + left - (left * self.a + bottom * self.c),
            f: self.f + bottom - (left * self.b + bottom * self.d),
            ..self
        }
    }
}
