use crate::gradient::{GradientGeometry, ResolvedGradient, Spread, Stop, Units};
use crate::matrix::Matrix;
use crate::types::{Color, ColorSpace, Point, Rect};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound on the copies a repeating or reflecting gradient is unrolled into.
pub const MAX_REPEAT_COUNT: i64 = 50;

static NEXT_PATTERN_ID: AtomicU64 = AtomicU64::new(1);

fn next_pattern_name() -> String {
    format!("SP{}", NEXT_PATTERN_ID.fetch_add(1, Ordering::Relaxed))
}

/// PDF function objects used by shadings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShadingFunction {
    /// Type 2, linear (`N = 1`) over domain `[0 1]`.
    Exponential { c0: Vec<f64>, c1: Vec<f64> },
    /// Type 3.
    Stitching {
        domain: [f64; 2],
        functions: Vec<ShadingFunction>,
        bounds: Vec<f64>,
        encode: Vec<[f64; 2]>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShadingGeometry {
    /// `x0 y0 x1 y1`
    Axial { coords: [f64; 4] },
    /// `x0 y0 r0 x1 y1 r1`
    Radial { coords: [f64; 6] },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Shading {
    pub geometry: ShadingGeometry,
    pub color_space: ColorSpace,
    pub domain: [f64; 2],
    pub extend: [bool; 2],
    pub function: ShadingFunction,
}

/// Shading placed in page space. `soft_mask` carries the stop opacities as a gray shading
/// with identical geometry when any stop is translucent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadingPattern {
    pub name: String,
    pub shading: Shading,
    pub matrix: Matrix,
    pub soft_mask: Option<Shading>,
}

/// What a gradient reference paints with.
#[derive(Debug, Clone, PartialEq)]
pub enum GradientPaint {
    /// No stops: the area is not painted.
    Nothing,
    /// One stop: flat color with its opacity.
    Solid(Color, f64),
    Pattern(ShadingPattern),
}

/// Builds the paint for `gradient` applied to an element whose user-space bounding box is
/// `bbox`. `user_to_page` maps that user space onto the page.
///
/// Returns `None` when the gradient cannot be mapped, e.g. a bounding-box gradient on a
/// zero-width or zero-height box.
pub fn build_gradient_paint(
    gradient: &ResolvedGradient,
    bbox: Rect,
    user_to_page: Matrix,
    cmyk: bool,
) -> Option<GradientPaint> {
    match gradient.stops.as_slice() {
        [] => return Some(GradientPaint::Nothing),
        [only] => return Some(GradientPaint::Solid(only.color, only.opacity)),
        _ => {}
    }
    // Normalized stops always gain an end copy, so a lone stop shows up twice.
    if gradient.stops.windows(2).all(|w| same_paint(&w[0], &w[1])) {
        let first = gradient.stops[0];
        return Some(GradientPaint::Solid(first.color, first.opacity));
    }

    let units = match gradient.units {
        Units::ObjectBoundingBox => {
            if bbox.width.abs() < f64::EPSILON || bbox.height.abs() < f64::EPSILON {
                return None;
            }
            Matrix::bounding_box(bbox.x, bbox.y, bbox.width, bbox.height)
        }
        Units::UserSpaceOnUse => Matrix::identity(),
    };
    let gradient_to_user = units.multiply(gradient.transform);
    let user_to_gradient = gradient_to_user.invert()?;
    let corners: Vec<Point> = bbox
        .corners()
        .iter()
        .map(|p| user_to_gradient.apply(*p))
        .collect();

    let (geometry, range) = match gradient.geometry {
        GradientGeometry::Linear { x1, y1, x2, y2 } => {
            let start = Point::new(x1, y1);
            let end = Point::new(x2, y2);
            if (x2 - x1).abs() < f64::EPSILON && (y2 - y1).abs() < f64::EPSILON {
                // Zero-length vector paints the last stop everywhere.
                let last = gradient.stops[gradient.stops.len() - 1];
                return Some(GradientPaint::Solid(last.color, last.opacity));
            }
            let range = match gradient.spread {
                Spread::Pad => (0, 1),
                _ => linear_repeat_range(start, end, &corners),
            };
            let (t0, t1) = (range.0 as f64, range.1 as f64);
            let coords = [
                x1 + t0 * (x2 - x1),
                y1 + t0 * (y2 - y1),
                x1 + t1 * (x2 - x1),
                y1 + t1 * (y2 - y1),
            ];
            (ShadingGeometry::Axial { coords }, range)
        }
        GradientGeometry::Radial {
            cx,
            cy,
            r,
            fx,
            fy,
            fr,
        } => {
            if r <= 0.0 {
                let last = gradient.stops[gradient.stops.len() - 1];
                return Some(GradientPaint::Solid(last.color, last.opacity));
            }
            let range = match gradient.spread {
                Spread::Pad => (0, 1),
                _ => (
                    0,
                    radial_repeat_extent(Point::new(fx, fy), fr, Point::new(cx, cy), r, &corners),
                ),
            };
            let t1 = range.1 as f64;
            let coords = [
                fx,
                fy,
                fr,
                fx + t1 * (cx - fx),
                fy + t1 * (cy - fy),
                fr + t1 * (r - fr),
            ];
            (ShadingGeometry::Radial { coords }, range)
        }
    };

    let color_space = if cmyk || gradient.stops.iter().any(|s| matches!(s.color, Color::Cmyk { .. })) {
        ColorSpace::Cmyk
    } else {
        ColorSpace::Rgb
    };
    let color_of = |stop: &Stop| match color_space {
        ColorSpace::Cmyk => stop.color.to_cmyk().components(),
        _ => stop.color.components(),
    };
    let shading = Shading {
        geometry,
        color_space,
        domain: [range.0 as f64, range.1 as f64],
        extend: [true, true],
        function: spread_function(stop_function(&gradient.stops, color_of), gradient.spread, range),
    };
    let soft_mask = gradient.stops.iter().any(|s| s.opacity < 1.0).then(|| Shading {
        color_space: ColorSpace::Gray,
        function: spread_function(
            stop_function(&gradient.stops, |s| vec![s.opacity]),
            gradient.spread,
            range,
        ),
        ..shading.clone()
    });

    Some(GradientPaint::Pattern(ShadingPattern {
        name: next_pattern_name(),
        shading,
        matrix: user_to_page.multiply(gradient_to_user),
        soft_mask,
    }))
}

fn same_paint(a: &Stop, b: &Stop) -> bool {
    a.color == b.color && (a.opacity - b.opacity).abs() < f64::EPSILON
}

/// One Type 2 segment per adjacent stop pair, stitched over `[0 1]` when there is more than one.
fn stop_function(stops: &[Stop], components: impl Fn(&Stop) -> Vec<f64>) -> ShadingFunction {
    let mut functions: Vec<ShadingFunction> = stops
        .windows(2)
        .map(|pair| ShadingFunction::Exponential {
            c0: components(&pair[0]),
            c1: components(&pair[1]),
        })
        .collect();
    if functions.len() == 1 {
        return functions.remove(0);
    }
    let bounds = stops[1..stops.len() - 1]
        .iter()
        .map(|s| s.offset)
        .collect();
    ShadingFunction::Stitching {
        domain: [0.0, 1.0],
        encode: vec![[0.0, 1.0]; functions.len()],
        functions,
        bounds,
    }
}

/// Unrolls `base` over the integer interval `range`, flipping odd copies for reflect.
fn spread_function(base: ShadingFunction, spread: Spread, range: (i64, i64)) -> ShadingFunction {
    let (start, end) = range;
    if spread == Spread::Pad || (start, end) == (0, 1) {
        return base;
    }
    let count = (end - start).max(1);
    let encode = (start..start + count)
        .map(|k| {
            if spread == Spread::Reflect && k.rem_euclid(2) == 1 {
                [1.0, 0.0]
            } else {
                [0.0, 1.0]
            }
        })
        .collect();
    ShadingFunction::Stitching {
        domain: [start as f64, end as f64],
        functions: vec![base; count as usize],
        bounds: (start + 1..end).map(|k| k as f64).collect(),
        encode,
    }
}

/// Integer parameter interval covering every corner projected onto the gradient vector,
/// always containing `0..1` and never wider than [`MAX_REPEAT_COUNT`].
pub fn linear_repeat_range(start: Point, end: Point, corners: &[Point]) -> (i64, i64) {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;
    if length_sq <= f64::EPSILON {
        return (0, 1);
    }
    let mut t_min = 0.0f64;
    let mut t_max = 1.0f64;
    for corner in corners {
        let t = ((corner.x - start.x) * dx + (corner.y - start.y) * dy) / length_sq;
        if t.is_finite() {
            t_min = t_min.min(t);
            t_max = t_max.max(t);
        }
    }
    clamp_range(t_min.floor() as i64, t_max.ceil() as i64)
}

fn clamp_range(start: i64, end: i64) -> (i64, i64) {
    if end.saturating_sub(start) <= MAX_REPEAT_COUNT {
        return (start, end);
    }
    let start = start.max(-(MAX_REPEAT_COUNT / 2));
    (start, start + MAX_REPEAT_COUNT)
}

/// Smallest integer `t >= 1` such that the circle interpolated at `t` between the focal
/// circle and the outer circle reaches every corner.
pub fn radial_repeat_extent(
    focus: Point,
    focal_radius: f64,
    center: Point,
    radius: f64,
    corners: &[Point],
) -> i64 {
    let cdx = center.x - focus.x;
    let cdy = center.y - focus.y;
    let dr = radius - focal_radius;
    let a = cdx * cdx + cdy * cdy - dr * dr;
    let mut t_max = 1.0f64;
    for corner in corners {
        let px = corner.x - focus.x;
        let py = corner.y - focus.y;
        let b = px * cdx + py * cdy + focal_radius * dr;
        let c = px * px + py * py - focal_radius * focal_radius;
        let t = if a.abs() < 1e-12 {
            if b.abs() < 1e-12 {
                continue;
            }
            c / (2.0 * b)
        } else {
            let discriminant = b * b - a * c;
            if discriminant < 0.0 {
                continue;
            }
            let root = libm::sqrt(discriminant);
            ((b + root) / a).max((b - root) / a)
        };
        if t.is_finite() {
            t_max = t_max.max(t);
        }
    }
    (t_max.ceil() as i64).clamp(1, MAX_REPEAT_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(offset: f64, color: Color, opacity: f64) -> Stop {
        Stop {
            offset,
            color,
            opacity,
        }
    }

    fn linear(spread: Spread, stops: Vec<Stop>) -> ResolvedGradient {
        ResolvedGradient {
            geometry: GradientGeometry::Linear {
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 0.0,
            },
            units: Units::ObjectBoundingBox,
            spread,
            transform: Matrix::identity(),
            stops,
        }
    }

    #[test]
    fn repeat_count_covers_box_and_is_capped() {
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(3.4, 0.0),
            Point::new(3.4, 1.0),
            Point::new(0.0, 1.0),
        ];
        let (start, end) = linear_repeat_range(Point::new(0.0, 0.0), Point::new(1.0, 0.0), &corners);
        let count = end - start;
        assert!((4..=50).contains(&count), "count {count}");

        let far = [Point::new(-1000.0, 0.0), Point::new(1000.0, 0.0)];
        let (start, end) = linear_repeat_range(Point::new(0.0, 0.0), Point::new(1.0, 0.0), &far);
        assert_eq!(end - start, MAX_REPEAT_COUNT);
    }

    #[test]
    fn extreme_corners_stay_within_the_cap() {
        let corners = [Point::new(-1e300, 0.0), Point::new(1e300, 0.0)];
        let (start, end) = linear_repeat_range(Point::new(0.0, 0.0), Point::new(1.0, 0.0), &corners);
        assert_eq!(end - start, MAX_REPEAT_COUNT);
        assert_eq!(start, -(MAX_REPEAT_COUNT / 2));
    }

    #[test]
    fn radial_extent_reaches_corners() {
        let corners = [Point::new(3.0, 0.0), Point::new(0.0, -2.5)];
        let t = radial_repeat_extent(Point::new(0.0, 0.0), 0.0, Point::new(0.0, 0.0), 1.0, &corners);
        assert_eq!(t, 3);
    }

    #[test]
    fn stitched_pad_function_uses_interior_bounds() {
        let red = Color::rgb(255, 0, 0);
        let blue = Color::rgb(0, 0, 255);
        let gradient = linear(
            Spread::Pad,
            vec![stop(0.0, red, 1.0), stop(0.3, blue, 1.0), stop(1.0, red, 1.0)],
        );
        let paint = build_gradient_paint(&gradient, Rect::new(0.0, 0.0, 10.0, 20.0), Matrix::identity(), false)
            .expect("paint");
        let GradientPaint::Pattern(pattern) = paint else {
            panic!("expected pattern");
        };
        assert!(pattern.name.starts_with("SP"));
        assert!(pattern.soft_mask.is_none());
        assert_eq!(pattern.matrix, Matrix::bounding_box(0.0, 0.0, 10.0, 20.0));
        let ShadingFunction::Stitching { bounds, functions, .. } = &pattern.shading.function else {
            panic!("expected stitching");
        };
        assert_eq!(bounds, &vec![0.3]);
        assert_eq!(functions.len(), 2);
    }

    #[test]
    fn reflect_alternates_encode_and_translucency_adds_mask() {
        let gradient = ResolvedGradient {
            units: Units::UserSpaceOnUse,
            ..linear(
                Spread::Reflect,
                vec![
                    stop(0.0, Color::rgb(0, 0, 0), 1.0),
                    stop(1.0, Color::rgb(255, 255, 255), 0.5),
                ],
            )
        };
        let paint = build_gradient_paint(&gradient, Rect::new(0.0, 0.0, 3.0, 1.0), Matrix::identity(), false)
            .expect("paint");
        let GradientPaint::Pattern(pattern) = paint else {
            panic!("expected pattern");
        };
        assert_eq!(pattern.shading.domain, [0.0, 3.0]);
        assert_eq!(pattern.shading.geometry, ShadingGeometry::Axial { coords: [0.0, 0.0, 3.0, 0.0] });
        let ShadingFunction::Stitching { encode, bounds, .. } = &pattern.shading.function else {
            panic!("expected stitching");
        };
        assert_eq!(encode, &vec![[0.0, 1.0], [1.0, 0.0], [0.0, 1.0]]);
        assert_eq!(bounds, &vec![1.0, 2.0]);
        let mask = pattern.soft_mask.expect("soft mask");
        assert_eq!(mask.color_space, ColorSpace::Gray);
    }

    #[test]
    fn degenerate_inputs() {
        let gradient = linear(
            Spread::Pad,
            vec![stop(0.0, Color::BLACK, 1.0), stop(1.0, Color::rgb(1, 2, 3), 1.0)],
        );
        assert!(build_gradient_paint(&gradient, Rect::new(0.0, 0.0, 0.0, 5.0), Matrix::identity(), false).is_none());
        assert_eq!(
            build_gradient_paint(&linear(Spread::Pad, vec![]), Rect::new(0.0, 0.0, 1.0, 1.0), Matrix::identity(), false),
            Some(GradientPaint::Nothing)
        );
    }
}
