use super::base::{
    Geometry, fallback_color_leaves, fill_rule, gradient_scopes, paint_call, shape_paint,
    ShapePaint,
};
use super::{Content, ElementKind, marker};
use crate::document::Document;
use crate::error::{ElementResult, SkipElement};
use crate::length::Axis;
use crate::path::{PathCommand, Scanner, parse_path};
use crate::properties::Property;
use crate::state::State;
use crate::types::{Point, Rect};
use crate::xml::XmlElement;

// Control-point distance for a quarter circle of radius 1.
const KAPPA: f64 = 0.552_284_749_830_793_4;

pub(super) fn build_shape(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
    kind: ElementKind,
) -> ElementResult<Content> {
    let geometry = shape_geometry(element, state, kind)?;
    let bbox = geometry.bbox();
    let mut content = Content {
        calls: Vec::new(),
        bbox,
    };
    if !state.is_visible() {
        return Ok(content);
    }

    let fill = if kind == ElementKind::Line {
        ShapePaint::None
    } else {
        shape_paint(doc, state, Property::Fill)
    };
    let stroke = if state.stroke_width > 0.0 {
        shape_paint(doc, state, Property::Stroke)
    } else {
        ShapePaint::None
    };
    if fill.is_painted() || stroke.is_painted() {
        let mut inner = geometry.emit(None, doc.canvas_height);
        inner.push(paint_call(
            fill.is_painted(),
            stroke.is_painted(),
            fill_rule(state, Property::FillRule),
        ));
        content.calls.extend(fallback_color_leaves(&fill, &stroke));
        let area = bbox.unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
        content
            .calls
            .extend(gradient_scopes(&fill, &stroke, area, state, inner));
    }

    if matches!(
        kind,
        ElementKind::Path | ElementKind::Line | ElementKind::Polyline | ElementKind::Polygon
    ) {
        content
            .calls
            .extend(marker::build_markers(doc, state, &geometry.to_path()));
    }
    Ok(content)
}

/// Outline of a basic shape or path, in user space.
pub(super) fn shape_geometry(
    element: &XmlElement,
    state: &State,
    kind: ElementKind,
) -> ElementResult<Geometry> {
    let name = &element.name;
    match kind {
        ElementKind::Rect => {
            let x = state.length_or(element, "x", Axis::X, 0.0);
            let y = state.length_or(element, "y", Axis::Y, 0.0);
            let (Some(width), Some(height)) = (
                state.length(element, "width", Axis::X),
                state.length(element, "height", Axis::Y),
            ) else {
                return Err(SkipElement::warn(format!("<{name}> requires width and height")));
            };
            positive(name, "width", width)?;
            positive(name, "height", height)?;
            let rx = state.length(element, "rx", Axis::X).filter(|v| *v > 0.0);
            let ry = state.length(element, "ry", Axis::Y).filter(|v| *v > 0.0);
            let (rx, ry) = match (rx, ry) {
                (Some(rx), Some(ry)) => (rx, ry),
                (Some(r), None) | (None, Some(r)) => (r, r),
                (None, None) => (0.0, 0.0),
            };
            let rect = Rect::new(x, y, width, height);
            if rx <= 0.0 || ry <= 0.0 {
                return Ok(Geometry::Rect(rect));
            }
            Ok(Geometry::Path(rounded_rect(
                rect,
                rx.min(width / 2.0),
                ry.min(height / 2.0),
            )))
        }
        ElementKind::Circle => {
            let cx = state.length_or(element, "cx", Axis::X, 0.0);
            let cy = state.length_or(element, "cy", Axis::Y, 0.0);
            let Some(r) = state.length(element, "r", Axis::Diagonal) else {
                return Err(SkipElement::warn(format!("<{name}> requires r")));
            };
            positive(name, "r", r)?;
            Ok(Geometry::Path(ellipse(Point::new(cx, cy), r, r)))
        }
        ElementKind::Ellipse => {
            let cx = state.length_or(element, "cx", Axis::X, 0.0);
            let cy = state.length_or(element, "cy", Axis::Y, 0.0);
            let rx = state.length(element, "rx", Axis::X);
            let ry = state.length(element, "ry", Axis::Y);
            let (rx, ry) = match (rx, ry) {
                (Some(rx), Some(ry)) => (rx, ry),
                (Some(r), None) | (None, Some(r)) => (r, r),
                (None, None) => {
                    return Err(SkipElement::warn(format!("<{name}> requires rx or ry")));
                }
            };
            positive(name, "rx", rx)?;
            positive(name, "ry", ry)?;
            Ok(Geometry::Path(ellipse(Point::new(cx, cy), rx, ry)))
        }
        ElementKind::Line => {
            let from = Point::new(
                state.length_or(element, "x1", Axis::X, 0.0),
                state.length_or(element, "y1", Axis::Y, 0.0),
            );
            let to = Point::new(
                state.length_or(element, "x2", Axis::X, 0.0),
                state.length_or(element, "y2", Axis::Y, 0.0),
            );
            Ok(Geometry::Path(vec![
                PathCommand::MoveTo(from),
                PathCommand::LineTo(to),
            ]))
        }
        ElementKind::Polyline | ElementKind::Polygon => {
            let points = parse_points(element.attribute("points").unwrap_or(""));
            let Some((first, rest)) = points.split_first() else {
                return Err(SkipElement::Quiet);
            };
            let mut commands = vec![PathCommand::MoveTo(*first)];
            commands.extend(rest.iter().map(|p| PathCommand::LineTo(*p)));
            if kind == ElementKind::Polygon {
                commands.push(PathCommand::ClosePath);
            }
            Ok(Geometry::Path(commands))
        }
        ElementKind::Path => {
            let d = element.attribute("d").unwrap_or("").trim();
            if d.is_empty() {
                return Err(SkipElement::Quiet);
            }
            let commands = parse_path(d).map_err(|err| SkipElement::warn(format!("<path>: {err}")))?;
            if commands.is_empty() {
                return Err(SkipElement::Quiet);
            }
            Ok(Geometry::Path(commands))
        }
        _ => Err(SkipElement::Quiet),
    }
}

/// Zero is a quiet skip, negative a warned one.
fn positive(element: &str, attribute: &str, value: f64) -> ElementResult<()> {
    if value < 0.0 {
        return Err(SkipElement::warn(format!(
            "<{element}> has negative {attribute} ({value})"
        )));
    }
    if value == 0.0 {
        return Err(SkipElement::Quiet);
    }
    Ok(())
}

/// Coordinate pairs of a `points` attribute. A dangling odd coordinate is dropped, as is
/// everything after the first malformed number.
pub(super) fn parse_points(input: &str) -> Vec<Point> {
    let mut scanner = Scanner::new(input);
    let mut numbers = Vec::new();
    loop {
        scanner.skip_separators();
        if scanner.is_empty() {
            break;
        }
        match scanner.number() {
            Some(value) => numbers.push(value),
            None => break,
        }
    }
    numbers
        .chunks_exact(2)
        .map(|pair| Point::new(pair[0], pair[1]))
        .collect()
}

pub(super) fn ellipse(center: Point, rx: f64, ry: f64) -> Vec<PathCommand> {
    let (cx, cy) = (center.x, center.y);
    let (kx, ky) = (rx * KAPPA, ry * KAPPA);
    vec![
        PathCommand::MoveTo(Point::new(cx + rx, cy)),
        PathCommand::CurveTo(
            Point::new(cx + rx, cy + ky),
            Point::new(cx + kx, cy + ry),
            Point::new(cx, cy + ry),
        ),
        PathCommand::CurveTo(
            Point::new(cx - kx, cy + ry),
            Point::new(cx - rx, cy + ky),
            Point::new(cx - rx, cy),
        ),
        PathCommand::CurveTo(
            Point::new(cx - rx, cy - ky),
            Point::new(cx - kx, cy - ry),
            Point::new(cx, cy - ry),
        ),
        PathCommand::CurveTo(
            Point::new(cx + kx, cy - ry),
            Point::new(cx + rx, cy - ky),
            Point::new(cx + rx, cy),
        ),
        PathCommand::ClosePath,
    ]
}

fn rounded_rect(r: Rect, rx: f64, ry: f64) -> Vec<PathCommand> {
    let (x0, y0, x1, y1) = (r.x, r.y, r.x + r.width, r.y + r.height);
    let (kx, ky) = (rx * (1.0 - KAPPA), ry * (1.0 - KAPPA));
    vec![
        PathCommand::MoveTo(Point::new(x0 + rx, y0)),
        PathCommand::LineTo(Point::new(x1 - rx, y0)),
        PathCommand::CurveTo(
            Point::new(x1 - kx, y0),
            Point::new(x1, y0 + ky),
            Point::new(x1, y0 + ry),
        ),
        PathCommand::LineTo(Point::new(x1, y1 - ry)),
        PathCommand::CurveTo(
            Point::new(x1, y1 - ky),
            Point::new(x1 - kx, y1),
            Point::new(x1 - rx, y1),
        ),
        PathCommand::LineTo(Point::new(x0 + rx, y1)),
        PathCommand::CurveTo(
            Point::new(x0 + kx, y1),
            Point::new(x0, y1 - ky),
            Point::new(x0, y1 - ry),
        ),
        PathCommand::LineTo(Point::new(x0, y0 + ry)),
        PathCommand::CurveTo(
            Point::new(x0, y0 + ky),
            Point::new(x0 + kx, y0),
            Point::new(x0 + rx, y0),
        ),
        PathCommand::ClosePath,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(element: XmlElement, kind: ElementKind) -> ElementResult<Geometry> {
        let state = State::initial(100.0, 100.0).descend(&element);
        shape_geometry(&element, &state, kind)
    }

    #[test]
    fn rect_requirements() {
        let rect = XmlElement::new("rect")
            .with_attribute("width", "10")
            .with_attribute("height", "50%");
        assert_eq!(
            geometry(rect, ElementKind::Rect),
            Ok(Geometry::Rect(Rect::new(0.0, 0.0, 10.0, 50.0)))
        );
        let zero = XmlElement::new("rect")
            .with_attribute("width", "0")
            .with_attribute("height", "5");
        assert_eq!(geometry(zero, ElementKind::Rect), Err(SkipElement::Quiet));
        let missing = XmlElement::new("rect").with_attribute("width", "5");
        assert!(matches!(
            geometry(missing, ElementKind::Rect),
            Err(SkipElement::Warned(_))
        ));
    }

    #[test]
    fn rounded_corners_clamp_to_half_side() {
        let rect = XmlElement::new("rect")
            .with_attribute("width", "10")
            .with_attribute("height", "4")
            .with_attribute("rx", "3");
        let Ok(Geometry::Path(commands)) = geometry(rect, ElementKind::Rect) else {
            panic!("expected rounded path");
        };
        assert_eq!(commands[0], PathCommand::MoveTo(Point::new(3.0, 0.0)));
        // ry follows rx and is clamped to half the height.
        assert_eq!(commands[3], PathCommand::LineTo(Point::new(10.0, 2.0)));
    }

    #[test]
    fn circle_radius_rules() {
        let negative = XmlElement::new("circle").with_attribute("r", "-1");
        assert!(matches!(
            geometry(negative, ElementKind::Circle),
            Err(SkipElement::Warned(_))
        ));
        let circle = XmlElement::new("circle")
            .with_attribute("cx", "5")
            .with_attribute("cy", "5")
            .with_attribute("r", "5");
        let geometry = geometry(circle, ElementKind::Circle).expect("circle");
        assert_eq!(geometry.bbox(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn points_drop_odd_coordinate() {
        assert_eq!(
            parse_points("0,0 10,0 10 10 5"),
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)]
        );
        let polygon = XmlElement::new("polygon").with_attribute("points", "0,0 1,1");
        let Ok(Geometry::Path(commands)) = geometry(polygon, ElementKind::Polygon) else {
            panic!("expected path");
        };
        assert_eq!(commands.last(), Some(&PathCommand::ClosePath));
    }

    #[test]
    fn path_errors_are_warned() {
        let path = XmlElement::new("path").with_attribute("d", "L 1 1");
        assert!(matches!(
            geometry(path, ElementKind::Path),
            Err(SkipElement::Warned(_))
        ));
        let empty = XmlElement::new("path").with_attribute("d", " ");
        assert_eq!(geometry(empty, ElementKind::Path), Err(SkipElement::Quiet));
    }
}
