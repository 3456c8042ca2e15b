use super::base::Geometry;
use super::build_children;
use super::clip::clip_call;
use crate::call::{Arg, Call, Op};
use crate::color::parse_url_ref;
use crate::document::Document;
use crate::length::Axis;
use crate::matrix::Matrix;
use crate::path::PathCommand;
use crate::properties::Property;
use crate::sizing::{AspectRatio, Sizing, SizingRequest, ViewBox};
use crate::state::State;
use crate::types::{Point, Rect};

/// Path vertex with the directions (degrees, user space) of its adjacent segments.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Vertex {
    point: Point,
    incoming: Option<f64>,
    outgoing: Option<f64>,
}

impl Vertex {
    fn new(point: Point, incoming: Option<f64>) -> Self {
        Self {
            point,
            incoming,
            outgoing: None,
        }
    }

    /// Bisector of the two directions where both exist.
    fn angle(&self) -> f64 {
        match (self.incoming, self.outgoing) {
            (Some(a), Some(b)) => {
                let (a, b) = (a.to_radians(), b.to_radians());
                libm::atan2(a.sin() + b.sin(), a.cos() + b.cos()).to_degrees()
            }
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => 0.0,
        }
    }
}

fn direction(from: Point, to: Point) -> Option<f64> {
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    (dx.abs() > 1e-12 || dy.abs() > 1e-12).then(|| libm::atan2(dy, dx).to_degrees())
}

fn vertices(commands: &[PathCommand]) -> Vec<Vertex> {
    let mut out: Vec<Vertex> = Vec::new();
    let mut current = Point::new(0.0, 0.0);
    let mut subpath_start = 0usize;
    for command in commands {
        match *command {
            PathCommand::MoveTo(p) => {
                subpath_start = out.len();
                out.push(Vertex::new(p, None));
                current = p;
            }
            PathCommand::LineTo(p) => {
                let dir = direction(current, p);
                if let Some(last) = out.last_mut() {
                    last.outgoing = last.outgoing.or(dir);
                }
                out.push(Vertex::new(p, dir));
                current = p;
            }
            PathCommand::CurveTo(c1, c2, p) => {
                let start = direction(current, c1)
                    .or_else(|| direction(current, c2))
                    .or_else(|| direction(current, p));
                let end = direction(c2, p)
                    .or_else(|| direction(c1, p))
                    .or_else(|| direction(current, p));
                if let Some(last) = out.last_mut() {
                    last.outgoing = last.outgoing.or(start);
                }
                out.push(Vertex::new(p, end));
                current = p;
            }
            PathCommand::ClosePath => {
                let Some(first) = out.get(subpath_start).copied() else {
                    continue;
                };
                let dir = direction(current, first.point);
                if let Some(last) = out.last_mut() {
                    last.outgoing = last.outgoing.or(dir);
                }
                let mut closing = Vertex::new(first.point, dir.or(out.last().and_then(|v| v.incoming)));
                closing.outgoing = first.outgoing;
                out.push(closing);
                out[subpath_start].incoming = closing.incoming;
                current = first.point;
            }
        }
    }
    out
}

/// Marker instances for a path's `marker-start`, `marker-mid` and `marker-end`.
pub(super) fn build_markers(doc: &mut Document<'_>, state: &State, commands: &[PathCommand]) -> Vec<Call> {
    if state.inside_clip_path {
        return Vec::new();
    }
    let references = [Property::MarkerStart, Property::MarkerMid, Property::MarkerEnd]
        .map(|property| parse_url_ref(state.value(property)));
    if references.iter().all(Option::is_none) {
        return Vec::new();
    }
    let vertices = vertices(commands);
    let Some(last) = vertices.len().checked_sub(1) else {
        return Vec::new();
    };

    let mut calls = Vec::new();
    for (index, vertex) in vertices.iter().enumerate() {
        let (slot, is_start) = match index {
            0 => (0, true),
            i if i == last => (2, false),
            _ => (1, false),
        };
        let Some(id) = &references[slot] else {
            continue;
        };
        calls.extend(marker_instance(doc, state, id, vertex, is_start));
    }
    calls
}

fn marker_instance(
    doc: &mut Document<'_>,
    state: &State,
    id: &str,
    vertex: &Vertex,
    is_start: bool,
) -> Option<Call> {
    let marker = match doc.element(id) {
        Some(marker) if marker.name == "marker" => marker,
        _ => {
            doc.warn(format!("marker reference '{id}' does not name a <marker>"));
            return None;
        }
    };
    let guard = format!("marker:{id}");
    if doc.use_stack.contains(&guard) {
        doc.warn(format!("marker '{id}' is recursive"));
        return None;
    }

    let marker_state = State::initial(state.viewport_width, state.viewport_height).descend(&marker);
    let width = marker_state.length_or(&marker, "markerWidth", Axis::X, 3.0);
    let height = marker_state.length_or(&marker, "markerHeight", Axis::Y, 3.0);
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    let view_box = marker.attribute("viewBox").and_then(ViewBox::parse);
    let sizing = Sizing::compute(&SizingRequest {
        container_width: width,
        container_height: height,
        width: Some(width),
        height: Some(height),
        view_box,
        aspect: marker
            .attribute("preserveAspectRatio")
            .map(AspectRatio::parse)
            .unwrap_or_default(),
        ..SizingRequest::default()
    });
    if !sizing.is_valid() {
        return None;
    }

    let angle = match marker.attribute("orient").map(str::trim) {
        Some("auto") => vertex.angle(),
        Some("auto-start-reverse") if is_start => vertex.angle() + 180.0,
        Some("auto-start-reverse") => vertex.angle(),
        Some(value) => parse_angle(value).unwrap_or(0.0),
        None => 0.0,
    };
    let scale = match marker.attribute("markerUnits") {
        Some("userSpaceOnUse") => 1.0,
        _ => state.stroke_width,
    };
    let reference = sizing.transform.apply(Point::new(
        marker_state.length_or(&marker, "refX", Axis::X, 0.0),
        marker_state.length_or(&marker, "refY", Axis::Y, 0.0),
    ));
    let placement = Matrix::translate(vertex.point.x, vertex.point.y)
        .multiply(Matrix::rotate(angle))
        .multiply(Matrix::scale(scale, scale))
        .multiply(Matrix::translate(-reference.x, -reference.y))
        .multiply(sizing.transform);

    let content_state = marker_state.with_viewport(sizing.viewport_width, sizing.viewport_height);
    doc.use_stack.push(guard);
    let content = build_children(doc, &marker, &content_state);
    doc.use_stack.pop();
    if content.calls.is_empty() {
        return None;
    }

    let mut body = content.calls;
    if !content_state.overflows() {
        if let Some(inverse) = sizing.transform.invert() {
            let mut clip = clip_call(
                &Geometry::Rect(Rect::new(0.0, 0.0, width, height)),
                Some(inverse),
                doc.canvas_height,
            );
            clip.children = body;
            body = vec![clip];
        }
    }
    let mut call = Call::new(Op::TransformationMatrix)
        .arg(Arg::Matrix(placement.to_canvas_space(doc.canvas_height)));
    call.children = body;
    Some(call)
}

/// `orient` angle in degrees; accepts `deg`, `rad`, `grad` and `turn` units.
fn parse_angle(value: &str) -> Option<f64> {
    let (number, factor) = [
        ("deg", 1.0),
        ("grad", 0.9),
        ("rad", 180.0 / std::f64::consts::PI),
        ("turn", 360.0),
    ]
    .iter()
    .find_map(|(unit, factor)| value.strip_suffix(unit).map(|n| (n, *factor)))
    .unwrap_or((value, 1.0));
    number.trim().parse::<f64>().ok().map(|n| n * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::xml::{XmlElement, parse_document};

    #[test]
    fn corner_vertex_uses_bisector() {
        let path = [
            PathCommand::MoveTo(Point::new(0.0, 0.0)),
            PathCommand::LineTo(Point::new(10.0, 0.0)),
            PathCommand::LineTo(Point::new(10.0, 10.0)),
        ];
        let vs = vertices(&path);
        assert_eq!(vs.len(), 3);
        assert_eq!(vs[0].angle(), 0.0);
        assert!((vs[1].angle() - 45.0).abs() < 1e-9);
        assert!((vs[2].angle() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn closed_subpath_adds_closing_vertex() {
        let path = [
            PathCommand::MoveTo(Point::new(0.0, 0.0)),
            PathCommand::LineTo(Point::new(10.0, 0.0)),
            PathCommand::LineTo(Point::new(10.0, 10.0)),
            PathCommand::ClosePath,
        ];
        let vs = vertices(&path);
        assert_eq!(vs.len(), 4);
        assert_eq!(vs[3].point, Point::new(0.0, 0.0));
        assert!(vs[0].incoming.is_some());
    }

    #[test]
    fn orient_units() {
        assert_eq!(parse_angle("90"), Some(90.0));
        assert_eq!(parse_angle("0.5turn"), Some(180.0));
        assert_eq!(parse_angle("100grad"), Some(90.0));
        assert_eq!(parse_angle("auto-ish"), None);
    }

    #[test]
    fn markers_are_placed_at_vertices() {
        let root = parse_document(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
            <marker id="m" markerWidth="4" markerHeight="4" overflow="visible"><rect width="1" height="1"/></marker>
            </svg>"#,
        )
        .expect("parse");
        let options = Options::new();
        let mut doc = Document::new(&root, &options, None);
        doc.canvas_height = 100.0;
        let path_element = XmlElement::new("path")
            .with_attribute("marker-start", "url(#m)")
            .with_attribute("marker-end", "url(#m)");
        let state = State::initial(100.0, 100.0).descend(&path_element);
        let calls = build_markers(
            &mut doc,
            &state,
            &[
                PathCommand::MoveTo(Point::new(0.0, 0.0)),
                PathCommand::LineTo(Point::new(10.0, 0.0)),
                PathCommand::LineTo(Point::new(20.0, 0.0)),
            ],
        );
        assert_eq!(calls.len(), 2);
        let end = calls[1].args[0].as_matrix().expect("matrix");
        assert!((end.e - 20.0).abs() < 1e-9);
        assert!(doc.warnings.is_empty());
    }
}
