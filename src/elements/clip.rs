use super::base::Geometry;
use super::{ElementKind, build_children, shapes};
use crate::call::{Arg, Call, Op};
use crate::color::parse_url_ref;
use crate::document::Document;
use crate::length::{Axis, Length, parse_fraction};
use crate::matrix::Matrix;
use crate::properties::Property;
use crate::state::State;
use crate::transform::parse_transform;
use crate::types::{FillRule, Point, Rect};
use crate::xml::XmlElement;
use std::sync::Arc;

/// Clip scope limiting its children to `geometry`.
pub(super) fn clip_call(geometry: &Geometry, matrix: Option<Matrix>, height: f64) -> Call {
    Call::new(Op::Clip)
        .kwarg("path", Arg::Calls(geometry.emit(matrix, height)))
        .kwarg("rule", Arg::Text(FillRule::NonZero.as_str().to_string()))
}

fn referenced(
    doc: &mut Document<'_>,
    state: &State,
    property: Property,
    expected: &str,
) -> Option<(String, Arc<XmlElement>)> {
    let value = state.value(property);
    if value == "none" {
        return None;
    }
    let id = parse_url_ref(value)?;
    match doc.element(&id) {
        Some(target) if target.name == expected => Some((id, target)),
        Some(target) => {
            doc.warn(format!(
                "{} references <{}> '{id}', expected <{expected}>",
                property.name(),
                target.name
            ));
            None
        }
        None => {
            doc.warn(format!("{} references unknown element '{id}'", property.name()));
            None
        }
    }
}

fn units_matrix(
    doc: &mut Document<'_>,
    element: &XmlElement,
    attribute: &str,
    default_bbox: bool,
    bbox: Option<Rect>,
) -> Option<Matrix> {
    let bbox_units = match element.attribute(attribute) {
        Some("objectBoundingBox") => true,
        Some("userSpaceOnUse") => false,
        _ => default_bbox,
    };
    if !bbox_units {
        return Some(Matrix::identity());
    }
    match bbox {
        Some(b) if b.width > 0.0 && b.height > 0.0 => Some(Matrix::bounding_box(b.x, b.y, b.width, b.height)),
        _ => {
            doc.warn(format!(
                "<{}> uses objectBoundingBox units on an element without area",
                element.name
            ));
            None
        }
    }
}

fn element_transform(doc: &mut Document<'_>, element: &XmlElement) -> Option<Matrix> {
    let value = element.attribute("transform")?;
    let mut warnings = Vec::new();
    let parsed = parse_transform(value, &mut warnings);
    for warning in warnings {
        doc.warn(warning);
    }
    match parsed {
        Ok(matrix) => Some(matrix),
        Err(err) => {
            doc.warn(format!("<{}> has invalid transform: {err}", element.name));
            None
        }
    }
}

/// `clip` scope for the element's `clip-path`, or `None` when it has none (or it cannot
/// be resolved, which is warned).
pub(super) fn clip_wrapper(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
    bbox: Option<Rect>,
) -> Option<Call> {
    let (id, clip_element) = referenced(doc, state, Property::ClipPath, "clipPath")?;
    let guard = format!("clipPath:{id}");
    if doc.use_stack.contains(&guard) {
        doc.warn(format!("<{}> clip-path '{id}' is recursive", element.name));
        return None;
    }
    let units = units_matrix(doc, &clip_element, "clipPathUnits", false, bbox)?;
    let outer = element_transform(doc, &clip_element)
        .unwrap_or_default()
        .multiply(units);

    let mut clip_state = state.descend(&clip_element);
    clip_state.inside_clip_path = true;
    let mut path = Vec::new();
    let mut rule = None;
    doc.use_stack.push(guard);
    for child in clip_element.element_children() {
        let kind = ElementKind::from_name(&child.name);
        let (shape, shape_kind, offset) = match kind {
            ElementKind::Use => {
                let Some(target) = child.href().and_then(crate::color::parse_href).and_then(|id| doc.element(&id)) else {
                    doc.warn("<use> inside <clipPath> references an unknown element");
                    continue;
                };
                let offset = Matrix::translate(
                    clip_state.length_or(child, "x", Axis::X, 0.0),
                    clip_state.length_or(child, "y", Axis::Y, 0.0),
                );
                let target_kind = ElementKind::from_name(&target.name);
                (target, target_kind, Some(offset))
            }
            _ => (child.clone(), kind, None),
        };
        match shape_kind {
            ElementKind::Rect
            | ElementKind::Circle
            | ElementKind::Ellipse
            | ElementKind::Line
            | ElementKind::Polyline
            | ElementKind::Polygon
            | ElementKind::Path => {}
            ElementKind::Ignored => continue,
            _ => {
                doc.warn(format!("<{}> is not supported inside <clipPath>", shape.name));
                continue;
            }
        }
        let child_state = clip_state.descend(child);
        let shape_state = match offset {
            Some(_) => child_state.descend(&shape),
            None => child_state,
        };
        if !shape_state.is_displayed() || !shape_state.is_visible() {
            continue;
        }
        let geometry = match shapes::shape_geometry(&shape, &shape_state, shape_kind) {
            Ok(geometry) => geometry,
            Err(crate::error::SkipElement::Warned(message)) => {
                doc.warn(message);
                continue;
            }
            Err(crate::error::SkipElement::Quiet) => continue,
        };
        let mut matrix = outer;
        if let Some(transform) = element_transform(doc, child) {
            matrix = matrix.multiply(transform);
        }
        if let Some(offset) = offset {
            matrix = matrix.multiply(offset);
            if let Some(transform) = element_transform(doc, &shape) {
                matrix = matrix.multiply(transform);
            }
        }
        rule.get_or_insert_with(|| shape_state.value(Property::ClipRule).to_string());
        path.extend(geometry.emit(Some(matrix), doc.canvas_height));
    }
    doc.use_stack.pop();

    if path.is_empty() {
        // Nothing to keep: clip to an empty area.
        path = Geometry::Rect(Rect::new(0.0, 0.0, 0.0, 0.0)).emit(None, doc.canvas_height);
    }
    Some(
        Call::new(Op::Clip)
            .kwarg("path", Arg::Calls(path))
            .kwarg(
                "rule",
                Arg::Text(rule.unwrap_or_else(|| FillRule::NonZero.as_str().to_string())),
            ),
    )
}

/// `soft_mask` scope for the element's `mask`.
pub(super) fn mask_wrapper(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
    bbox: Option<Rect>,
) -> Option<Call> {
    if state.inside_clip_path {
        return None;
    }
    let (id, mask_element) = referenced(doc, state, Property::Mask, "mask")?;
    let guard = format!("mask:{id}");
    if doc.use_stack.contains(&guard) {
        doc.warn(format!("<{}> mask '{id}' is recursive", element.name));
        return None;
    }

    let region = mask_region(doc, &mask_element, state, bbox)?;
    let content_units = units_matrix(doc, &mask_element, "maskContentUnits", false, bbox)?;

    let mask_state = State::initial(state.viewport_width, state.viewport_height).descend(&mask_element);
    doc.use_stack.push(guard);
    let content = build_children(doc, &mask_element, &mask_state);
    doc.use_stack.pop();

    let mut calls = content.calls;
    if !content_units.is_identity() {
        let mut scope = Call::new(Op::TransformationMatrix)
            .arg(Arg::Matrix(content_units.to_canvas_space(doc.canvas_height)));
        scope.children = calls;
        calls = vec![scope];
    }
    let mut clipped = clip_call(&Geometry::Rect(region), None, doc.canvas_height);
    clipped.children = calls;
    Some(Call::new(Op::SoftMask).kwarg("mask", Arg::Calls(vec![clipped])))
}

fn mask_region(
    doc: &mut Document<'_>,
    mask: &XmlElement,
    state: &State,
    bbox: Option<Rect>,
) -> Option<Rect> {
    let user_space = mask.attribute("maskUnits") == Some("userSpaceOnUse");
    let value = |name: &str, default: &str| mask.attribute(name).unwrap_or(default).to_string();
    let (x, y, w, h) = (
        value("x", "-10%"),
        value("y", "-10%"),
        value("width", "120%"),
        value("height", "120%"),
    );
    if user_space {
        let ctx = state.length_context();
        let resolve = |v: &str, axis| Length::parse(v).map(|l| l.resolve(&ctx, axis)).unwrap_or(0.0);
        return Some(Rect::new(
            resolve(&x, Axis::X),
            resolve(&y, Axis::Y),
            resolve(&w, Axis::X),
            resolve(&h, Axis::Y),
        ));
    }
    let matrix = units_matrix(doc, mask, "maskUnits", true, bbox)?;
    let fraction = |v: &str| parse_fraction(v).unwrap_or(0.0);
    let origin = matrix.apply(Point::new(fraction(&x), fraction(&y)));
    let corner = matrix.apply(Point::new(fraction(&x) + fraction(&w), fraction(&y) + fraction(&h)));
    Rect::from_points([origin, corner])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::xml::parse_document;

    fn document_with(xml: &str) -> (Arc<XmlElement>, Options) {
        (parse_document(xml).expect("parse"), Options::new())
    }

    #[test]
    fn bbox_clip_path_maps_unit_square() {
        let (root, options) = document_with(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
            <clipPath id="c" clipPathUnits="objectBoundingBox"><rect width="0.5" height="1"/></clipPath>
            </svg>"#,
        );
        let mut doc = Document::new(&root, &options, None);
        doc.canvas_height = 100.0;
        let element = XmlElement::new("rect").with_attribute("clip-path", "url(#c)");
        let state = State::initial(100.0, 100.0).descend(&element);
        let clip = clip_wrapper(&mut doc, &element, &state, Some(Rect::new(10.0, 10.0, 20.0, 40.0)))
            .expect("clip");
        let path = clip.get("path").and_then(Arg::as_calls).expect("path");
        assert_eq!(path[0].op, Op::MoveTo);
        assert_eq!(path[0].point(0), Some(Point::new(10.0, 90.0)));
        assert_eq!(path[2].point(0), Some(Point::new(20.0, 50.0)));
        assert!(doc.warnings.is_empty());
    }

    #[test]
    fn unresolved_references_warn() {
        let (root, options) = document_with(r#"<svg xmlns="http://www.w3.org/2000/svg"><g id="g"/></svg>"#);
        let mut doc = Document::new(&root, &options, None);
        let element = XmlElement::new("rect")
            .with_attribute("clip-path", "url(#missing)")
            .with_attribute("mask", "url(#g)");
        let state = State::initial(10.0, 10.0).descend(&element);
        assert!(clip_wrapper(&mut doc, &element, &state, None).is_none());
        assert!(mask_wrapper(&mut doc, &element, &state, None).is_none());
        assert_eq!(doc.warnings.len(), 2);
    }

    #[test]
    fn default_mask_region_extends_bbox() {
        let (root, options) = document_with(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#);
        let mut doc = Document::new(&root, &options, None);
        let mask = XmlElement::new("mask");
        let state = State::initial(10.0, 10.0);
        let region = mask_region(&mut doc, &mask, &state, Some(Rect::new(0.0, 0.0, 10.0, 20.0)))
            .expect("region");
        assert!((region.x + 1.0).abs() < 1e-9);
        assert!((region.height - 24.0).abs() < 1e-9);
    }
}
