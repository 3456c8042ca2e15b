//! Tree walker: turns elements into call trees.
//!
//! Every element goes through the same steps. Styles are cascaded into a fresh [`State`],
//! the kind-specific builder produces content in the element's own user space, and
//! [`wrap`] nests that content inside the element's transform, opacity, clip, mask and
//! paint scopes (outermost first).

mod base;
mod clip;
mod container;
mod image;
mod marker;
mod shapes;
mod text;

use crate::call::{Arg, Call, Op, Scope};
use crate::document::{Built, Document};
use crate::error::{ElementResult, SkipElement};
use crate::state::State;
use crate::transform::parse_transform;
use crate::types::Rect;
use crate::xml::XmlElement;
use std::sync::Arc;

use base::{transform_rect, union};
pub(crate) use container::build_root;

/// Element kinds the walker knows. Anything else is [`ElementKind::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ElementKind {
    Svg,
    G,
    A,
    Defs,
    Symbol,
    Switch,
    Use,
    Style,
    Rect,
    Circle,
    Ellipse,
    Line,
    Polyline,
    Polygon,
    Path,
    Text,
    Tspan,
    Image,
    ClipPath,
    Mask,
    Marker,
    LinearGradient,
    RadialGradient,
    /// Known elements that never draw (`title`, `desc`, ...).
    Ignored,
    Unknown,
}

impl ElementKind {
    pub fn from_name(name: &str) -> ElementKind {
        match name {
            "svg" => ElementKind::Svg,
            "g" => ElementKind::G,
            "a" => ElementKind::A,
            "defs" => ElementKind::Defs,
            "symbol" => ElementKind::Symbol,
            "switch" => ElementKind::Switch,
            "use" => ElementKind::Use,
            "style" => ElementKind::Style,
            "rect" => ElementKind::Rect,
            "circle" => ElementKind::Circle,
            "ellipse" => ElementKind::Ellipse,
            "line" => ElementKind::Line,
            "polyline" => ElementKind::Polyline,
            "polygon" => ElementKind::Polygon,
            "path" => ElementKind::Path,
            "text" => ElementKind::Text,
            "tspan" => ElementKind::Tspan,
            "image" => ElementKind::Image,
            "clipPath" => ElementKind::ClipPath,
            "mask" => ElementKind::Mask,
            "marker" => ElementKind::Marker,
            "linearGradient" => ElementKind::LinearGradient,
            "radialGradient" => ElementKind::RadialGradient,
            "title" | "desc" | "metadata" | "stop" | "script" => ElementKind::Ignored,
            _ => ElementKind::Unknown,
        }
    }
}

/// Kind-specific output, in the element's own user space.
#[derive(Debug, Default)]
pub(crate) struct Content {
    pub calls: Vec<Call>,
    pub bbox: Option<Rect>,
}

/// Builds one element. `Err` means the element contributes nothing; warned skips are
/// reported by the caller.
pub(crate) fn build_element(
    doc: &mut Document<'_>,
    element: &Arc<XmlElement>,
    parent: &State,
) -> ElementResult<Built> {
    let kind = ElementKind::from_name(&element.name);
    match kind {
        ElementKind::Ignored | ElementKind::Style | ElementKind::Tspan => {
            return Err(SkipElement::Quiet);
        }
        ElementKind::Unknown => {
            return Err(SkipElement::warn(format!("unsupported element <{}>", element.name)));
        }
        _ => {}
    }
    doc.count(&element.name);
    tracing::debug!(
        target: "svg2canvas",
        element = %element.name,
        id = element.id().unwrap_or(""),
        "build element"
    );
    if !requirements_pass(element, &doc.options.language) {
        return Err(SkipElement::Quiet);
    }

    match kind {
        ElementKind::LinearGradient | ElementKind::RadialGradient => {
            let known = element.id().is_some_and(|id| doc.gradients.contains(id));
            if !known {
                doc.register_gradient(element, parent);
            }
            return Err(SkipElement::Quiet);
        }
        ElementKind::ClipPath | ElementKind::Mask | ElementKind::Marker => {
            return Err(SkipElement::Quiet);
        }
        _ => {}
    }

    let state = parent.descend(element);
    let hidden = !state.is_displayed() && !matches!(kind, ElementKind::Defs | ElementKind::Symbol);
    if hidden && state.inside_use {
        return Err(SkipElement::Quiet);
    }
    match kind {
        ElementKind::Defs => {
            // Built only so that `use` can copy the results.
            build_children(doc, element, &state);
            return Err(SkipElement::Quiet);
        }
        ElementKind::Symbol => {
            if !state.inside_use {
                if let Some(id) = element.id() {
                    let content = container::build_group(doc, element, &state)?;
                    let built = wrap(doc, element, &state, content, false)?;
                    doc.store_built(id, &built);
                }
            }
            return Err(SkipElement::Quiet);
        }
        _ => {}
    }

    let content = match kind {
        ElementKind::Svg => container::build_nested_svg(doc, element, &state)?,
        ElementKind::G | ElementKind::A => container::build_group(doc, element, &state)?,
        ElementKind::Switch => container::build_switch(doc, element, &state)?,
        ElementKind::Use => container::build_use(doc, element, &state)?,
        ElementKind::Rect
        | ElementKind::Circle
        | ElementKind::Ellipse
        | ElementKind::Line
        | ElementKind::Polyline
        | ElementKind::Polygon
        | ElementKind::Path => shapes::build_shape(doc, element, &state, kind)?,
        ElementKind::Text => text::build_text(doc, element, &state)?,
        ElementKind::Image => image::build_image(doc, element, &state)?,
        _ => return Err(SkipElement::Quiet),
    };
    let built = wrap(doc, element, &state, content, true)?;
    if hidden {
        // Built for the side effects on descendants (stored ids, warnings) only.
        return Err(SkipElement::Quiet);
    }
    if let Some(id) = element.id() {
        if !state.inside_use {
            doc.store_built(id, &built);
        }
    }
    Ok(built)
}

/// Builds every child element, reporting warned skips and carrying on with siblings.
pub(crate) fn build_children(doc: &mut Document<'_>, element: &XmlElement, state: &State) -> Content {
    let mut content = Content::default();
    for child in element.element_children() {
        match build_element(doc, child, state) {
            Ok(built) => {
                content.calls.extend(built.calls);
                content.bbox = union(content.bbox, built.bbox);
            }
            Err(SkipElement::Quiet) => {}
            Err(SkipElement::Warned(message)) => doc.warn(message),
        }
    }
    content
}

/// Nests `content` inside the element's scopes: transform, opacity, clip, mask, then the
/// paint state it sets. `transformable` is false for elements whose `transform` is applied
/// elsewhere.
pub(crate) fn wrap(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
    content: Content,
    transformable: bool,
) -> ElementResult<Built> {
    let transform = match element.attribute("transform").filter(|_| transformable) {
        Some(value) => {
            let mut warnings = Vec::new();
            let parsed = parse_transform(value, &mut warnings);
            for warning in warnings {
                doc.warn(warning);
            }
            Some(parsed.map_err(|err| {
                SkipElement::warn(format!("<{}> has invalid transform: {err}", element.name))
            })?)
        }
        None => None,
    }
    .filter(|m| !m.is_identity());

    let clip = clip::clip_wrapper(doc, element, state, content.bbox);
    let mask = clip::mask_wrapper(doc, element, state, content.bbox);
    let leaves = base::style_leaves(doc, state);

    let mut root: Vec<Call> = Vec::new();
    let mut scope: &mut Vec<Call> = &mut root;
    if let Some(matrix) = transform {
        scope = scope.enter(
            Call::new(Op::TransformationMatrix)
                .arg(Arg::Matrix(matrix.to_canvas_space(doc.canvas_height))),
        );
    }
    if let Some(wrapper) = base::opacity_wrapper(state) {
        scope = scope.enter(wrapper);
    }
    if let Some(wrapper) = clip {
        scope = scope.enter(wrapper);
    }
    if let Some(wrapper) = mask {
        scope = scope.enter(wrapper);
    }
    if !leaves.is_empty() {
        scope = scope.enter(Call::new(Op::Save));
        scope.extend(leaves);
    }
    scope.extend(content.calls);

    let bbox = match (content.bbox, transform) {
        (Some(rect), Some(matrix)) => transform_rect(rect, matrix),
        (bbox, _) => bbox,
    };
    Ok(Built { calls: root, bbox })
}

/// Conditional processing attributes.
pub(crate) fn requirements_pass(element: &XmlElement, language: &str) -> bool {
    if element
        .attribute("requiredExtensions")
        .is_some_and(|value| !value.trim().is_empty())
    {
        return false;
    }
    match element.attribute("systemLanguage") {
        Some(tags) => tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .any(|tag| language_matches(tag, language)),
        None => true,
    }
}

fn language_matches(tag: &str, language: &str) -> bool {
    let tag = tag.to_ascii_lowercase();
    let language = language.to_ascii_lowercase();
    tag == language
        || language.starts_with(&format!("{tag}-"))
        || tag.starts_with(&format!("{language}-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::xml::parse_document;

    fn build(xml: &str) -> (Vec<Call>, Vec<String>) {
        let root = parse_document(xml).expect("parse");
        let options = Options::new();
        let mut doc = Document::new(&root, &options, None);
        doc.canvas_height = 100.0;
        let state = State::initial(100.0, 100.0).descend(&root);
        let content = build_children(&mut doc, &root, &state);
        (content.calls, doc.warnings)
    }

    fn ops(calls: &[Call]) -> Vec<&'static str> {
        Call::leaves(calls).iter().map(|c| c.op.as_str()).collect()
    }

    #[test]
    fn kinds_from_names() {
        assert_eq!(ElementKind::from_name("clipPath"), ElementKind::ClipPath);
        assert_eq!(ElementKind::from_name("desc"), ElementKind::Ignored);
        assert_eq!(ElementKind::from_name("feBlend"), ElementKind::Unknown);
    }

    #[test]
    fn unknown_elements_warn_and_siblings_continue() {
        let (calls, warnings) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><blink/><rect width="1" height="1"/></svg>"#,
        );
        assert_eq!(warnings, vec!["unsupported element <blink>".to_string()]);
        assert_eq!(ops(&calls), vec!["rectangle", "fill"]);
    }

    #[test]
    fn display_none_omits_output() {
        let (calls, warnings) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><g display="none"><rect width="1" height="1"/></g></svg>"#,
        );
        assert!(calls.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn display_none_still_builds_descendants() {
        let (calls, warnings) = build(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
            <g display="none"><blink/><rect id="r" width="1" height="1"/></g>
            <use href="#r"/></svg>"##,
        );
        assert_eq!(warnings, vec!["unsupported element <blink>".to_string()]);
        assert_eq!(ops(&calls), vec!["rectangle", "fill"]);
    }

    #[test]
    fn use_of_hidden_element_draws_nothing() {
        let (calls, warnings) = build(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
            <rect id="r" display="none" width="1" height="1"/><use href="#r"/></svg>"##,
        );
        assert!(calls.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn wrapper_order_is_transform_opacity_then_paint() {
        let (calls, _) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
            <rect transform="translate(5)" opacity="0.5" fill="blue" width="1" height="1"/></svg>"#,
        );
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, Op::TransformationMatrix);
        let opacity = &calls[0].children[0];
        assert_eq!(opacity.op, Op::Transparent);
        let save = &opacity.children[0];
        assert_eq!(save.op, Op::Save);
        assert_eq!(save.children[0].op, Op::FillColor);
    }

    #[test]
    fn invalid_transform_skips_element() {
        let (calls, warnings) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><rect transform="scale(1,2,3)" width="1" height="1"/></svg>"#,
        );
        assert!(calls.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("invalid transform"));
    }

    #[test]
    fn system_language_prefix_match() {
        let el = XmlElement::new("g").with_attribute("systemLanguage", "fr, en");
        assert!(requirements_pass(&el, "en-US"));
        assert!(!requirements_pass(&el, "de"));
        let ext = XmlElement::new("g").with_attribute("requiredExtensions", "http://x");
        assert!(!requirements_pass(&ext, "en"));
    }
}
