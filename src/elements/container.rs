use super::base::{Geometry, transform_rect};
use super::clip::clip_call;
use super::{Content, ElementKind, build_children, build_element, requirements_pass, wrap};
use crate::call::{Arg, Call, Op};
use crate::color::parse_href;
use crate::document::{Built, Document};
use crate::error::{ElementResult, SkipElement, SvgError};
use crate::length::{Axis, Length};
use crate::matrix::Matrix;
use crate::options::Options;
use crate::sizing::{AspectRatio, Sizing, SizingRequest, ViewBox};
use crate::state::State;
use crate::types::Rect;
use crate::xml::XmlElement;
use std::sync::Arc;

/// Builds the whole document: root sizing, then every child in the root viewport.
pub(crate) fn build_root(
    doc: &mut Document<'_>,
    root: &Arc<XmlElement>,
    options: &Options,
) -> Result<(Vec<Call>, Sizing), SvgError> {
    let (container_width, container_height) = options.bounds.unwrap_or((0.0, 0.0));
    let outer = State::initial(container_width, container_height);
    let ctx = outer.length_context();
    let dimension = |name: &str, axis: Axis, container: f64| {
        root.attribute(name)
            .and_then(Length::parse)
            .filter(|length| !length.is_percent() || container > 0.0)
            .map(|length| length.resolve(&ctx, axis))
    };
    let sizing = Sizing::compute(&SizingRequest {
        container_width,
        container_height,
        width: dimension("width", Axis::X, container_width),
        height: dimension("height", Axis::Y, container_height),
        view_box: root.attribute("viewBox").and_then(ViewBox::parse),
        aspect: root
            .attribute("preserveAspectRatio")
            .map(AspectRatio::parse)
            .unwrap_or_default(),
        requested_width: options.width,
        requested_height: options.height,
    });
    if !sizing.is_valid() {
        return Err(SvgError::InvalidSizing {
            width: sizing.output_width,
            height: sizing.output_height,
        });
    }
    tracing::debug!(
        target: "svg2canvas",
        width = sizing.output_width,
        height = sizing.output_height,
        x_scale = sizing.x_scale,
        y_scale = sizing.y_scale,
        "root sizing"
    );
    doc.canvas_height = sizing.output_height;

    let mut state = State::initial(sizing.viewport_width, sizing.viewport_height).descend(root);
    state.root_font_size = state.font_size;
    if !state.is_displayed() {
        return Ok((Vec::new(), sizing));
    }
    let content = build_children(doc, root, &state);

    let mut calls = content.calls;
    if !sizing.transform.is_identity() {
        let mut scope = Call::new(Op::TransformationMatrix)
            .arg(Arg::Matrix(sizing.transform.to_canvas_space(doc.canvas_height)));
        scope.children = calls;
        calls = vec![scope];
    }
    if sizing.needs_clip {
        let output = Rect::new(0.0, 0.0, sizing.output_width, sizing.output_height);
        let mut clip = clip_call(&Geometry::Rect(output), None, doc.canvas_height);
        clip.children = calls;
        calls = vec![clip];
    }
    let bbox = content
        .bbox
        .and_then(|rect| transform_rect(rect, sizing.transform));
    let wrapped = match wrap(doc, root, &state, Content { calls, bbox }, false) {
        Ok(built) => built.calls,
        Err(SkipElement::Warned(message)) => {
            doc.warn(message);
            Vec::new()
        }
        Err(SkipElement::Quiet) => Vec::new(),
    };
    Ok((wrapped, sizing))
}

/// Places `calls` under `matrix`, clipped to `viewport` (in the parent's user space) when given.
fn viewport_content(
    doc: &Document<'_>,
    calls: Vec<Call>,
    bbox: Option<Rect>,
    matrix: Matrix,
    viewport: Option<Rect>,
) -> Content {
    let mut out = calls;
    if !matrix.is_identity() {
        let mut scope = Call::new(Op::TransformationMatrix)
            .arg(Arg::Matrix(matrix.to_canvas_space(doc.canvas_height)));
        scope.children = out;
        out = vec![scope];
    }
    if let Some(rect) = viewport {
        let mut clip = clip_call(&Geometry::Rect(rect), None, doc.canvas_height);
        clip.children = out;
        out = vec![clip];
    }
    Content {
        calls: out,
        bbox: bbox.and_then(|rect| transform_rect(rect, matrix)),
    }
}

pub(super) fn build_nested_svg(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
) -> ElementResult<Content> {
    let x = state.length_or(element, "x", Axis::X, 0.0);
    let y = state.length_or(element, "y", Axis::Y, 0.0);
    let width = state.length_or(element, "width", Axis::X, state.viewport_width);
    let height = state.length_or(element, "height", Axis::Y, state.viewport_height);
    if width <= 0.0 || height <= 0.0 {
        return Err(SkipElement::Quiet);
    }
    let sizing = Sizing::compute(&SizingRequest {
        container_width: width,
        container_height: height,
        width: Some(width),
        height: Some(height),
        view_box: element.attribute("viewBox").and_then(ViewBox::parse),
        aspect: element
            .attribute("preserveAspectRatio")
            .map(AspectRatio::parse)
            .unwrap_or_default(),
        ..SizingRequest::default()
    });
    if !sizing.is_valid() {
        return Err(SkipElement::warn(format!(
            "<svg> viewport resolves to {}x{}",
            sizing.output_width, sizing.output_height
        )));
    }
    let inner = state
        .clone()
        .with_viewport(sizing.viewport_width, sizing.viewport_height);
    let content = build_children(doc, element, &inner);
    let viewport = (!state.overflows()).then(|| Rect::new(x, y, width, height));
    Ok(viewport_content(
        doc,
        content.calls,
        content.bbox,
        Matrix::translate(x, y).multiply(sizing.transform),
        viewport,
    ))
}

pub(super) fn build_group(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
) -> ElementResult<Content> {
    Ok(build_children(doc, element, state))
}

/// Renders the first child whose conditional attributes pass.
pub(super) fn build_switch(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
) -> ElementResult<Content> {
    let chosen = element.element_children().find(|child| {
        !matches!(
            ElementKind::from_name(&child.name),
            ElementKind::Unknown | ElementKind::Ignored
        ) && requirements_pass(child, &doc.options.language)
    });
    let Some(child) = chosen else {
        return Ok(Content::default());
    };
    match build_element(doc, child, state) {
        Ok(built) => Ok(Content {
            calls: built.calls,
            bbox: built.bbox,
        }),
        Err(SkipElement::Quiet) => Ok(Content::default()),
        Err(skip) => Err(skip),
    }
}

/// Copies the calls its target produced, translated by `x`/`y`. Targets that have not been
/// built yet (forward references, hidden subtrees) are built on demand.
pub(super) fn build_use(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
) -> ElementResult<Content> {
    let id = element
        .href()
        .and_then(parse_href)
        .ok_or_else(|| SkipElement::warn("<use> has no reference"))?;
    let target = doc
        .element(&id)
        .ok_or_else(|| SkipElement::warn(format!("<use> references unknown element '{id}'")))?;
    if doc.use_stack.contains(&id) {
        return Err(SkipElement::warn(format!("recursive use of '{id}'")));
    }
    let x = state.length_or(element, "x", Axis::X, 0.0);
    let y = state.length_or(element, "y", Axis::Y, 0.0);

    let built = match doc.built(&id).cloned() {
        Some(built) => built,
        None => {
            let mut inner = state.clone();
            inner.inside_use = true;
            doc.use_stack.push(id.clone());
            let result = build_target(doc, &target, &inner);
            doc.use_stack.pop();
            match result {
                Ok(built) => built,
                Err(SkipElement::Quiet) => return Ok(Content::default()),
                Err(skip) => return Err(skip),
            }
        }
    };

    let translate = Matrix::translate(x, y);
    if ElementKind::from_name(&target.name) != ElementKind::Symbol {
        return Ok(viewport_content(doc, built.calls, built.bbox, translate, None));
    }

    let symbol_state = state.descend(&target);
    let width = state.length_or(element, "width", Axis::X, state.viewport_width);
    let height = state.length_or(element, "height", Axis::Y, state.viewport_height);
    if width <= 0.0 || height <= 0.0 {
        return Err(SkipElement::Quiet);
    }
    let sizing = Sizing::compute(&SizingRequest {
        container_width: width,
        container_height: height,
        width: Some(width),
        height: Some(height),
        view_box: target.attribute("viewBox").and_then(ViewBox::parse),
        aspect: target
            .attribute("preserveAspectRatio")
            .map(AspectRatio::parse)
            .unwrap_or_default(),
        ..SizingRequest::default()
    });
    if !sizing.is_valid() {
        return Err(SkipElement::Quiet);
    }
    let viewport = (!symbol_state.overflows()).then(|| Rect::new(x, y, width, height));
    Ok(viewport_content(
        doc,
        built.calls,
        built.bbox,
        translate.multiply(sizing.transform),
        viewport,
    ))
}

fn build_target(doc: &mut Document<'_>, target: &Arc<XmlElement>, state: &State) -> ElementResult<Built> {
    if ElementKind::from_name(&target.name) != ElementKind::Symbol {
        return build_element(doc, target, state);
    }
    let symbol_state = state.descend(target);
    if !symbol_state.is_displayed() {
        return Err(SkipElement::Quiet);
    }
    let content = build_group(doc, target, &symbol_state)?;
    wrap(doc, target, &symbol_state, content, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn render(xml: &str, options: Options) -> Result<(Vec<Call>, Sizing, Vec<String>), SvgError> {
        let root = parse_document(xml)?;
        let mut doc = Document::new(&root, &options, None);
        let (calls, sizing) = build_root(&mut doc, &root, &options)?;
        Ok((calls, sizing, doc.warnings))
    }

    fn ops(calls: &[Call]) -> Vec<&'static str> {
        Call::leaves(calls).iter().map(|c| c.op.as_str()).collect()
    }

    #[test]
    fn root_sizing_aligns_view_box() {
        let (_, sizing, _) = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="150" height="200"
                viewBox="0 -30 300 800" preserveAspectRatio="xMaxYMid meet"/>"#,
            Options::new().bounds(1200.0, 800.0),
        )
        .expect("render");
        assert_eq!(sizing.x_scale, 0.25);
        assert_eq!(sizing.output_width, 150.0);
        assert_eq!(sizing.x_offset, -75.0);
        assert_eq!(sizing.y_offset, -30.0);
    }

    #[test]
    fn zero_root_size_is_fatal() {
        let result = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="10"/>"#,
            Options::new(),
        );
        assert!(matches!(result, Err(SvgError::InvalidSizing { .. })));
    }

    #[test]
    fn use_copies_forward_reference() {
        let (calls, _, warnings) = render(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
            <use href="#r" x="5"/>
            <defs><rect id="r" width="10" height="10"/></defs></svg>"##,
            Options::new(),
        )
        .expect("render");
        assert!(warnings.is_empty());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, Op::TransformationMatrix);
        assert_eq!(ops(&calls), vec!["rectangle", "fill"]);
    }

    #[test]
    fn recursive_use_warns() {
        let (_, _, warnings) = render(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <g id="a"><use href="#a"/></g></svg>"##,
            Options::new(),
        )
        .expect("render");
        assert_eq!(warnings, vec!["recursive use of 'a'".to_string()]);
    }

    #[test]
    fn switch_picks_first_passing_child() {
        let (calls, _, _) = render(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <switch>
              <circle systemLanguage="fr" r="1"/>
              <rect width="1" height="1"/>
              <circle r="2"/>
            </switch></svg>"#,
            Options::new(),
        )
        .expect("render");
        assert_eq!(ops(&calls), vec!["rectangle", "fill"]);
    }

    #[test]
    fn symbol_is_sized_and_clipped_through_use() {
        let (calls, _, _) = render(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
            <symbol id="s" viewBox="0 0 10 10"><rect width="10" height="10"/></symbol>
            <use href="#s" width="20" height="20"/></svg>"##,
            Options::new(),
        )
        .expect("render");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].op, Op::Clip);
        let matrix = calls[0].children[0].args[0].as_matrix().expect("matrix");
        assert_eq!(matrix.a, 2.0);
    }
}
