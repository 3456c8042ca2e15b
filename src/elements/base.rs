use crate::call::{Arg, Call, Op};
use crate::color::Paint;
use crate::document::Document;
use crate::matrix::Matrix;
use crate::path::{PathCommand, bounding_box};
use crate::properties::{Property, resolve_dash_array};
use crate::state::State;
use crate::types::{Color, FillRule, Point, Rect};

/// Flips a user-space point into the y-up canvas box of height `height`.
pub(crate) fn flip(p: Point, height: f64) -> Point {
    Point::new(p.x, height - p.y)
}

pub(crate) fn transform_rect(rect: Rect, matrix: Matrix) -> Option<Rect> {
    Rect::from_points(rect.corners().iter().map(|p| matrix.apply(*p)))
}

pub(crate) fn union(a: Option<Rect>, b: Option<Rect>) -> Option<Rect> {
    match (a, b) {
        (Some(a), Some(b)) => Rect::from_points(a.corners().into_iter().chain(b.corners())),
        (a, None) => a,
        (None, b) => b,
    }
}

pub(crate) fn bbox_arg(rect: Rect) -> Arg {
    Arg::numbers(&[rect.x, rect.y, rect.width, rect.height])
}

/// Shape outline in user space.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Geometry {
    Rect(Rect),
    Path(Vec<PathCommand>),
}

impl Geometry {
    pub fn bbox(&self) -> Option<Rect> {
        match self {
            Geometry::Rect(rect) => Some(*rect),
            Geometry::Path(commands) => bounding_box(commands),
        }
    }

    pub fn to_path(&self) -> Vec<PathCommand> {
        match self {
            Geometry::Rect(r) => vec![
                PathCommand::MoveTo(Point::new(r.x, r.y)),
                PathCommand::LineTo(Point::new(r.x + r.width, r.y)),
                PathCommand::LineTo(Point::new(r.x + r.width, r.y + r.height)),
                PathCommand::LineTo(Point::new(r.x, r.y + r.height)),
                PathCommand::ClosePath,
            ],
            Geometry::Path(commands) => commands.clone(),
        }
    }

    /// Path construction calls in canvas coordinates. `matrix` is applied in user space first.
    pub fn emit(&self, matrix: Option<Matrix>, height: f64) -> Vec<Call> {
        if let (Geometry::Rect(r), None) = (self, matrix) {
            let lower_left = Point::new(r.x, height - r.y - r.height);
            return vec![
                Call::new(Op::Rectangle)
                    .arg(Arg::Point(lower_left))
                    .arg(Arg::Number(r.width))
                    .arg(Arg::Number(r.height)),
            ];
        }
        let map = |p: Point| flip(matrix.map_or(p, |m| m.apply(p)), height);
        self.to_path()
            .into_iter()
            .map(|command| match command.map(map) {
                PathCommand::MoveTo(p) => Call::new(Op::MoveTo).arg(Arg::Point(p)),
                PathCommand::LineTo(p) => Call::new(Op::LineTo).arg(Arg::Point(p)),
                PathCommand::CurveTo(c1, c2, p) => Call::new(Op::CurveTo)
                    .arg(Arg::Point(c1))
                    .arg(Arg::Point(c2))
                    .arg(Arg::Point(p)),
                PathCommand::ClosePath => Call::new(Op::ClosePath),
            })
            .collect()
    }
}

/// How a shape's fill or stroke is painted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ShapePaint {
    None,
    /// Solid color already set on the canvas by this element or an ancestor.
    Inherited,
    /// Solid color the shape has to set itself (paint server fallback).
    Color(Color),
    Gradient(String),
}

impl ShapePaint {
    pub fn is_painted(&self) -> bool {
        !matches!(self, ShapePaint::None)
    }
}

/// Resolves the computed `fill`/`stroke` paint, registering referenced gradients.
pub(crate) fn shape_paint(doc: &mut Document<'_>, state: &State, property: Property) -> ShapePaint {
    match state.paint(property) {
        None | Some(Paint::None) => ShapePaint::None,
        Some(Paint::Color(_, _) | Paint::CurrentColor) => ShapePaint::Inherited,
        Some(Paint::Url { id, fallback }) => {
            if doc.ensure_gradient(&id, state) {
                return ShapePaint::Gradient(id);
            }
            let reason = if doc.element(&id).is_some() {
                "unsupported paint server"
            } else {
                "unknown paint server"
            };
            match fallback.as_deref() {
                Some(Paint::Color(color, _)) => ShapePaint::Color(doc.options.color_mode.convert(*color)),
                Some(Paint::CurrentColor) => {
                    ShapePaint::Color(doc.options.color_mode.convert(state.current_color().0))
                }
                _ => {
                    doc.warn(format!("{} references {reason} '{id}'", property.name()));
                    ShapePaint::None
                }
            }
        }
    }
}

/// Solid color to emit for `property` on this element, if the element changes it.
fn specified_color(doc: &Document<'_>, state: &State, property: Property) -> Option<(Color, f64)> {
    let paint = state.paint(property)?;
    let changes = state.is_specified(property)
        || (state.is_specified(Property::Color) && paint == Paint::CurrentColor);
    if !changes {
        return None;
    }
    let (color, alpha) = match paint {
        Paint::Color(color, alpha) => (color, alpha),
        Paint::CurrentColor => state.current_color(),
        Paint::Url { fallback, .. } => match fallback.as_deref() {
            Some(Paint::Color(color, alpha)) => (*color, *alpha),
            _ => return None,
        },
        Paint::None => return None,
    };
    Some((doc.options.color_mode.convert(color), alpha))
}

/// Paint and stroke-attribute leaves for everything this element specifies itself.
pub(crate) fn style_leaves(doc: &Document<'_>, state: &State) -> Vec<Call> {
    let mut out = Vec::new();
    if state.inside_clip_path {
        return out;
    }
    if let Some((color, _)) = specified_color(doc, state, Property::Fill) {
        out.push(Call::new(Op::FillColor).arg(Arg::Color(color)));
    }
    if let Some((color, _)) = specified_color(doc, state, Property::Stroke) {
        out.push(Call::new(Op::StrokeColor).arg(Arg::Color(color)));
    }
    if state.is_specified(Property::StrokeWidth) {
        out.push(Call::new(Op::LineWidth).arg(Arg::Number(state.stroke_width)));
    }
    if state.is_specified(Property::StrokeLinecap) {
        out.push(Call::new(Op::CapStyle).arg(Arg::Text(state.value(Property::StrokeLinecap).to_string())));
    }
    if state.is_specified(Property::StrokeLinejoin) {
        out.push(Call::new(Op::JoinStyle).arg(Arg::Text(state.value(Property::StrokeLinejoin).to_string())));
    }
    if state.is_specified(Property::StrokeMiterlimit) {
        let limit = state
            .value(Property::StrokeMiterlimit)
            .parse::<f64>()
            .unwrap_or(4.0);
        out.push(Call::new(Op::MiterLimit).arg(Arg::Number(limit)));
    }
    if state.is_specified(Property::StrokeDasharray) || state.is_specified(Property::StrokeDashoffset) {
        let ctx = state.length_context();
        let pattern = resolve_dash_array(state.value(Property::StrokeDasharray), &ctx).unwrap_or_default();
        let phase = crate::length::resolve_length(
            Some(state.value(Property::StrokeDashoffset)),
            &ctx,
            crate::length::Axis::Diagonal,
        )
        .unwrap_or(0.0);
        out.push(
            Call::new(Op::Dash)
                .arg(Arg::numbers(&pattern))
                .arg(Arg::Number(phase)),
        );
    }
    out
}

/// `transparent` wrapper for the opacities this element sets, if any.
pub(crate) fn opacity_wrapper(state: &State) -> Option<Call> {
    if state.inside_clip_path {
        return None;
    }
    let mut call = Call::new(Op::Transparent);
    if state.is_specified(Property::Opacity) && state.number(Property::Opacity) < 1.0 {
        call = call.kwarg("opacity", Arg::Number(state.number(Property::Opacity)));
    }
    for (paint, opacity, key) in [
        (Property::Fill, Property::FillOpacity, "fill_opacity"),
        (Property::Stroke, Property::StrokeOpacity, "stroke_opacity"),
    ] {
        let alpha = match state.paint(paint) {
            Some(Paint::Color(_, alpha)) if state.is_specified(paint) => alpha,
            _ => 1.0,
        };
        if state.is_specified(opacity) || alpha < 1.0 {
            call = call.kwarg(key, Arg::Number(state.number(opacity) * alpha));
        }
    }
    (!call.kwargs.is_empty()).then_some(call)
}

pub(crate) fn fill_rule(state: &State, property: Property) -> FillRule {
    FillRule::parse(state.value(property))
}

/// Operator that paints the current path.
pub(crate) fn paint_call(fill: bool, stroke: bool, rule: FillRule) -> Call {
    let rule = Arg::Text(rule.as_str().to_string());
    match (fill, stroke) {
        (true, true) => Call::new(Op::FillAndStroke).kwarg("fill_rule", rule),
        (true, false) => Call::new(Op::Fill).kwarg("fill_rule", rule),
        (false, true) => Call::new(Op::Stroke),
        (false, false) => Call::new(Op::EndPath),
    }
}

/// Wraps `inner` in the gradient scopes the paints need.
pub(crate) fn gradient_scopes(
    fill: &ShapePaint,
    stroke: &ShapePaint,
    bbox: Rect,
    state: &State,
    inner: Vec<Call>,
) -> Vec<Call> {
    let mut calls = inner;
    for (paint, op) in [(stroke, Op::StrokeGradient), (fill, Op::FillGradient)] {
        if let ShapePaint::Gradient(id) = paint {
            let mut scope = Call::new(op)
                .kwarg("gradient", Arg::Text(id.clone()))
                .kwarg("bbox", bbox_arg(bbox))
                .kwarg(
                    "viewport",
                    Arg::numbers(&[state.viewport_width, state.viewport_height]),
                )
                .kwarg("font_size", Arg::Number(state.font_size));
            scope.children = calls;
            calls = vec![scope];
        }
    }
    calls
}

/// Leaves setting a shape's own fallback colors.
pub(crate) fn fallback_color_leaves(fill: &ShapePaint, stroke: &ShapePaint) -> Vec<Call> {
    let mut out = Vec::new();
    if let ShapePaint::Color(color) = fill {
        out.push(Call::new(Op::FillColor).arg(Arg::Color(*color)));
    }
    if let ShapePaint::Color(color) = stroke {
        out.push(Call::new(Op::StrokeColor).arg(Arg::Color(*color)));
    }
    out
}
