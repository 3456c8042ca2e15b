use crate::matrix::Matrix;
use crate::types::{Color, Point};
use serde::Serialize;
use std::collections::BTreeMap;

/// Canvas operators a call tree can contain.
///
/// Wrapping operators (`Save`, `Clip`, `Transparent`, ...) own a scope of child calls; the
/// rest are leaves replayed as single canvas invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    TransformationMatrix,
    Transparent,
    Clip,
    SoftMask,
    Save,
    FillColor,
    StrokeColor,
    FillGradient,
    StrokeGradient,
    LineWidth,
    CapStyle,
    JoinStyle,
    Dash,
    MiterLimit,
    MoveTo,
    LineTo,
    CurveTo,
    ClosePath,
    Rectangle,
    Fill,
    Stroke,
    FillAndStroke,
    EndPath,
    TextGroup,
    DrawText,
    Image,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::TransformationMatrix => "transformation_matrix",
            Op::Transparent => "transparent",
            Op::Clip => "clip",
            Op::SoftMask => "soft_mask",
            Op::Save => "save",
            Op::FillColor => "fill_color",
            Op::StrokeColor => "stroke_color",
            Op::FillGradient => "fill_gradient",
            Op::StrokeGradient => "stroke_gradient",
            Op::LineWidth => "line_width",
            Op::CapStyle => "cap_style",
            Op::JoinStyle => "join_style",
            Op::Dash => "dash",
            Op::MiterLimit => "miter_limit",
            Op::MoveTo => "move_to",
            Op::LineTo => "line_to",
            Op::CurveTo => "curve_to",
            Op::ClosePath => "close_path",
            Op::Rectangle => "rectangle",
            Op::Fill => "fill",
            Op::Stroke => "stroke",
            Op::FillAndStroke => "fill_and_stroke",
            Op::EndPath => "end_path",
            Op::TextGroup => "text_group",
            Op::DrawText => "draw_text",
            Op::Image => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Arg {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
    Point(Point),
    Color(Color),
    Matrix(Matrix),
    List(Vec<Arg>),
    Calls(Vec<Call>),
}

impl Arg {
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Arg::Number(v) => Some(v),
            Arg::Integer(v) => Some(v as f64),
            _ => None,
        }
    }

    pub fn as_point(&self) -> Option<Point> {
        match *self {
            Arg::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Arg::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match *self {
            Arg::Color(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<Matrix> {
        match *self {
            Arg::Matrix(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Arg]> {
        match self {
            Arg::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_calls(&self) -> Option<&[Call]> {
        match self {
            Arg::Calls(calls) => Some(calls),
            _ => None,
        }
    }

    pub fn numbers(values: &[f64]) -> Arg {
        Arg::List(values.iter().copied().map(Arg::Number).collect())
    }
}

/// One node of the call tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub op: Op,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<&'static str, Arg>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Call>,
}

impl Call {
    pub fn new(op: Op) -> Self {
        Self {
            op,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn kwarg(mut self, key: &'static str, arg: Arg) -> Self {
        self.kwargs.insert(key, arg);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Arg> {
        self.kwargs.get(key)
    }

    pub fn number(&self, index: usize) -> Option<f64> {
        self.args.get(index).and_then(Arg::as_number)
    }

    pub fn point(&self, index: usize) -> Option<Point> {
        self.args.get(index).and_then(Arg::as_point)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Leaf operators in replay order, descending into wrappers (not into kwarg scopes).
    pub fn leaves(calls: &[Call]) -> Vec<&Call> {
        let mut out = Vec::new();
        for call in calls {
            if call.children.is_empty() {
                out.push(call);
            } else {
                out.extend(Call::leaves(&call.children));
            }
        }
        out
    }
}

/// Explicit scope builder over a list of calls.
///
/// `enter` appends a wrapping call and returns its child list, so nesting is spelled out by
/// the handle the caller holds.
pub trait Scope {
    fn add(&mut self, call: Call);
    fn enter(&mut self, call: Call) -> &mut Vec<Call>;
}

impl Scope for Vec<Call> {
    fn add(&mut self, call: Call) {
        self.push(call);
    }

    fn enter(&mut self, call: Call) -> &mut Vec<Call> {
        let index = self.len();
        self.push(call);
        &mut self[index].children
    }
}
