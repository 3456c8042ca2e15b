use super::{Content, requirements_pass, union};
use crate::call::{Arg, Call, Op};
use crate::color::Paint;
use crate::document::Document;
use crate::error::{ElementResult, SkipElement};
use crate::font::FontRequest;
use crate::length::{Axis, Length, LengthContext};
use crate::properties::Property;
use crate::state::State;
use crate::types::{Color, Rect};
use crate::xml::{XmlElement, XmlNode};

/// Per-element `x`/`y`/`dx`/`dy` lists. Every character inside the element consumes one
/// entry, whichever descendant it belongs to.
#[derive(Debug, Default)]
struct Frame {
    x: Vec<f64>,
    y: Vec<f64>,
    dx: Vec<f64>,
    dy: Vec<f64>,
    consumed: usize,
}

impl Frame {
    fn new(element: &XmlElement, state: &State) -> Self {
        let ctx = state.length_context();
        Self {
            x: length_list(element.attribute("x"), &ctx, Axis::X),
            y: length_list(element.attribute("y"), &ctx, Axis::Y),
            dx: length_list(element.attribute("dx"), &ctx, Axis::X),
            dy: length_list(element.attribute("dy"), &ctx, Axis::Y),
            consumed: 0,
        }
    }
}

fn length_list(value: Option<&str>, ctx: &LengthContext, axis: Axis) -> Vec<f64> {
    value
        .unwrap_or("")
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map_while(Length::parse)
        .map(|length| length.resolve(ctx, axis))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct PieceStyle {
    font_name: Option<String>,
    family: String,
    font_size: f64,
    letter_spacing: f64,
    anchor: String,
    fill: Option<Color>,
    stroke: Option<Color>,
    stroke_width: f64,
    decoration: String,
    visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Piece {
    text: String,
    x: Option<f64>,
    y: Option<f64>,
    dx: f64,
    dy: f64,
    style: usize,
}

#[derive(Debug, Default)]
struct TextLayout {
    frames: Vec<Frame>,
    styles: Vec<PieceStyle>,
    pieces: Vec<Piece>,
    /// The next character starts a new piece even without a position of its own.
    split: bool,
    last_was_space: bool,
    seen_text: bool,
}

impl TextLayout {
    fn walk(&mut self, doc: &mut Document<'_>, element: &XmlElement, state: &State, decoration: &str) {
        let decoration = match state.specified.get(Property::TextDecoration) {
            Some(value) if value.trim() != "none" && value.trim() != "inherit" => {
                format!("{decoration} {value}").trim().to_string()
            }
            _ => decoration.to_string(),
        };
        self.frames.push(Frame::new(element, state));
        let style = piece_style(doc, state, &decoration);
        let style = match self.styles.iter().position(|s| *s == style) {
            Some(index) => index,
            None => {
                self.styles.push(style);
                self.styles.len() - 1
            }
        };
        self.split = true;

        for node in &element.children {
            match node {
                XmlNode::Text(text) => self.characters(text, style, state.preserve_space),
                XmlNode::Element(child) if matches!(child.name.as_str(), "tspan" | "a") => {
                    if !requirements_pass(child, &doc.options.language) {
                        continue;
                    }
                    let child_state = state.descend(child);
                    if !child_state.is_displayed() {
                        continue;
                    }
                    doc.count(&child.name);
                    self.walk(doc, child, &child_state, &decoration);
                    self.split = true;
                }
                XmlNode::Element(_) => {}
            }
        }
        self.frames.pop();
    }

    fn characters(&mut self, text: &str, style: usize, preserve: bool) {
        for ch in text.chars() {
            let ch = match ch {
                '\n' | '\r' | '\t' => ' ',
                other => other,
            };
            if !preserve && ch == ' ' {
                if self.last_was_space || !self.seen_text {
                    continue;
                }
                self.last_was_space = true;
            } else {
                self.last_was_space = false;
            }
            self.seen_text = true;

            let (x, y, dx, dy) = self.next_position();
            let starts_piece = self.split
                || x.is_some()
                || y.is_some()
                || dx != 0.0
                || dy != 0.0
                || self.pieces.last().is_none_or(|p| p.style != style);
            if starts_piece {
                let first = self.pieces.is_empty();
                self.pieces.push(Piece {
                    text: String::new(),
                    x: x.or(first.then_some(0.0)),
                    y: y.or(first.then_some(0.0)),
                    dx,
                    dy,
                    style,
                });
                self.split = false;
            }
            if let Some(piece) = self.pieces.last_mut() {
                piece.text.push(ch);
            }
        }
    }

    /// Innermost frame with an entry left wins; every frame consumes one entry.
    fn next_position(&mut self) -> (Option<f64>, Option<f64>, f64, f64) {
        let mut out = (None, None, None, None);
        for frame in self.frames.iter_mut().rev() {
            let i = frame.consumed;
            out.0 = out.0.or(frame.x.get(i).copied());
            out.1 = out.1.or(frame.y.get(i).copied());
            out.2 = out.2.or(frame.dx.get(i).copied());
            out.3 = out.3.or(frame.dy.get(i).copied());
        }
        for frame in &mut self.frames {
            frame.consumed += 1;
        }
        (out.0, out.1, out.2.unwrap_or(0.0), out.3.unwrap_or(0.0))
    }

    fn trim_end(&mut self) {
        while let Some(piece) = self.pieces.last_mut() {
            let trimmed = piece.text.trim_end_matches(' ').len();
            piece.text.truncate(trimmed);
            if !piece.text.is_empty() {
                break;
            }
            self.pieces.pop();
        }
    }
}

fn piece_style(doc: &mut Document<'_>, state: &State, decoration: &str) -> PieceStyle {
    let family = state.value(Property::FontFamily).to_string();
    let request = FontRequest::new(
        &family,
        state.value(Property::FontWeight),
        state.value(Property::FontStyle),
    );
    let font_name = doc
        .options
        .fonts
        .resolve(&request)
        .or_else(|| doc.options.fallback_font_name.clone());
    let letter_spacing = match state.value(Property::LetterSpacing) {
        "normal" => 0.0,
        value => Length::parse(value)
            .map(|length| length.resolve(&state.length_context(), Axis::X))
            .unwrap_or(0.0),
    };
    let stroke = if state.stroke_width > 0.0 {
        text_paint(doc, state, Property::Stroke)
    } else {
        None
    };
    PieceStyle {
        font_name,
        family,
        font_size: state.font_size,
        letter_spacing,
        anchor: state.value(Property::TextAnchor).to_string(),
        fill: text_paint(doc, state, Property::Fill),
        stroke,
        stroke_width: state.stroke_width,
        decoration: decoration.to_string(),
        visible: state.is_visible(),
    }
}

/// Solid color for text; gradients fall back to their first stop.
fn text_paint(doc: &mut Document<'_>, state: &State, property: Property) -> Option<Color> {
    let mode = doc.options.color_mode;
    match state.paint(property)? {
        Paint::None => None,
        Paint::Color(color, _) => Some(mode.convert(color)),
        Paint::CurrentColor => Some(mode.convert(state.current_color().0)),
        Paint::Url { id, fallback } => {
            if doc.ensure_gradient(&id, state) {
                let message = format!(
                    "gradient '{id}' is not supported as text {}; using its first stop color",
                    property.name()
                );
                if !doc.warnings.contains(&message) {
                    doc.warn(message);
                }
                return doc
                    .gradients
                    .resolve(&id, &state.length_context())
                    .and_then(|gradient| gradient.stops.first().map(|stop| mode.convert(stop.color)));
            }
            match fallback.as_deref() {
                Some(Paint::Color(color, _)) => Some(mode.convert(*color)),
                Some(Paint::CurrentColor) => Some(mode.convert(state.current_color().0)),
                _ => {
                    doc.warn(format!("{} references unknown paint server '{id}'", property.name()));
                    None
                }
            }
        }
    }
}

/// Builds a `text_group` of positioned runs. Widths and anchors are settled at replay time.
pub(super) fn build_text(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
) -> ElementResult<Content> {
    let mut layout = TextLayout::default();
    layout.walk(doc, element, state, "");
    if !state.preserve_space {
        layout.trim_end();
    }
    if layout.pieces.is_empty() {
        return Err(SkipElement::Quiet);
    }

    let height = doc.canvas_height;
    let mut group = Call::new(Op::TextGroup);
    if let Some(length) = state
        .length(element, "textLength", Axis::X)
        .filter(|length| *length > 0.0)
    {
        group = group.kwarg("text_length", Arg::Number(length));
    }

    let mut missing_font = None;
    let mut bbox = None;
    let (mut cursor_x, mut cursor_y) = (0.0, 0.0);
    for piece in &layout.pieces {
        let style = &layout.styles[piece.style];
        let x = piece.x.unwrap_or(cursor_x) + piece.dx;
        let y = piece.y.unwrap_or(cursor_y) + piece.dy;
        let Some(font_name) = &style.font_name else {
            missing_font.get_or_insert_with(|| style.family.clone());
            continue;
        };
        let width = doc
            .options
            .fonts
            .measure_text_width(font_name, style.font_size, &piece.text)
            + style.letter_spacing * piece.text.chars().count() as f64;
        bbox = union(
            bbox,
            Some(Rect::new(x, y - style.font_size, width, style.font_size * 1.2)),
        );
        (cursor_x, cursor_y) = (x + width, y);

        let mut call = Call::new(Op::DrawText)
            .arg(Arg::Text(piece.text.clone()))
            .kwarg("font_name", Arg::Text(font_name.clone()))
            .kwarg("font_size", Arg::Number(style.font_size))
            .kwarg("letter_spacing", Arg::Number(style.letter_spacing))
            .kwarg("anchor", Arg::Text(style.anchor.clone()));
        if let Some(x) = piece.x {
            call = call.kwarg("x", Arg::Number(x));
        }
        if let Some(y) = piece.y {
            call = call.kwarg("y", Arg::Number(height - y));
        }
        if piece.dx != 0.0 {
            call = call.kwarg("dx", Arg::Number(piece.dx));
        }
        if piece.dy != 0.0 {
            call = call.kwarg("dy", Arg::Number(-piece.dy));
        }
        if let Some(fill) = style.fill {
            call = call.kwarg("fill", Arg::Color(fill));
        }
        if let Some(stroke) = style.stroke {
            call = call
                .kwarg("stroke", Arg::Color(stroke))
                .kwarg("stroke_width", Arg::Number(style.stroke_width));
        }
        if !style.decoration.is_empty() {
            call = call.kwarg("decoration", Arg::Text(style.decoration.clone()));
        }
        if !style.visible {
            call = call.kwarg("visible", Arg::Bool(false));
        }
        group.children.push(call);
    }
    if let Some(family) = missing_font {
        doc.warn(format!("no font available for '{family}'"));
    }
    if group.children.is_empty() {
        return Err(SkipElement::Quiet);
    }
    Ok(Content {
        calls: vec![group],
        bbox,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::xml::parse_document;

    fn build(markup: &str, options: Options) -> (Vec<Call>, Vec<String>) {
        let root = parse_document(markup).expect("parse");
        let mut doc = Document::new(&root, &options, None);
        doc.canvas_height = 100.0;
        let text = root.element_children().next().expect("text").clone();
        let state = State::initial(100.0, 100.0).descend(&root).descend(&text);
        let calls = build_text(&mut doc, &text, &state)
            .map(|content| content.calls)
            .unwrap_or_default();
        (calls, doc.warnings)
    }

    fn runs(calls: &[Call]) -> Vec<&str> {
        calls[0]
            .children
            .iter()
            .filter_map(|c| c.args[0].as_text())
            .collect()
    }

    #[test]
    fn whitespace_collapses_and_tspans_split_runs() {
        let (calls, _) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text x="10" y="20">
              Hello   <tspan fill="red">big</tspan> world  </text></svg>"#,
            Options::new(),
        );
        assert_eq!(runs(&calls), vec!["Hello ", "big", " world"]);
        let first = &calls[0].children[0];
        assert_eq!(first.get("x").and_then(Arg::as_number), Some(10.0));
        assert_eq!(first.get("y").and_then(Arg::as_number), Some(80.0));
        assert_eq!(
            calls[0].children[1].get("fill").and_then(Arg::as_color),
            Some(Color::rgb(255, 0, 0))
        );
    }

    #[test]
    fn position_lists_split_leading_characters() {
        let (calls, _) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text x="1 2" dy="0 5">abc</text></svg>"#,
            Options::new(),
        );
        assert_eq!(runs(&calls), vec!["a", "bc"]);
        assert_eq!(calls[0].children[1].get("x").and_then(Arg::as_number), Some(2.0));
        assert_eq!(calls[0].children[1].get("dy").and_then(Arg::as_number), Some(-5.0));
    }

    #[test]
    fn preserve_keeps_spaces() {
        let (calls, _) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text xml:space="preserve">  a  b </text></svg>"#,
            Options::new(),
        );
        assert_eq!(runs(&calls), vec!["  a  b "]);
    }

    #[test]
    fn text_length_and_decoration() {
        let (calls, _) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text textLength="50" text-decoration="underline">ab</text></svg>"#,
            Options::new(),
        );
        assert_eq!(calls[0].get("text_length").and_then(Arg::as_number), Some(50.0));
        assert_eq!(
            calls[0].children[0].get("decoration").and_then(Arg::as_text),
            Some("underline")
        );
    }

    #[test]
    fn gradient_text_uses_first_stop_and_warns_once() {
        let (calls, warnings) = build(
            r##"<svg xmlns="http://www.w3.org/2000/svg"><text fill="url(#g)">a<tspan x="5">b</tspan></text>
            <linearGradient id="g"><stop offset="0" stop-color="lime"/><stop offset="1" stop-color="blue"/></linearGradient></svg>"##,
            Options::new(),
        );
        assert_eq!(
            calls[0].children[0].get("fill").and_then(Arg::as_color),
            Some(Color::rgb(0, 255, 0))
        );
        assert_eq!(
            warnings,
            vec!["gradient 'g' is not supported as text fill; using its first stop color".to_string()]
        );
    }

    #[test]
    fn unresolvable_font_without_fallback_warns() {
        let (calls, warnings) = build(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><text font-family="Nope">a</text></svg>"#,
            Options::new().fallback_font_name(None),
        );
        assert!(calls.is_empty());
        assert_eq!(warnings, vec!["no font available for 'Nope'".to_string()]);
    }
}
