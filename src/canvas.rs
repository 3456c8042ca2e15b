use crate::font::FontRegistry;
use crate::image_loader::ImageData;
use crate::matrix::Matrix;
use crate::shading::ShadingPattern;
use crate::types::{Color, FillRule, LineCap, LineJoin, Point, Pt};
use std::sync::Arc;

/// Font and paint mode for a text run.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    /// Name as known to the [`FontRegistry`].
    pub font_name: String,
    pub font_size: f64,
    /// Extra advance after each character.
    pub letter_spacing: f64,
    pub fill: bool,
    pub stroke: bool,
}

/// Drawing surface the renderer replays call trees onto.
///
/// Coordinates are page space with y growing upwards. Implementations decide how each
/// operation reaches the output; [`RecordingCanvas`] keeps them as [`Command`]s.
pub trait Canvas {
    fn save_state(&mut self);
    fn restore_state(&mut self);
    /// Concatenates `matrix` onto the current transformation.
    fn concat_matrix(&mut self, matrix: &Matrix);

    fn move_to(&mut self, p: Point);
    fn line_to(&mut self, p: Point);
    fn curve_to(&mut self, c1: Point, c2: Point, p: Point);
    fn close_path(&mut self);
    fn rectangle(&mut self, lower_left: Point, width: f64, height: f64);

    fn fill(&mut self, rule: FillRule);
    fn stroke(&mut self);
    fn fill_and_stroke(&mut self, rule: FillRule);
    /// Discards the current path without painting it.
    fn end_path(&mut self);
    /// Intersects the clip with the current path and consumes the path.
    fn clip(&mut self, rule: FillRule);

    fn set_fill_color(&mut self, color: Color);
    fn set_stroke_color(&mut self, color: Color);
    fn set_line_width(&mut self, width: f64);
    fn set_line_cap(&mut self, cap: LineCap);
    fn set_line_join(&mut self, join: LineJoin);
    fn set_miter_limit(&mut self, limit: f64);
    fn set_dash(&mut self, pattern: &[f64], phase: f64);
    /// Constant alpha for fill and stroke, replacing the current values.
    fn set_opacity(&mut self, fill: f64, stroke: f64);

    fn draw_text(&mut self, text: &str, at: Point, style: &TextStyle);
    fn text_width(&self, text: &str, style: &TextStyle) -> f64;
    fn draw_image(&mut self, image: &ImageData, lower_left: Point, width: f64, height: f64);

    /// Everything drawn until [`Canvas::end_soft_mask`] becomes a luminosity mask for the
    /// remainder of the enclosing graphics state.
    fn begin_soft_mask(&mut self);
    fn end_soft_mask(&mut self);

    /// Registers a pattern resource and returns the name to paint it by.
    fn register_shading_pattern(&mut self, pattern: &ShadingPattern) -> String;
    fn set_fill_pattern(&mut self, name: &str);
    fn set_stroke_pattern(&mut self, name: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    ConcatMatrix {
        a: f64,
        b: f64,
        c: f64,
        d: f64,
        e: Pt,
        f: Pt,
    },
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    CurveTo {
        x1: Pt,
        y1: Pt,
        x2: Pt,
        y2: Pt,
        x: Pt,
        y: Pt,
    },
    ClosePath,
    Rectangle {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
    },
    Fill(FillRule),
    Stroke,
    FillStroke(FillRule),
    EndPath,
    ClipPath(FillRule),
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetFillPattern(String),
    SetStrokePattern(String),
    SetLineWidth(Pt),
    SetLineCap(LineCap),
    SetLineJoin(LineJoin),
    SetMiterLimit(Pt),
    SetDash {
        pattern: Vec<Pt>,
        phase: Pt,
    },
    // Values outside 0..1 are clamped.
    SetOpacity {
        fill: f64,
        stroke: f64,
    },
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
        font_name: String,
        font_size: Pt,
        letter_spacing: Pt,
        fill: bool,
        stroke: bool,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        pixel_width: u32,
        pixel_height: u32,
    },
    BeginSoftMask,
    EndSoftMask,
    DefinePattern(Box<ShadingPattern>),
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Option<Color>,
    stroke_color: Option<Color>,
    line_width: Pt,
    line_cap: LineCap,
    line_join: LineJoin,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            fill_color: Some(Color::BLACK),
            stroke_color: Some(Color::BLACK),
            line_width: Pt::from_f64(1.0),
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
        }
    }
}

/// Canvas that records every operation, dropping state changes that repeat the current value.
pub struct RecordingCanvas {
    commands: Vec<Command>,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
    fonts: Arc<FontRegistry>,
    mask_depth: usize,
}

impl RecordingCanvas {
    pub fn new(fonts: Arc<FontRegistry>) -> Self {
        Self {
            commands: Vec::new(),
            state_stack: Vec::new(),
            current_state: GraphicsState::default(),
            fonts,
            mask_depth: 0,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// True while a soft mask group is open.
    pub fn in_soft_mask(&self) -> bool {
        self.mask_depth > 0
    }

    fn push(&mut self, command: Command) {
        self.commands.push(command);
    }
}

fn pt(value: f64) -> Pt {
    Pt::from_f64(value)
}

impl Canvas for RecordingCanvas {
    fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.push(Command::SaveState);
    }

    fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.push(Command::RestoreState);
        }
    }

    fn concat_matrix(&mut self, m: &Matrix) {
        if m.is_identity() {
            return;
        }
        self.push(Command::ConcatMatrix {
            a: m.a,
            b: m.b,
            c: m.c,
            d: m.d,
            e: pt(m.e),
            f: pt(m.f),
        });
    }

    fn move_to(&mut self, p: Point) {
        self.push(Command::MoveTo { x: pt(p.x), y: pt(p.y) });
    }

    fn line_to(&mut self, p: Point) {
        self.push(Command::LineTo { x: pt(p.x), y: pt(p.y) });
    }

    fn curve_to(&mut self, c1: Point, c2: Point, p: Point) {
        self.push(Command::CurveTo {
            x1: pt(c1.x),
            y1: pt(c1.y),
            x2: pt(c2.x),
            y2: pt(c2.y),
            x: pt(p.x),
            y: pt(p.y),
        });
    }

    fn close_path(&mut self) {
        self.push(Command::ClosePath);
    }

    fn rectangle(&mut self, lower_left: Point, width: f64, height: f64) {
        self.push(Command::Rectangle {
            x: pt(lower_left.x),
            y: pt(lower_left.y),
            width: pt(width),
            height: pt(height),
        });
    }

    fn fill(&mut self, rule: FillRule) {
        self.push(Command::Fill(rule));
    }

    fn stroke(&mut self) {
        self.push(Command::Stroke);
    }

    fn fill_and_stroke(&mut self, rule: FillRule) {
        self.push(Command::FillStroke(rule));
    }

    fn end_path(&mut self) {
        self.push(Command::EndPath);
    }

    fn clip(&mut self, rule: FillRule) {
        self.push(Command::ClipPath(rule));
    }

    fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == Some(color) {
            return;
        }
        self.current_state.fill_color = Some(color);
        self.push(Command::SetFillColor(color));
    }

    fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == Some(color) {
            return;
        }
        self.current_state.stroke_color = Some(color);
        self.push(Command::SetStrokeColor(color));
    }

    fn set_line_width(&mut self, width: f64) {
        let width = pt(width.max(0.0));
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.push(Command::SetLineWidth(width));
    }

    fn set_line_cap(&mut self, cap: LineCap) {
        if self.current_state.line_cap == cap {
            return;
        }
        self.current_state.line_cap = cap;
        self.push(Command::SetLineCap(cap));
    }

    fn set_line_join(&mut self, join: LineJoin) {
        if self.current_state.line_join == join {
            return;
        }
        self.current_state.line_join = join;
        self.push(Command::SetLineJoin(join));
    }

    fn set_miter_limit(&mut self, limit: f64) {
        self.push(Command::SetMiterLimit(pt(limit.max(1.0))));
    }

    fn set_dash(&mut self, pattern: &[f64], phase: f64) {
        self.push(Command::SetDash {
            pattern: pattern.iter().map(|v| pt(*v)).collect(),
            phase: pt(phase),
        });
    }

    fn set_opacity(&mut self, fill: f64, stroke: f64) {
        self.push(Command::SetOpacity {
            fill: fill.clamp(0.0, 1.0),
            stroke: stroke.clamp(0.0, 1.0),
        });
    }

    fn draw_text(&mut self, text: &str, at: Point, style: &TextStyle) {
        self.push(Command::DrawString {
            x: pt(at.x),
            y: pt(at.y),
            text: text.to_string(),
            font_name: style.font_name.clone(),
            font_size: pt(style.font_size),
            letter_spacing: pt(style.letter_spacing),
            fill: style.fill,
            stroke: style.stroke,
        });
    }

    fn text_width(&self, text: &str, style: &TextStyle) -> f64 {
        let base = self
            .fonts
            .measure_text_width(&style.font_name, style.font_size, text);
        base + style.letter_spacing * text.chars().count() as f64
    }

    fn draw_image(&mut self, image: &ImageData, lower_left: Point, width: f64, height: f64) {
        self.push(Command::DrawImage {
            x: pt(lower_left.x),
            y: pt(lower_left.y),
            width: pt(width),
            height: pt(height),
            pixel_width: image.width,
            pixel_height: image.height,
        });
    }

    fn begin_soft_mask(&mut self) {
        self.mask_depth += 1;
        self.push(Command::BeginSoftMask);
    }

    fn end_soft_mask(&mut self) {
        if self.mask_depth == 0 {
            return;
        }
        self.mask_depth -= 1;
        self.push(Command::EndSoftMask);
    }

    fn register_shading_pattern(&mut self, pattern: &ShadingPattern) -> String {
        self.push(Command::DefinePattern(Box::new(pattern.clone())));
        pattern.name.clone()
    }

    fn set_fill_pattern(&mut self, name: &str) {
        // A pattern replaces the color, so the next color change must not be elided.
        self.current_state.fill_color = None;
        self.push(Command::SetFillPattern(name.to_string()));
    }

    fn set_stroke_pattern(&mut self, name: &str) {
        self.current_state.stroke_color = None;
        self.push(Command::SetStrokePattern(name.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> RecordingCanvas {
        RecordingCanvas::new(Arc::new(FontRegistry::new()))
    }

    #[test]
    fn redundant_state_changes_are_dropped() {
        let mut c = canvas();
        c.set_fill_color(Color::BLACK);
        c.set_line_width(1.0);
        c.set_fill_color(Color::rgb(255, 0, 0));
        c.set_fill_color(Color::rgb(255, 0, 0));
        assert_eq!(c.commands(), &[Command::SetFillColor(Color::rgb(255, 0, 0))]);
    }

    #[test]
    fn restore_brings_back_previous_state() {
        let mut c = canvas();
        c.save_state();
        c.set_fill_color(Color::rgb(0, 0, 255));
        c.restore_state();
        c.set_fill_color(Color::rgb(0, 0, 255));
        c.restore_state();
        assert_eq!(
            c.into_commands(),
            vec![
                Command::SaveState,
                Command::SetFillColor(Color::rgb(0, 0, 255)),
                Command::RestoreState,
                Command::SetFillColor(Color::rgb(0, 0, 255)),
            ]
        );
    }

    #[test]
    fn pattern_resets_color_tracking() {
        let mut c = canvas();
        c.set_fill_pattern("SP1");
        c.set_fill_color(Color::BLACK);
        assert_eq!(c.commands().len(), 2);
        c.end_soft_mask();
        assert_eq!(c.commands().len(), 2);
    }

    #[test]
    fn text_width_adds_letter_spacing() {
        let c = canvas();
        let style = TextStyle {
            font_name: "Helvetica".to_string(),
            font_size: 10.0,
            letter_spacing: 0.0,
            fill: true,
            stroke: false,
        };
        let plain = c.text_width("abc", &style);
        assert!(plain > 0.0);
        let spaced = c.text_width(
            "abc",
            &TextStyle {
                letter_spacing: 2.0,
                ..style
            },
        );
        assert!((spaced - plain - 6.0).abs() < 1e-9);
    }
}
