//! Replays call trees onto a [`Canvas`].
//!
//! Build-phase coordinates are relative to the drawing's lower-left corner. The renderer
//! moves them to page space by adding the origin to every point and rehoming every matrix,
//! and settles what only the canvas knows: text widths and gradient shadings.

use crate::call::{Arg, Call, Op};
use crate::canvas::{Canvas, TextStyle};
use crate::gradient::GradientRegistry;
use crate::image_loader::ImageData;
use crate::length::LengthContext;
use crate::matrix::Matrix;
use crate::shading::{GradientPaint, build_gradient_paint};
use crate::types::{Color, FillRule, LineCap, LineJoin, Point, Rect};

/// Opacity state in effect. `fill`/`stroke` replace each other, `group` multiplies.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Alpha {
    group: f64,
    fill: f64,
    stroke: f64,
}

impl Default for Alpha {
    fn default() -> Self {
        Self {
            group: 1.0,
            fill: 1.0,
            stroke: 1.0,
        }
    }
}

impl Alpha {
    fn effective(self) -> (f64, f64) {
        (self.group * self.fill, self.group * self.stroke)
    }
}

pub(crate) struct Renderer<'a> {
    canvas: &'a mut dyn Canvas,
    origin: Point,
    /// Output height the calls were built against.
    height: f64,
    gradients: &'a GradientRegistry,
    images: &'a [ImageData],
    cmyk: bool,
    ctm: Vec<Matrix>,
    alpha: Vec<Alpha>,
}

impl<'a> Renderer<'a> {
    pub fn new(
        canvas: &'a mut dyn Canvas,
        origin: Point,
        height: f64,
        gradients: &'a GradientRegistry,
        images: &'a [ImageData],
        cmyk: bool,
    ) -> Self {
        Self {
            canvas,
            origin,
            height,
            gradients,
            images,
            cmyk,
            ctm: vec![Matrix::identity()],
            alpha: vec![Alpha::default()],
        }
    }

    pub fn replay(&mut self, calls: &[Call]) {
        for call in calls {
            self.call(call);
        }
    }

    fn ctm(&self) -> Matrix {
        self.ctm.last().copied().unwrap_or_default()
    }

    fn current_alpha(&self) -> Alpha {
        self.alpha.last().copied().unwrap_or_default()
    }

    fn point(&self, call: &Call, index: usize) -> Point {
        let p = call.point(index).unwrap_or_default();
        Point::new(p.x + self.origin.x, p.y + self.origin.y)
    }

    /// Runs `body` between a save and restore of the graphics state and both stacks.
    fn scoped(&mut self, body: impl FnOnce(&mut Self)) {
        self.canvas.save_state();
        let (ctm, alpha) = (self.ctm.len(), self.alpha.len());
        body(self);
        self.ctm.truncate(ctm);
        self.alpha.truncate(alpha);
        self.canvas.restore_state();
    }

    fn set_alpha(&mut self, alpha: Alpha) {
        self.alpha.push(alpha);
        let (fill, stroke) = alpha.effective();
        self.canvas.set_opacity(fill, stroke);
    }

    fn call(&mut self, call: &Call) {
        tracing::trace!(target: "svg2canvas", op = call.op.as_str(), "replay");
        match call.op {
            Op::TransformationMatrix => {
                let Some(matrix) = call.args.first().and_then(Arg::as_matrix) else {
                    tracing::warn!(target: "svg2canvas", "transformation_matrix without matrix");
                    return self.replay(&call.children);
                };
                let matrix = matrix.rehome(self.origin);
                self.scoped(|r| {
                    r.canvas.concat_matrix(&matrix);
                    r.ctm.push(r.ctm().multiply(matrix));
                    r.replay(&call.children);
                });
            }
            Op::Transparent => self.scoped(|r| {
                let mut alpha = r.current_alpha();
                if let Some(opacity) = call.get("opacity").and_then(Arg::as_number) {
                    alpha.group *= opacity;
                }
                if let Some(fill) = call.get("fill_opacity").and_then(Arg::as_number) {
                    alpha.fill = fill;
                }
                if let Some(stroke) = call.get("stroke_opacity").and_then(Arg::as_number) {
                    alpha.stroke = stroke;
                }
                r.set_alpha(alpha);
                r.replay(&call.children);
            }),
            Op::Clip => self.scoped(|r| {
                if let Some(path) = call.get("path").and_then(Arg::as_calls) {
                    r.replay(path);
                }
                r.canvas.clip(rule(call, "rule"));
                r.replay(&call.children);
            }),
            Op::SoftMask => self.scoped(|r| {
                if let Some(mask) = call.get("mask").and_then(Arg::as_calls) {
                    r.canvas.begin_soft_mask();
                    r.scoped(|m| {
                        m.set_alpha(Alpha::default());
                        m.replay(mask);
                    });
                    r.canvas.end_soft_mask();
                }
                r.replay(&call.children);
            }),
            Op::Save => self.scoped(|r| r.replay(&call.children)),
            Op::FillColor => {
                if let Some(color) = call.args.first().and_then(Arg::as_color) {
                    self.canvas.set_fill_color(color);
                }
            }
            Op::StrokeColor => {
                if let Some(color) = call.args.first().and_then(Arg::as_color) {
                    self.canvas.set_stroke_color(color);
                }
            }
            Op::LineWidth => {
                if let Some(width) = call.number(0) {
                    self.canvas.set_line_width(width);
                }
            }
            Op::CapStyle => {
                if let Some(cap) = text_arg(call).and_then(LineCap::parse) {
                    self.canvas.set_line_cap(cap);
                }
            }
            Op::JoinStyle => {
                if let Some(join) = text_arg(call).and_then(LineJoin::parse) {
                    self.canvas.set_line_join(join);
                }
            }
            Op::MiterLimit => {
                if let Some(limit) = call.number(0) {
                    self.canvas.set_miter_limit(limit);
                }
            }
            Op::Dash => {
                let pattern: Vec<f64> = call
                    .args
                    .first()
                    .and_then(Arg::as_list)
                    .map(|list| list.iter().filter_map(Arg::as_number).collect())
                    .unwrap_or_default();
                self.canvas.set_dash(&pattern, call.number(1).unwrap_or(0.0));
            }
            Op::MoveTo => {
                let p = self.point(call, 0);
                self.canvas.move_to(p);
            }
            Op::LineTo => {
                let p = self.point(call, 0);
                self.canvas.line_to(p);
            }
            Op::CurveTo => {
                let (c1, c2, p) = (self.point(call, 0), self.point(call, 1), self.point(call, 2));
                self.canvas.curve_to(c1, c2, p);
            }
            Op::ClosePath => self.canvas.close_path(),
            Op::Rectangle => {
                let lower_left = self.point(call, 0);
                self.canvas.rectangle(
                    lower_left,
                    call.number(1).unwrap_or(0.0),
                    call.number(2).unwrap_or(0.0),
                );
            }
            Op::Fill => self.canvas.fill(rule(call, "fill_rule")),
            Op::Stroke => self.canvas.stroke(),
            Op::FillAndStroke => self.canvas.fill_and_stroke(rule(call, "fill_rule")),
            Op::EndPath => self.canvas.end_path(),
            Op::FillGradient => self.gradient(call, true),
            Op::StrokeGradient => self.gradient(call, false),
            Op::TextGroup => self.text_group(call, &call.children),
            Op::DrawText => self.text_group(call, std::slice::from_ref(call)),
            Op::Image => self.image(call),
        }
    }

    /// Maps build-phase user space (y down, before the flip) onto the page.
    fn user_to_page(&self) -> Matrix {
        self.ctm()
            .multiply(Matrix::translate(self.origin.x, self.origin.y))
            .multiply(Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, self.height))
    }

    fn gradient(&mut self, call: &Call, fill: bool) {
        let numbers = |key: &str| -> Vec<f64> {
            call.get(key)
                .and_then(Arg::as_list)
                .map(|list| list.iter().filter_map(Arg::as_number).collect())
                .unwrap_or_default()
        };
        let id = call.get("gradient").and_then(Arg::as_text).unwrap_or("");
        let (bbox, viewport) = (numbers("bbox"), numbers("viewport"));
        let font_size = call
            .get("font_size")
            .and_then(Arg::as_number)
            .unwrap_or(crate::length::DEFAULT_FONT_SIZE);
        let ctx = LengthContext {
            font_size,
            root_font_size: font_size,
            viewport_width: viewport.first().copied().unwrap_or(0.0),
            viewport_height: viewport.get(1).copied().unwrap_or(0.0),
        };
        let bbox = match bbox.as_slice() {
            &[x, y, w, h] => Rect::new(x, y, w, h),
            _ => Rect::new(0.0, 0.0, 0.0, 0.0),
        };
        let Some(gradient) = self.gradients.resolve(id, &ctx) else {
            tracing::warn!(target: "svg2canvas", gradient = id, "gradient vanished before replay");
            return self.replay(&call.children);
        };
        let Some(paint) = build_gradient_paint(&gradient, bbox, self.user_to_page(), self.cmyk) else {
            tracing::debug!(target: "svg2canvas", gradient = id, "gradient on empty box");
            return self.replay(&call.children);
        };
        self.scoped(|r| {
            let mut alpha = r.current_alpha();
            match paint {
                GradientPaint::Nothing => {
                    if fill {
                        alpha.fill = 0.0;
                    } else {
                        alpha.stroke = 0.0;
                    }
                    r.set_alpha(alpha);
                }
                GradientPaint::Solid(color, opacity) => {
                    if fill {
                        r.canvas.set_fill_color(color);
                        alpha.fill *= opacity;
                    } else {
                        r.canvas.set_stroke_color(color);
                        alpha.stroke *= opacity;
                    }
                    if opacity < 1.0 {
                        r.set_alpha(alpha);
                    }
                }
                GradientPaint::Pattern(pattern) => {
                    let name = r.canvas.register_shading_pattern(&pattern);
                    if fill {
                        r.canvas.set_fill_pattern(&name);
                    } else {
                        r.canvas.set_stroke_pattern(&name);
                    }
                }
            }
            r.replay(&call.children);
        });
    }

    fn image(&mut self, call: &Call) {
        let index = call.get("image").and_then(Arg::as_number).unwrap_or(-1.0);
        let image = (index >= 0.0)
            .then(|| self.images.get(index as usize))
            .flatten();
        let Some(image) = image else {
            tracing::warn!(target: "svg2canvas", index, "image call without image data");
            return;
        };
        let lower_left = self.point(call, 0);
        self.canvas.draw_image(
            image,
            lower_left,
            call.number(1).unwrap_or(0.0),
            call.number(2).unwrap_or(0.0),
        );
    }

    fn text_group(&mut self, group: &Call, runs: &[Call]) {
        let mut runs: Vec<TextRun> = runs.iter().filter_map(TextRun::from_call).collect();
        if runs.is_empty() {
            return;
        }
        let placed = match group.get("text_length").and_then(Arg::as_number) {
            Some(target) => self.fit_text_length(&mut runs, target),
            None => self.layout(&runs),
        };

        self.scoped(|r| {
            for (run, at) in runs.iter().zip(&placed) {
                if !run.visible {
                    continue;
                }
                r.draw_run(run, at);
            }
        });
    }

    /// Adds letter spacing until the runs lay out to `target`. Spacing follows every
    /// character, so the difference is shared by all of them.
    fn fit_text_length(&self, runs: &mut [TextRun], target: f64) -> Vec<Placed> {
        let placed = self.layout(runs);
        let chars: usize = runs.iter().map(|run| run.text.chars().count()).sum();
        let natural: f64 = placed.iter().map(|p| p.width).sum();
        if chars == 0 || natural <= 0.0 {
            return placed;
        }
        let extra = (target - natural) / chars as f64;
        for run in runs.iter_mut() {
            run.style.letter_spacing += extra;
        }
        self.layout(runs)
    }

    /// Positions every run: absolute coordinates start a new chunk, the rest continue at
    /// the end of the previous run, and each chunk is shifted by its anchor.
    fn layout(&self, runs: &[TextRun]) -> Vec<Placed> {
        let mut placed: Vec<Placed> = Vec::with_capacity(runs.len());
        let mut chunks: Vec<(usize, f64, &str)> = Vec::new();
        let mut cursor = Point::new(0.0, self.height);
        for (index, run) in runs.iter().enumerate() {
            if index == 0 || run.x.is_some() || run.y.is_some() {
                chunks.push((index, 0.0, run.anchor.as_str()));
            }
            let at = Point::new(
                run.x.unwrap_or(cursor.x) + run.dx,
                run.y.unwrap_or(cursor.y) + run.dy,
            );
            let width = self.canvas.text_width(&run.text, &run.style);
            cursor = Point::new(at.x + width, at.y);
            placed.push(Placed { at, width });
        }
        let mut bounds = chunks.iter().map(|(start, _, _)| *start).skip(1).collect::<Vec<_>>();
        bounds.push(runs.len());
        for ((start, shift, anchor), end) in chunks.iter_mut().zip(bounds) {
            let first = placed[*start].at.x;
            let last = &placed[end - 1];
            let extent = last.at.x + last.width - first;
            *shift = match *anchor {
                "middle" => -extent / 2.0,
                "end" => -extent,
                _ => 0.0,
            };
            for p in &mut placed[*start..end] {
                p.at.x += *shift;
            }
        }
        placed
    }

    fn draw_run(&mut self, run: &TextRun, placed: &Placed) {
        let at = Point::new(placed.at.x + self.origin.x, placed.at.y + self.origin.y);
        let mut style = run.style.clone();
        if let Some(color) = run.fill {
            self.canvas.set_fill_color(color);
            style.fill = true;
        }
        if let Some(color) = run.stroke {
            self.canvas.set_stroke_color(color);
            self.canvas.set_line_width(run.stroke_width);
            style.stroke = true;
        }
        if style.fill || style.stroke {
            self.canvas.draw_text(&run.text, at, &style);
        }

        let size = style.font_size;
        let Some(color) = run.fill.or(run.stroke) else {
            return;
        };
        for (keyword, offset) in [("underline", -0.1), ("line-through", 0.3)] {
            if !run.decoration.split_whitespace().any(|d| d == keyword) {
                continue;
            }
            let thickness = 0.05 * size;
            self.canvas.set_fill_color(color);
            self.canvas.rectangle(
                Point::new(at.x, at.y + offset * size - thickness / 2.0),
                placed.width,
                thickness,
            );
            self.canvas.fill(FillRule::NonZero);
        }
    }
}

fn text_arg(call: &Call) -> Option<&str> {
    call.args.first().and_then(Arg::as_text)
}

fn rule(call: &Call, key: &str) -> FillRule {
    call.get(key)
        .and_then(Arg::as_text)
        .map_or(FillRule::NonZero, FillRule::parse)
}

/// `draw_text` call decoded for layout.
#[derive(Debug, Clone)]
struct TextRun {
    text: String,
    style: TextStyle,
    x: Option<f64>,
    y: Option<f64>,
    dx: f64,
    dy: f64,
    anchor: String,
    fill: Option<Color>,
    stroke: Option<Color>,
    stroke_width: f64,
    decoration: String,
    visible: bool,
}

impl TextRun {
    fn from_call(call: &Call) -> Option<TextRun> {
        if call.op != Op::DrawText {
            return None;
        }
        let number = |key: &str| call.get(key).and_then(Arg::as_number);
        let text = |key: &str| call.get(key).and_then(Arg::as_text).unwrap_or("").to_string();
        Some(TextRun {
            text: text_arg(call)?.to_string(),
            style: TextStyle {
                font_name: text("font_name"),
                font_size: number("font_size").unwrap_or(crate::length::DEFAULT_FONT_SIZE),
                letter_spacing: number("letter_spacing").unwrap_or(0.0),
                fill: false,
                stroke: false,
            },
            x: number("x"),
            y: number("y"),
            dx: number("dx").unwrap_or(0.0),
            dy: number("dy").unwrap_or(0.0),
            anchor: text("anchor"),
            fill: call.get("fill").and_then(Arg::as_color),
            stroke: call.get("stroke").and_then(Arg::as_color),
            stroke_width: number("stroke_width").unwrap_or(1.0),
            decoration: text("decoration"),
            visible: call.get("visible").and_then(Arg::as_bool).unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Placed {
    at: Point,
    width: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Command, RecordingCanvas};
    use crate::font::FontRegistry;
    use crate::types::Pt;
    use std::sync::Arc;

    fn replay(calls: &[Call], origin: Point) -> Vec<Command> {
        let gradients = GradientRegistry::default();
        let mut canvas = RecordingCanvas::new(Arc::new(FontRegistry::new()));
        Renderer::new(&mut canvas, origin, 100.0, &gradients, &[], false).replay(calls);
        canvas.into_commands()
    }

    fn text(value: &str) -> Arg {
        Arg::Text(value.to_string())
    }

    #[test]
    fn points_and_matrices_move_to_origin() {
        let mut scope = Call::new(Op::TransformationMatrix).arg(Arg::Matrix(Matrix::scale(2.0, 2.0)));
        scope
            .children
            .push(Call::new(Op::MoveTo).arg(Arg::Point(Point::new(1.0, 1.0))));
        let commands = replay(&[scope], Point::new(10.0, 20.0));
        assert_eq!(commands[0], Command::SaveState);
        assert_eq!(
            commands[1],
            Command::ConcatMatrix {
                a: 2.0,
                b: 0.0,
                c: 0.0,
                d: 2.0,
                e: Pt::from_f64(-10.0),
                f: Pt::from_f64(-20.0),
            }
        );
        assert_eq!(
            commands[2],
            Command::MoveTo {
                x: Pt::from_f64(11.0),
                y: Pt::from_f64(21.0)
            }
        );
        assert_eq!(commands[3], Command::RestoreState);
    }

    #[test]
    fn nested_opacity_multiplies_group_and_replaces_fill() {
        let mut outer = Call::new(Op::Transparent)
            .kwarg("opacity", Arg::Number(0.5))
            .kwarg("fill_opacity", Arg::Number(0.5));
        outer
            .children
            .push(Call::new(Op::Transparent).kwarg("fill_opacity", Arg::Number(0.8)));
        let commands = replay(&[outer], Point::default());
        let opacities: Vec<(f64, f64)> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetOpacity { fill, stroke } => Some((*fill, *stroke)),
                _ => None,
            })
            .collect();
        assert_eq!(opacities, vec![(0.25, 0.5), (0.4, 0.5)]);
    }

    #[test]
    fn clip_builds_path_before_children() {
        let mut clip = Call::new(Op::Clip)
            .kwarg(
                "path",
                Arg::Calls(vec![
                    Call::new(Op::Rectangle)
                        .arg(Arg::Point(Point::new(0.0, 0.0)))
                        .arg(Arg::Number(5.0))
                        .arg(Arg::Number(5.0)),
                ]),
            )
            .kwarg("rule", text("evenodd"));
        clip.children.push(Call::new(Op::EndPath));
        let commands = replay(&[clip], Point::default());
        assert!(matches!(commands[1], Command::Rectangle { .. }));
        assert_eq!(commands[2], Command::ClipPath(FillRule::EvenOdd));
        assert_eq!(commands[3], Command::EndPath);
    }

    #[test]
    fn middle_anchor_centers_each_chunk() {
        let run = |x: f64, label: &str| {
            Call::new(Op::DrawText)
                .arg(text(label))
                .kwarg("x", Arg::Number(x))
                .kwarg("y", Arg::Number(50.0))
                .kwarg("font_name", text("Courier"))
                .kwarg("font_size", Arg::Number(10.0))
                .kwarg("anchor", text("middle"))
                .kwarg("fill", Arg::Color(Color::BLACK))
        };
        let mut group = Call::new(Op::TextGroup);
        group.children = vec![run(20.0, "ab"), run(60.0, "abcd")];
        let fonts = FontRegistry::new();
        let ab = fonts.measure_text_width("Courier", 10.0, "ab");
        let abcd = fonts.measure_text_width("Courier", 10.0, "abcd");
        let commands = replay(&[group], Point::default());
        let xs: Vec<f64> = commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { x, .. } => Some(x.to_f64()),
                _ => None,
            })
            .collect();
        assert_eq!(xs.len(), 2);
        assert!((xs[0] - (20.0 - ab / 2.0)).abs() < 1e-3);
        assert!((xs[1] - (60.0 - abcd / 2.0)).abs() < 1e-3);
    }

    #[test]
    fn text_length_spreads_letters() {
        let mut group = Call::new(Op::TextGroup).kwarg("text_length", Arg::Number(100.0));
        group.children.push(
            Call::new(Op::DrawText)
                .arg(text("abc"))
                .kwarg("x", Arg::Number(0.0))
                .kwarg("y", Arg::Number(0.0))
                .kwarg("font_name", text("Courier"))
                .kwarg("font_size", Arg::Number(10.0))
                .kwarg("fill", Arg::Color(Color::BLACK)),
        );
        let natural = FontRegistry::new().measure_text_width("Courier", 10.0, "abc");
        let commands = replay(&[group], Point::default());
        let spacing = commands.iter().find_map(|c| match c {
            Command::DrawString { letter_spacing, .. } => Some(letter_spacing.to_f64()),
            _ => None,
        });
        let expected = (100.0 - natural) / 3.0;
        assert!((spacing.expect("text drawn") - expected).abs() < 1e-3);
    }

    #[test]
    fn text_length_fit_matches_target_width() {
        let run = |label: &str, x: Option<f64>| {
            let mut call = Call::new(Op::DrawText)
                .arg(text(label))
                .kwarg("y", Arg::Number(0.0))
                .kwarg("font_name", text("Helvetica"))
                .kwarg("font_size", Arg::Number(12.0))
                .kwarg("letter_spacing", Arg::Number(1.5));
            if let Some(x) = x {
                call = call.kwarg("x", Arg::Number(x));
            }
            TextRun::from_call(&call).expect("run")
        };
        let mut runs = vec![run("Hello ", Some(5.0)), run("world", None)];
        let gradients = GradientRegistry::default();
        let mut canvas = RecordingCanvas::new(Arc::new(FontRegistry::new()));
        let renderer = Renderer::new(&mut canvas, Point::default(), 100.0, &gradients, &[], false);
        let placed = renderer.fit_text_length(&mut runs, 120.0);
        let width: f64 = placed.iter().map(|p| p.width).sum();
        assert!((width - 120.0).abs() < 1e-6);
        let last = &placed[1];
        assert!((last.at.x + last.width - placed[0].at.x - 120.0).abs() < 1e-6);
    }

    #[test]
    fn underline_is_a_filled_bar() {
        let mut group = Call::new(Op::TextGroup);
        group.children.push(
            Call::new(Op::DrawText)
                .arg(text("a"))
                .kwarg("x", Arg::Number(0.0))
                .kwarg("y", Arg::Number(50.0))
                .kwarg("font_name", text("Courier"))
                .kwarg("font_size", Arg::Number(20.0))
                .kwarg("fill", Arg::Color(Color::BLACK))
                .kwarg("decoration", text("underline")),
        );
        let commands = replay(&[group], Point::default());
        let bar = commands.iter().find_map(|c| match c {
            Command::Rectangle { y, height, .. } => Some((y.to_f64(), height.to_f64())),
            _ => None,
        });
        let (y, height) = bar.expect("underline");
        assert!((height - 1.0).abs() < 1e-3);
        assert!((y - 47.5).abs() < 1e-3);
    }
}
