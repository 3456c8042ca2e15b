mod call;
mod canvas;
mod color;
mod css;
mod debug;
mod document;
mod elements;
mod error;
mod font;
mod gradient;
mod image_loader;
mod length;
mod matrix;
mod options;
mod path;
mod properties;
mod renderer;
mod shading;
mod sizing;
mod state;
mod transform;
mod types;
mod xml;

pub use call::{Arg, Call, Op};
pub use canvas::{Canvas, Command, RecordingCanvas, TextStyle};
pub use color::{Paint, parse_color};
use debug::DebugLogger;
use document::Document;
pub use error::SvgError;
pub use font::{FontRegistry, FontRequest, FontWeight};
use gradient::GradientRegistry;
pub use gradient::{GradientGeometry, ResolvedGradient, Spread, Stop, Units};
pub use image_loader::{DataUriLoader, ImageData, ImageLoader};
pub use length::{Axis, Length, LengthContext, Unit};
pub use matrix::Matrix;
pub use options::{ColorMode, Options};
pub use path::{PathCommand, PathError, parse_path};
use renderer::Renderer;
pub use shading::{
    GradientPaint, MAX_REPEAT_COUNT, Shading, ShadingFunction, ShadingGeometry, ShadingPattern,
    build_gradient_paint,
};
pub use sizing::{Align, AspectRatio, Sizing, SizingRequest, ViewBox};
pub use transform::parse_transform;
pub use types::{Color, ColorSpace, FillRule, LineCap, LineJoin, Point, Pt, Rect};

/// A converted SVG document: the call tree built from the markup plus everything replay
/// needs. Building never touches a canvas, so one `Svg` can be drawn any number of times.
///
/// ```ignore
/// let svg = Svg::new(markup, &Options::new().width(200.0))?;
/// svg.draw(&mut canvas);
/// ```
#[derive(Debug)]
pub struct Svg {
    calls: Vec<Call>,
    sizing: Sizing,
    warnings: Vec<String>,
    gradients: GradientRegistry,
    images: Vec<ImageData>,
    origin: Point,
    cmyk: bool,
}

impl Svg {
    pub fn new(xml: &str, options: &Options) -> Result<Svg, SvgError> {
        let root = xml::parse_document(xml)?;
        let debug = match &options.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let mut doc = Document::new(&root, options, debug.clone());
        let (calls, sizing) = elements::build_root(&mut doc, &root, options)?;
        if let Some(debug) = &debug {
            debug.emit_summary("svg");
            debug.flush();
        }
        tracing::debug!(
            target: "svg2canvas",
            calls = calls.len(),
            warnings = doc.warnings.len(),
            "svg built"
        );
        Ok(Svg {
            calls,
            sizing,
            warnings: doc.warnings,
            gradients: doc.gradients,
            images: doc.images,
            origin: options.origin,
            cmyk: options.color_mode == ColorMode::Cmyk,
        })
    }

    /// Replays the drawing at the position configured with [`Options::at`].
    pub fn draw(&self, canvas: &mut dyn Canvas) {
        self.draw_at(canvas, self.origin);
    }

    /// Replays the drawing with its lower-left corner at `origin` (page space).
    pub fn draw_at(&self, canvas: &mut dyn Canvas, origin: Point) {
        Renderer::new(
            canvas,
            origin,
            self.sizing.output_height,
            &self.gradients,
            &self.images,
            self.cmyk,
        )
        .replay(&self.calls);
    }

    /// Non-fatal problems met while building, in document order.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn sizing(&self) -> &Sizing {
        &self.sizing
    }

    pub fn width(&self) -> f64 {
        self.sizing.output_width
    }

    pub fn height(&self) -> f64 {
        self.sizing.output_height
    }

    /// The call tree as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn canvas() -> RecordingCanvas {
        RecordingCanvas::new(Arc::new(FontRegistry::new()))
    }

    fn leaves(svg: &Svg) -> Vec<&'static str> {
        Call::leaves(svg.calls()).iter().map(|c| c.op.as_str()).collect()
    }

    #[test]
    fn red_square_end_to_end() {
        let svg = Svg::new(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
            <rect width="10" height="10" fill="red"/></svg>"#,
            &Options::new(),
        )
        .expect("svg");
        assert!(svg.warnings().is_empty());
        assert_eq!(leaves(&svg), vec!["fill_color", "rectangle", "fill"]);
        let save = &svg.calls()[0];
        assert_eq!(save.op, Op::Save);
        assert_eq!(save.children[1].point(0), Some(Point::new(0.0, 90.0)));

        let mut c = canvas();
        svg.draw(&mut c);
        assert_eq!(
            c.into_commands(),
            vec![
                Command::SaveState,
                Command::SetFillColor(Color::rgb(255, 0, 0)),
                Command::Rectangle {
                    x: Pt::from_f64(0.0),
                    y: Pt::from_f64(90.0),
                    width: Pt::from_f64(10.0),
                    height: Pt::from_f64(10.0),
                },
                Command::Fill(FillRule::NonZero),
                Command::RestoreState,
            ]
        );
    }

    #[test]
    fn origin_moves_the_drawing() {
        let svg = Svg::new(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <rect width="10" height="10"/></svg>"#,
            &Options::new().at(100.0, 200.0),
        )
        .expect("svg");
        let mut c = canvas();
        svg.draw(&mut c);
        assert_eq!(
            c.commands()[0],
            Command::Rectangle {
                x: Pt::from_f64(100.0),
                y: Pt::from_f64(200.0),
                width: Pt::from_f64(10.0),
                height: Pt::from_f64(10.0),
            }
        );
    }

    #[test]
    fn gradient_fill_registers_a_pattern() {
        let svg = Svg::new(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
            <defs><linearGradient id="g"><stop offset="0" stop-color="red"/><stop offset="1" stop-color="blue"/></linearGradient></defs>
            <rect width="50" height="20" fill="url(#g)"/></svg>"##,
            &Options::new(),
        )
        .expect("svg");
        let mut c = canvas();
        svg.draw(&mut c);
        let commands = c.into_commands();
        let pattern = commands
            .iter()
            .find_map(|command| match command {
                Command::DefinePattern(pattern) => Some(pattern.clone()),
                _ => None,
            })
            .expect("pattern");
        assert!(
            pattern
                .matrix
                .approx_eq(Matrix::new(50.0, 0.0, 0.0, -20.0, 0.0, 100.0), 1e-9)
        );
        assert!(commands.contains(&Command::SetFillPattern(pattern.name.clone())));
    }

    #[test]
    fn document_fatal_errors() {
        assert!(matches!(
            Svg::new("<svg", &Options::new()),
            Err(SvgError::Xml(_))
        ));
        assert!(matches!(
            Svg::new("<html/>", &Options::new()),
            Err(SvgError::MissingRoot(_))
        ));
    }

    #[test]
    fn requested_width_rescales_uniformly() {
        let svg = Svg::new(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 50 25"/>"#,
            &Options::new().width(200.0),
        )
        .expect("svg");
        assert_eq!(svg.width(), 200.0);
        assert_eq!(svg.height(), 100.0);
    }

    #[test]
    fn warnings_and_json() {
        let svg = Svg::new(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <foreignObject/><circle r="2" fill="lime"/></svg>"#,
            &Options::new(),
        )
        .expect("svg");
        assert_eq!(svg.warnings(), vec!["unsupported element <foreignObject>".to_string()]);
        let json = svg.to_json().expect("json");
        assert!(json.contains("\"curve_to\""));
    }

    #[test]
    fn json_shape_of_a_filled_rect() {
        let svg = Svg::new(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
            <rect width="10" height="10" fill="red"/></svg>"#,
            &Options::new(),
        )
        .expect("svg");
        let json: serde_json::Value =
            serde_json::from_str(&svg.to_json().expect("json")).expect("valid json");
        assert_eq!(
            json,
            serde_json::json!([
                {
                    "op": "save",
                    "children": [
                        { "op": "fill_color", "args": [{ "space": "rgb", "r": 255, "g": 0, "b": 0 }] },
                        { "op": "rectangle", "args": [{ "x": 0.0, "y": 90.0 }, 10.0, 10.0] },
                        { "op": "fill", "kwargs": { "fill_rule": "nonzero" } }
                    ]
                }
            ])
        );
    }

    #[test]
    fn debug_log_records_warnings_and_counts() {
        let path = std::env::temp_dir().join(format!("svg2canvas-debug-{}.jsonl", std::process::id()));
        let options = Options::new().debug_log(&path);
        Svg::new(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><blink/><rect width="1" height="1"/></svg>"#,
            &options,
        )
        .expect("svg");
        let log = std::fs::read_to_string(&path).expect("log");
        let _ = std::fs::remove_file(&path);
        assert!(log.contains("svg.warning"));
        assert!(log.contains("svg.summary"));
        assert!(log.contains("\"rect\":1"));
    }
}
