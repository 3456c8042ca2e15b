use crate::matrix::Matrix;
use crate::transform::parse_number_list;
use serde::Serialize;

// Replaced-element size used when neither the element nor its container gives one.
const FALLBACK_WIDTH: f64 = 300.0;
const FALLBACK_HEIGHT: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewBox {
    pub fn parse(input: &str) -> Option<ViewBox> {
        match parse_number_list(input)?.as_slice() {
            &[x, y, width, height] => Some(ViewBox {
                x,
                y,
                width,
                height,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Min,
    Mid,
    Max,
}

impl Align {
    fn fraction(self) -> f64 {
        match self {
            Align::Min => 0.0,
            Align::Mid => 0.5,
            Align::Max => 1.0,
        }
    }
}

/// Parsed `preserveAspectRatio`. `align == None` means `none` (non-uniform scaling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AspectRatio {
    pub align: Option<(Align, Align)>,
    pub slice: bool,
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self {
            align: Some((Align::Mid, Align::Mid)),
            slice: false,
        }
    }
}

impl AspectRatio {
    /// Invalid input yields the default (`xMidYMid meet`).
    pub fn parse(input: &str) -> AspectRatio {
        let mut words = input.split_whitespace();
        let mut first = words.next();
        if first == Some("defer") {
            first = words.next();
        }
        let align = match first {
            Some("none") => None,
            Some(word) => match parse_align(word) {
                Some(align) => Some(align),
                None => return AspectRatio::default(),
            },
            None => return AspectRatio::default(),
        };
        let slice = match words.next() {
            Some("slice") => true,
            Some("meet") | None => false,
            Some(_) => return AspectRatio::default(),
        };
        AspectRatio { align, slice }
    }
}

fn parse_align(word: &str) -> Option<(Align, Align)> {
    let axis = |part: &str| match part {
        "Min" => Some(Align::Min),
        "Mid" => Some(Align::Mid),
        "Max" => Some(Align::Max),
        _ => None,
    };
    let x = word.strip_prefix('x')?;
    let (x_part, y_part) = x.split_once('Y')?;
    Some((axis(x_part)?, axis(y_part)?))
}

/// Viewport inputs, with lengths already resolved to user units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizingRequest {
    pub container_width: f64,
    pub container_height: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub view_box: Option<ViewBox>,
    pub aspect: AspectRatio,
    /// Explicit output size from the embedding call; re-scales the result uniformly.
    pub requested_width: Option<f64>,
    pub requested_height: Option<f64>,
}

/// Resolved viewport geometry.
///
/// `x_offset`/`y_offset` are the viewBox origin minus the alignment shift (the shift is in
/// output units). `transform` maps viewBox user space onto the output box and is what drawing
/// code uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sizing {
    pub x_offset: f64,
    pub y_offset: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    pub output_width: f64,
    pub output_height: f64,
    /// User-space dimensions percentages resolve against.
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub diagonal: f64,
    pub transform: Matrix,
    /// Content overflows the output box (`slice`); callers must clip.
    pub needs_clip: bool,
}

impl Sizing {
    pub fn compute(request: &SizingRequest) -> Sizing {
        let container_width = if request.container_width > 0.0 {
            request.container_width
        } else {
            FALLBACK_WIDTH
        };
        let container_height = if request.container_height > 0.0 {
            request.container_height
        } else {
            FALLBACK_HEIGHT
        };

        let (mut output_width, mut output_height) = match (request.view_box, request.width, request.height) {
            (_, Some(w), Some(h)) => (w, h),
            (Some(vb), Some(w), None) if vb.width > 0.0 => (w, w * vb.height / vb.width),
            (Some(vb), None, Some(h)) if vb.height > 0.0 => (h * vb.width / vb.height, h),
            (Some(vb), None, None) if vb.width > 0.0 => {
                (container_width, container_width * vb.height / vb.width)
            }
            (_, w, h) => (w.unwrap_or(container_width), h.unwrap_or(container_height)),
        };

        let (mut x_scale, mut y_scale, mut align_x, mut align_y) = match request.view_box {
            Some(vb) if vb.width > 0.0 && vb.height > 0.0 => {
                let sx = output_width / vb.width;
                let sy = output_height / vb.height;
                match request.aspect.align {
                    None => (sx, sy, 0.0, 0.0),
                    Some((ax, ay)) => {
                        let s = if request.aspect.slice { sx.max(sy) } else { sx.min(sy) };
                        let ax = (output_width - vb.width * s) * ax.fraction();
                        let ay = (output_height - vb.height * s) * ay.fraction();
                        (s, s, ax, ay)
                    }
                }
            }
            _ => (1.0, 1.0, 0.0, 0.0),
        };

        let factor = match (request.requested_width, request.requested_height) {
            (Some(w), _) if output_width > 0.0 => w / output_width,
            (None, Some(h)) if output_height > 0.0 => h / output_height,
            _ => 1.0,
        };
        if factor != 1.0 {
            output_width *= factor;
            output_height *= factor;
            x_scale *= factor;
            y_scale *= factor;
            align_x *= factor;
            align_y *= factor;
        }

        let (vb_x, vb_y) = request.view_box.map_or((0.0, 0.0), |vb| (vb.x, vb.y));
        let (viewport_width, viewport_height) = match request.view_box {
            Some(vb) => (vb.width, vb.height),
            None => (output_width / factor, output_height / factor),
        };
        let transform = Matrix::translate(align_x, align_y)
            .multiply(Matrix::scale(x_scale, y_scale))
            .multiply(Matrix::translate(-vb_x, -vb_y));
        let needs_clip = request.aspect.slice
            && request.aspect.align.is_some()
            && request.view_box.is_some_and(|vb| {
                (vb.width * x_scale - output_width).abs() > 1e-9
                    || (vb.height * y_scale - output_height).abs() > 1e-9
            });

        Sizing {
            x_offset: vb_x - align_x,
            y_offset: vb_y - align_y,
            x_scale,
            y_scale,
            output_width,
            output_height,
            viewport_width,
            viewport_height,
            diagonal: libm::sqrt(viewport_width.powi(2) + viewport_height.powi(2))
                / std::f64::consts::SQRT_2,
            transform,
            needs_clip,
        }
    }

    /// Any non-positive or non-finite dimension makes the viewport unrenderable.
    pub fn is_valid(&self) -> bool {
        [
            self.output_width,
            self.output_height,
            self.viewport_width,
            self.viewport_height,
            self.x_scale,
            self.y_scale,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    #[test]
    fn meet_alignment_matches_reference_values() {
        let sizing = Sizing::compute(&SizingRequest {
            container_width: 1200.0,
            container_height: 800.0,
            width: Some(150.0),
            height: Some(200.0),
            view_box: ViewBox::parse("0 -30 300 800"),
            aspect: AspectRatio::parse("xMaxYMid meet"),
            ..SizingRequest::default()
        });
        assert_eq!(sizing.x_scale, 0.25);
        assert_eq!(sizing.y_scale, 0.25);
        assert_eq!(sizing.output_width, 150.0);
        assert_eq!(sizing.output_height, 200.0);
        assert_eq!(sizing.x_offset, -75.0);
        assert_eq!(sizing.y_offset, -30.0);
        assert!(sizing.is_valid());
        assert!(!sizing.needs_clip);

        // The viewBox's top-right corner lands on the output's top-right corner.
        let corner = sizing.transform.apply(Point::new(300.0, -30.0));
        assert!((corner.x - 150.0).abs() < 1e-9 && corner.y.abs() < 1e-9);
    }

    #[test]
    fn no_view_box_uses_attributes_or_container() {
        let sizing = Sizing::compute(&SizingRequest {
            container_width: 100.0,
            container_height: 100.0,
            ..SizingRequest::default()
        });
        assert_eq!((sizing.output_width, sizing.output_height), (100.0, 100.0));
        assert_eq!((sizing.x_scale, sizing.y_scale), (1.0, 1.0));
        assert!(sizing.transform.is_identity());

        let fallback = Sizing::compute(&SizingRequest::default());
        assert_eq!((fallback.output_width, fallback.output_height), (300.0, 150.0));
    }

    #[test]
    fn missing_height_follows_view_box_ratio() {
        let sizing = Sizing::compute(&SizingRequest {
            width: Some(200.0),
            view_box: ViewBox::parse("0 0 100 50"),
            ..SizingRequest::default()
        });
        assert_eq!(sizing.output_height, 100.0);
        assert_eq!(sizing.x_scale, 2.0);
    }

    #[test]
    fn requested_width_rescales_uniformly() {
        let sizing = Sizing::compute(&SizingRequest {
            width: Some(100.0),
            height: Some(50.0),
            view_box: ViewBox::parse("0 0 100 50"),
            requested_width: Some(300.0),
            ..SizingRequest::default()
        });
        assert_eq!((sizing.output_width, sizing.output_height), (300.0, 150.0));
        assert_eq!((sizing.x_scale, sizing.y_scale), (3.0, 3.0));
    }

    #[test]
    fn slice_and_none() {
        let slice = Sizing::compute(&SizingRequest {
            width: Some(100.0),
            height: Some(100.0),
            view_box: ViewBox::parse("0 0 200 100"),
            aspect: AspectRatio::parse("xMidYMid slice"),
            ..SizingRequest::default()
        });
        assert_eq!(slice.x_scale, 1.0);
        assert_eq!(slice.x_offset, 50.0);
        assert!(slice.needs_clip);

        let stretched = Sizing::compute(&SizingRequest {
            width: Some(100.0),
            height: Some(100.0),
            view_box: ViewBox::parse("0 0 200 100"),
            aspect: AspectRatio::parse("none"),
            ..SizingRequest::default()
        });
        assert_eq!((stretched.x_scale, stretched.y_scale), (0.5, 1.0));
    }

    #[test]
    fn degenerate_sizes_are_invalid() {
        let sizing = Sizing::compute(&SizingRequest {
            width: Some(0.0),
            height: Some(10.0),
            ..SizingRequest::default()
        });
        assert!(!sizing.is_valid());
        let sizing = Sizing::compute(&SizingRequest {
            width: Some(10.0),
            height: Some(10.0),
            view_box: ViewBox::parse("0 0 0 10"),
            ..SizingRequest::default()
        });
        assert!(!sizing.is_valid());
    }

    #[test]
    fn parses_aspect_ratio() {
        assert_eq!(AspectRatio::parse("xMinYMax slice").align, Some((Align::Min, Align::Max)));
        assert!(AspectRatio::parse("xMinYMax slice").slice);
        assert_eq!(AspectRatio::parse("none").align, None);
        assert_eq!(AspectRatio::parse("garbage"), AspectRatio::default());
    }
}
