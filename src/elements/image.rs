use super::Content;
use super::base::Geometry;
use super::clip::clip_call;
use crate::call::{Arg, Call, Op};
use crate::document::Document;
use crate::error::{ElementResult, SkipElement};
use crate::image_loader::ImageData;
use crate::length::Axis;
use crate::matrix::Matrix;
use crate::sizing::{AspectRatio, Sizing, SizingRequest, ViewBox};
use crate::state::State;
use crate::types::{Point, Rect};
use crate::xml::XmlElement;

pub(super) fn build_image(
    doc: &mut Document<'_>,
    element: &XmlElement,
    state: &State,
) -> ElementResult<Content> {
    let x = state.length_or(element, "x", Axis::X, 0.0);
    let y = state.length_or(element, "y", Axis::Y, 0.0);
    let (Some(width), Some(height)) = (
        state.length(element, "width", Axis::X),
        state.length(element, "height", Axis::Y),
    ) else {
        return Err(SkipElement::warn("<image> requires width and height"));
    };
    if width == 0.0 || height == 0.0 {
        return Err(SkipElement::Quiet);
    }
    if width < 0.0 || height < 0.0 {
        return Err(SkipElement::warn("<image> has a negative size"));
    }
    let frame = Rect::new(x, y, width, height);
    let mut content = Content {
        calls: Vec::new(),
        bbox: Some(frame),
    };
    if !state.is_visible() {
        return Ok(content);
    }

    let href = element
        .href()
        .ok_or_else(|| SkipElement::warn("<image> has no href"))?;
    let image = doc
        .options
        .image_loader
        .load(href)
        .and_then(ImageData::probe)
        .map_err(|err| SkipElement::warn(format!("<image>: {err}")))?;
    let (natural_width, natural_height) = (f64::from(image.width), f64::from(image.height));
    if natural_width <= 0.0 || natural_height <= 0.0 {
        return Err(SkipElement::warn("<image> has no pixels"));
    }

    let sizing = Sizing::compute(&SizingRequest {
        container_width: width,
        container_height: height,
        width: Some(width),
        height: Some(height),
        view_box: Some(ViewBox {
            x: 0.0,
            y: 0.0,
            width: natural_width,
            height: natural_height,
        }),
        aspect: element
            .attribute("preserveAspectRatio")
            .map(AspectRatio::parse)
            .unwrap_or_default(),
        ..SizingRequest::default()
    });
    if !sizing.is_valid() {
        return Err(SkipElement::Quiet);
    }
    let index = doc.images.len();
    doc.images.push(image);

    let placement = Matrix::translate(x, y).multiply(sizing.transform);
    let lower_left = Point::new(0.0, doc.canvas_height - natural_height);
    let leaf = Call::new(Op::Image)
        .arg(Arg::Point(lower_left))
        .arg(Arg::Number(natural_width))
        .arg(Arg::Number(natural_height))
        .kwarg("image", Arg::Integer(index as i64));
    let mut scope = Call::new(Op::TransformationMatrix)
        .arg(Arg::Matrix(placement.to_canvas_space(doc.canvas_height)));
    scope.children.push(leaf);

    if sizing.needs_clip {
        let mut clip = clip_call(&Geometry::Rect(frame), None, doc.canvas_height);
        clip.children.push(scope);
        content.calls.push(clip);
    } else {
        content.calls.push(scope);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use crate::xml::parse_document;
    use base64::Engine;
    use image::ImageEncoder;
    use image::codecs::png::PngEncoder;

    fn data_uri(width: u32, height: u32) -> String {
        let mut out = Vec::new();
        let pixels = vec![0u8; (width * height * 4) as usize];
        PngEncoder::new(&mut out)
            .write_image(&pixels, width, height, image::ExtendedColorType::Rgba8)
            .expect("encode png");
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(out)
        )
    }

    fn build(element: XmlElement) -> (ElementResult<Content>, usize) {
        let root = parse_document(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).expect("parse");
        let options = Options::new();
        let mut doc = Document::new(&root, &options, None);
        doc.canvas_height = 100.0;
        let state = State::initial(100.0, 100.0).descend(&element);
        let result = build_image(&mut doc, &element, &state);
        (result, doc.images.len())
    }

    #[test]
    fn image_is_fitted_into_its_box() {
        let uri = data_uri(4, 2);
        let element = XmlElement::new("image")
            .with_attribute("href", &uri)
            .with_attribute("width", "8")
            .with_attribute("height", "8");
        let (result, images) = build(element);
        let content = result.expect("content");
        assert_eq!(images, 1);
        let scope = &content.calls[0];
        assert_eq!(scope.op, Op::TransformationMatrix);
        let matrix = scope.args[0].as_matrix().expect("matrix");
        assert_eq!(matrix.a, 2.0);
        assert_eq!(scope.children[0].get("image").and_then(Arg::as_number), Some(0.0));
    }

    #[test]
    fn slice_clips_to_frame() {
        let uri = data_uri(4, 2);
        let element = XmlElement::new("image")
            .with_attribute("href", &uri)
            .with_attribute("width", "8")
            .with_attribute("height", "8")
            .with_attribute("preserveAspectRatio", "xMidYMid slice");
        let (result, _) = build(element);
        assert_eq!(result.expect("content").calls[0].op, Op::Clip);
    }

    #[test]
    fn missing_size_and_bad_data() {
        let (result, _) = build(XmlElement::new("image").with_attribute("href", "data:,x"));
        assert!(matches!(result, Err(SkipElement::Warned(_))));
        let (result, images) = build(
            XmlElement::new("image")
                .with_attribute("href", "data:,x")
                .with_attribute("width", "1")
                .with_attribute("height", "1"),
        );
        assert!(matches!(result, Err(SkipElement::Warned(_))));
        assert_eq!(images, 0);
        let (result, _) = build(
            XmlElement::new("image")
                .with_attribute("width", "0")
                .with_attribute("height", "1"),
        );
        assert_eq!(result.err(), Some(SkipElement::Quiet));
    }
}
