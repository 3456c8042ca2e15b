use crate::color::{Paint, parse_color};
use crate::length::{Axis, DEFAULT_FONT_SIZE, Length, LengthContext, parse_fraction};
use crate::properties::{Properties, Property, resolve_font_size};
use crate::types::Color;
use crate::xml::XmlElement;

/// Render context handed down the element tree. Children always get their own copy.
#[derive(Debug, Clone)]
pub(crate) struct State {
    /// Post-cascade values of the element this state belongs to.
    pub specified: Properties,
    pub properties: Properties,
    pub font_size: f64,
    pub root_font_size: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub stroke_width: f64,
    /// Product of `opacity` along the ancestor chain.
    pub opacity: f64,
    pub inside_clip_path: bool,
    pub inside_use: bool,
    pub preserve_space: bool,
}

impl State {
    /// Context above the document root.
    pub fn initial(viewport_width: f64, viewport_height: f64) -> State {
        State {
            specified: Properties::default(),
            properties: Properties::initial(),
            font_size: DEFAULT_FONT_SIZE,
            root_font_size: DEFAULT_FONT_SIZE,
            viewport_width,
            viewport_height,
            stroke_width: 1.0,
            opacity: 1.0,
            inside_clip_path: false,
            inside_use: false,
            preserve_space: false,
        }
    }

    pub fn descend(&self, element: &XmlElement) -> State {
        let specified = Properties::specified(element);
        let properties = Properties::compute(&specified, &self.properties);
        let font_size = resolve_font_size(
            properties.value(Property::FontSize),
            self.font_size,
            self.root_font_size,
            &self.length_context(),
        );
        let preserve_space = match element.attribute("xml:space") {
            Some("preserve") => true,
            Some("default") => false,
            _ => self.preserve_space,
        };
        let mut state = State {
            specified,
            properties,
            font_size,
            preserve_space,
            ..self.clone()
        };
        state.stroke_width = Length::parse(state.properties.value(Property::StrokeWidth))
            .map(|l| l.resolve(&state.length_context(), Axis::Diagonal))
            .unwrap_or(1.0)
            .max(0.0);
        state.opacity = self.opacity * state.number(Property::Opacity);
        state
    }

    pub fn with_viewport(mut self, width: f64, height: f64) -> State {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    pub fn length_context(&self) -> LengthContext {
        LengthContext {
            font_size: self.font_size,
            root_font_size: self.root_font_size,
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
        }
    }

    /// Attribute `name` of `element` as a user-space length.
    pub fn length(&self, element: &XmlElement, name: &str, axis: Axis) -> Option<f64> {
        Length::parse(element.attribute(name)?).map(|l| l.resolve(&self.length_context(), axis))
    }

    pub fn length_or(&self, element: &XmlElement, name: &str, axis: Axis, default: f64) -> f64 {
        self.length(element, name, axis).unwrap_or(default)
    }

    pub fn value(&self, property: Property) -> &str {
        self.properties.value(property)
    }

    /// Whether `property` was given on this element rather than inherited.
    pub fn is_specified(&self, property: Property) -> bool {
        self.specified
            .get(property)
            .is_some_and(|value| value != "inherit")
    }

    /// Numeric property clamped to `0..=1`.
    pub fn number(&self, property: Property) -> f64 {
        parse_fraction(self.value(property))
            .unwrap_or(1.0)
            .clamp(0.0, 1.0)
    }

    pub fn paint(&self, property: Property) -> Option<Paint> {
        Paint::parse(self.value(property))
    }

    /// The computed `color` property, target of `currentColor`.
    pub fn current_color(&self) -> (Color, f64) {
        parse_color(self.value(Property::Color)).unwrap_or((Color::BLACK, 1.0))
    }

    /// Color-valued property with `currentColor` resolved.
    pub fn color(&self, property: Property) -> Option<(Color, f64)> {
        let value = self.value(property);
        if value.eq_ignore_ascii_case("currentcolor") {
            return Some(self.current_color());
        }
        parse_color(value)
    }

    pub fn is_displayed(&self) -> bool {
        self.value(Property::Display) != "none"
    }

    pub fn is_visible(&self) -> bool {
        self.value(Property::Visibility) == "visible"
    }

    /// Specified `overflow` is `visible` or `auto`. Viewport elements clip otherwise.
    pub fn overflows(&self) -> bool {
        matches!(self.specified.get(Property::Overflow), Some("visible" | "auto"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descend_resolves_font_size_and_stroke_width() {
        let root = State::initial(200.0, 100.0);
        let group = XmlElement::new("g")
            .with_attribute("font-size", "20")
            .with_attribute("stroke-width", "0.5em")
            .with_attribute("opacity", "0.5");
        let state = root.descend(&group);
        assert_eq!(state.font_size, 20.0);
        assert_eq!(state.stroke_width, 10.0);
        assert_eq!(state.opacity, 0.5);

        let child = XmlElement::new("rect").with_attribute("font-size", "150%");
        let nested = state.descend(&child);
        assert_eq!(nested.font_size, 30.0);
        // Inherited as written, re-resolved against the new font size.
        assert_eq!(nested.stroke_width, 15.0);
        assert!(!nested.is_specified(Property::StrokeWidth));
        assert!(state.is_specified(Property::StrokeWidth));
    }

    #[test]
    fn current_color_and_overflow() {
        let el = XmlElement::new("svg")
            .with_attribute("color", "blue")
            .with_attribute("fill", "currentColor")
            .with_attribute("overflow", "auto");
        let state = State::initial(10.0, 10.0).descend(&el);
        assert_eq!(state.color(Property::Fill), Some((Color::rgb(0, 0, 255), 1.0)));
        assert!(state.overflows());
        assert!(!state.descend(&XmlElement::new("svg")).overflows());
    }

    #[test]
    fn xml_space_is_inherited() {
        let text = XmlElement::new("text").with_attribute("xml:space", "preserve");
        let state = State::initial(1.0, 1.0).descend(&text);
        assert!(state.preserve_space);
        assert!(state.descend(&XmlElement::new("tspan")).preserve_space);
    }
}
