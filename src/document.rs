use crate::call::Call;
use crate::debug::DebugLogger;
use crate::gradient::{Gradient, GradientKind, GradientRegistry, Stop};
use crate::image_loader::ImageData;
use crate::length::parse_fraction;
use crate::options::Options;
use crate::properties::Property;
use crate::state::State;
use crate::types::Rect;
use crate::xml::XmlElement;
use std::collections::HashMap;
use std::sync::Arc;

/// Calls an element produced, with its bounding box in the parent's user space.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Built {
    pub calls: Vec<Call>,
    pub bbox: Option<Rect>,
}

/// Mutable build context for one conversion.
pub(crate) struct Document<'o> {
    pub options: &'o Options,
    /// Every element carrying an id, first occurrence wins.
    ids: HashMap<String, Arc<XmlElement>>,
    /// Output of elements already built, keyed by id, for `use`.
    built: HashMap<String, Built>,
    pub gradients: GradientRegistry,
    pub images: Vec<ImageData>,
    pub warnings: Vec<String>,
    /// Root output height; build-phase y coordinates are flipped against it.
    pub canvas_height: f64,
    /// Ids of `use` targets currently being expanded.
    pub use_stack: Vec<String>,
    pub debug: Option<DebugLogger>,
}

impl<'o> Document<'o> {
    pub fn new(root: &Arc<XmlElement>, options: &'o Options, debug: Option<DebugLogger>) -> Self {
        let mut ids = HashMap::new();
        index_ids(root, &mut ids);
        Self {
            options,
            ids,
            built: HashMap::new(),
            gradients: GradientRegistry::default(),
            images: Vec::new(),
            warnings: Vec::new(),
            canvas_height: 0.0,
            use_stack: Vec::new(),
            debug,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "svg2canvas", "{message}");
        if let Some(debug) = &self.debug {
            debug.warning(&message);
        }
        self.warnings.push(message);
    }

    pub fn count(&self, tag: &str) {
        if let Some(debug) = &self.debug {
            debug.increment(tag, 1);
        }
    }

    pub fn element(&self, id: &str) -> Option<Arc<XmlElement>> {
        self.ids.get(id).cloned()
    }

    pub fn built(&self, id: &str) -> Option<&Built> {
        self.built.get(id)
    }

    pub fn store_built(&mut self, id: &str, built: &Built) {
        self.built.insert(id.to_string(), built.clone());
    }

    /// Registers the gradient with `id` if it is not yet known. Returns whether `id` names
    /// a gradient.
    pub fn ensure_gradient(&mut self, id: &str, state: &State) -> bool {
        if self.gradients.contains(id) {
            return true;
        }
        match self.element(id) {
            Some(element) => self.register_gradient(&element, state),
            None => false,
        }
    }

    /// Reads a gradient element and its stops, plus the gradient it inherits from.
    pub fn register_gradient(&mut self, element: &XmlElement, parent: &State) -> bool {
        let kind = match element.name.as_str() {
            "linearGradient" => GradientKind::Linear,
            "radialGradient" => GradientKind::Radial,
            _ => return false,
        };
        let state = parent.descend(element);
        let color_mode = self.options.color_mode;
        let stops = element
            .element_children()
            .filter(|child| child.name == "stop")
            .map(|child| {
                let stop_state = state.descend(child);
                let (color, alpha) = stop_state
                    .color(Property::StopColor)
                    .unwrap_or((crate::types::Color::BLACK, 1.0));
                Stop {
                    offset: child
                        .attribute("offset")
                        .and_then(parse_fraction)
                        .unwrap_or(0.0),
                    color: color_mode.convert(color),
                    opacity: alpha * stop_state.number(Property::StopOpacity),
                }
            })
            .collect();
        let mut warnings = Vec::new();
        let gradient = Gradient::from_element(element, kind, stops, &mut warnings);
        for warning in warnings {
            self.warn(warning);
        }
        let Some(gradient) = gradient else {
            return false;
        };
        let href = gradient.href.clone();
        self.gradients.insert(gradient);
        if let Some(href) = href {
            if !self.gradients.contains(&href) && !self.ensure_gradient(&href, parent) {
                self.warn(format!("gradient references unknown gradient '{href}'"));
            }
        }
        true
    }
}

fn index_ids(element: &Arc<XmlElement>, ids: &mut HashMap<String, Arc<XmlElement>>) {
    if let Some(id) = element.id() {
        ids.entry(id.to_string()).or_insert_with(|| element.clone());
    }
    for child in element.element_children() {
        index_ids(child, ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::length::LengthContext;
    use crate::types::Color;
    use crate::xml::parse_document;

    #[test]
    fn forward_gradient_reference_registers_on_demand() {
        let root = parse_document(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
            <rect fill="url(#b)"/>
            <defs>
              <linearGradient id="a"><stop offset="0" stop-color="red"/><stop offset="1" stop-color="blue" stop-opacity="0.5"/></linearGradient>
              <linearGradient id="b" href="#a" x2="0.5"/>
            </defs></svg>"##,
        )
        .expect("parse");
        let options = Options::new();
        let mut doc = Document::new(&root, &options, None);
        let state = State::initial(100.0, 100.0);
        assert!(doc.ensure_gradient("b", &state));
        assert!(doc.gradients.contains("a"));
        assert!(!doc.ensure_gradient("missing", &state));

        let resolved = doc
            .gradients
            .resolve("b", &LengthContext::default())
            .expect("resolved");
        assert_eq!(resolved.stops.len(), 2);
        assert_eq!(resolved.stops[0].color, Color::rgb(255, 0, 0));
        assert_eq!(resolved.stops[1].opacity, 0.5);
    }

    #[test]
    fn warnings_are_collected() {
        let root = parse_document(r#"<svg xmlns="http://www.w3.org/2000/svg" id="r"/>"#)
            .expect("parse");
        let options = Options::new();
        let mut doc = Document::new(&root, &options, None);
        doc.warn("first");
        assert_eq!(doc.warnings, vec!["first".to_string()]);
        assert!(doc.element("r").is_some());
    }
}
