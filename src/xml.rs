use crate::css::{Declaration, Stylesheet};
use crate::error::SvgError;
use std::sync::Arc;

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub(crate) fn is_svg_namespace(namespace: Option<&str>) -> bool {
    matches!(namespace, None | Some(SVG_NS))
}

/// Owned element node. Stylesheet matches are resolved while converting from the parser tree,
/// so later stages never need the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Matching stylesheet declarations, lowest precedence first.
    pub styles: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(Arc<XmlElement>),
    Text(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            styles: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id").filter(|id| !id.is_empty())
    }

    /// `href`, falling back to `xlink:href`.
    pub fn href(&self) -> Option<&str> {
        self.attribute("href").or_else(|| self.attribute("xlink:href"))
    }

    pub fn element_children(&self) -> impl Iterator<Item = &Arc<XmlElement>> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// All character data below this element, in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(text) => out.push_str(text),
                XmlNode::Element(element) => element.collect_text(out),
            }
        }
    }
}

/// Parses markup into the owned tree, resolving `<style>` rules against every element.
pub fn parse_document(input: &str) -> Result<Arc<XmlElement>, SvgError> {
    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = roxmltree::Document::parse_with_options(input, options)?;
    let root = doc.root_element();
    if root.tag_name().name() != "svg" || !is_svg_namespace(root.tag_name().namespace()) {
        return Err(SvgError::MissingRoot(root.tag_name().name().to_string()));
    }
    let stylesheet = Stylesheet::from_document(&doc);
    Ok(Arc::new(convert(root, &stylesheet)))
}

fn convert(node: roxmltree::Node<'_, '_>, stylesheet: &Stylesheet) -> XmlElement {
    let mut element = XmlElement::new(node.tag_name().name());
    for attr in node.attributes() {
        let name = match attr.namespace() {
            None | Some(SVG_NS) => attr.name().to_string(),
            Some(XLINK_NS) => format!("xlink:{}", attr.name()),
            Some(XML_NS) => format!("xml:{}", attr.name()),
            Some(_) => continue,
        };
        element.attributes.push((name, attr.value().to_string()));
    }
    if !stylesheet.is_empty() {
        element.styles = stylesheet.matching(node);
    }
    for child in node.children() {
        if child.is_element() {
            if is_svg_namespace(child.tag_name().namespace()) {
                element
                    .children
                    .push(XmlNode::Element(Arc::new(convert(child, stylesheet))));
            }
        } else if let Some(text) = child.text().filter(|_| child.is_text()) {
            match element.children.last_mut() {
                Some(XmlNode::Text(existing)) => existing.push_str(text),
                _ => element.children.push(XmlNode::Text(text.to_string())),
            }
        }
    }
    element
}
