use crate::color::{Paint, parse_color, parse_url_ref};
use crate::css::{Declaration, parse_style_attribute};
use crate::length::{Axis, Length, LengthContext, Unit, parse_fraction};
use crate::xml::XmlElement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grammar {
    Paint,
    Color,
    Number,
    Length,
    FontSize,
    FontWeight,
    LengthOrNormal,
    DashArray,
    UrlOrNone,
    Keywords(&'static [&'static str]),
    Any,
}

macro_rules! properties {
    ($($variant:ident => $name:literal, $default:literal, $inherited:literal, $grammar:expr;)*) => {
        /// Styling properties understood by the cascade.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Property {
            $($variant,)*
        }

        const TABLE: &[(Property, &str, &str, bool, Grammar)] = &[
            $((Property::$variant, $name, $default, $inherited, $grammar),)*
        ];
    };
}

properties! {
    ClipPath => "clip-path", "none", false, Grammar::UrlOrNone;
    ClipRule => "clip-rule", "nonzero", true, Grammar::Keywords(&["nonzero", "evenodd"]);
    Color => "color", "black", true, Grammar::Color;
    Display => "display", "inline", false, Grammar::Keywords(&[
        "inline", "block", "none", "inline-block", "list-item", "run-in", "compact",
        "marker", "table", "inline-table", "table-row-group", "table-header-group",
        "table-footer-group", "table-row", "table-column-group", "table-column",
        "table-cell", "table-caption", "flex", "inline-flex", "grid", "inline-grid",
        "contents",
    ]);
    Fill => "fill", "black", true, Grammar::Paint;
    FillOpacity => "fill-opacity", "1", true, Grammar::Number;
    FillRule => "fill-rule", "nonzero", true, Grammar::Keywords(&["nonzero", "evenodd"]);
    FontFamily => "font-family", "serif", true, Grammar::Any;
    FontSize => "font-size", "medium", true, Grammar::FontSize;
    FontStyle => "font-style", "normal", true, Grammar::Keywords(&["normal", "italic", "oblique"]);
    FontVariant => "font-variant", "normal", true, Grammar::Keywords(&["normal", "small-caps"]);
    FontWeight => "font-weight", "normal", true, Grammar::FontWeight;
    LetterSpacing => "letter-spacing", "normal", true, Grammar::LengthOrNormal;
    MarkerStart => "marker-start", "none", true, Grammar::UrlOrNone;
    MarkerMid => "marker-mid", "none", true, Grammar::UrlOrNone;
    MarkerEnd => "marker-end", "none", true, Grammar::UrlOrNone;
    Mask => "mask", "none", false, Grammar::UrlOrNone;
    Opacity => "opacity", "1", false, Grammar::Number;
    Overflow => "overflow", "visible", false, Grammar::Keywords(&["visible", "hidden", "scroll", "auto"]);
    StopColor => "stop-color", "black", false, Grammar::Color;
    StopOpacity => "stop-opacity", "1", false, Grammar::Number;
    Stroke => "stroke", "none", true, Grammar::Paint;
    StrokeDasharray => "stroke-dasharray", "none", true, Grammar::DashArray;
    StrokeDashoffset => "stroke-dashoffset", "0", true, Grammar::Length;
    StrokeLinecap => "stroke-linecap", "butt", true, Grammar::Keywords(&["butt", "round", "square"]);
    StrokeLinejoin => "stroke-linejoin", "miter", true, Grammar::Keywords(&["miter", "miter-clip", "round", "bevel", "arcs"]);
    StrokeMiterlimit => "stroke-miterlimit", "4", true, Grammar::Number;
    StrokeOpacity => "stroke-opacity", "1", true, Grammar::Number;
    StrokeWidth => "stroke-width", "1", true, Grammar::Length;
    TextAnchor => "text-anchor", "start", true, Grammar::Keywords(&["start", "middle", "end"]);
    TextDecoration => "text-decoration", "none", false, Grammar::Any;
    Visibility => "visibility", "visible", true, Grammar::Keywords(&["visible", "hidden", "collapse"]);
}

const COUNT: usize = TABLE.len();

const FONT_LONGHANDS: [Property; 5] = [
    Property::FontStyle,
    Property::FontVariant,
    Property::FontWeight,
    Property::FontSize,
    Property::FontFamily,
];

impl Property {
    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        TABLE[self.index()].1
    }

    pub fn default_value(self) -> &'static str {
        TABLE[self.index()].2
    }

    pub fn inherited(self) -> bool {
        TABLE[self.index()].3
    }

    pub fn from_name(name: &str) -> Option<Property> {
        TABLE
            .iter()
            .find(|(_, candidate, ..)| *candidate == name)
            .map(|(property, ..)| *property)
    }

    fn grammar(self) -> Grammar {
        TABLE[self.index()].4
    }

    /// Whether `value` is acceptable for this property. `inherit` is always accepted.
    pub fn accepts(self, value: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        if value == "inherit" {
            return true;
        }
        match self.grammar() {
            Grammar::Paint => Paint::parse(value).is_some(),
            Grammar::Color => value.eq_ignore_ascii_case("currentcolor") || parse_color(value).is_some(),
            Grammar::Number => parse_fraction(value).is_some(),
            Grammar::Length => Length::parse(value).is_some(),
            Grammar::FontSize => is_font_size(value),
            Grammar::FontWeight => is_font_weight(value),
            Grammar::LengthOrNormal => value == "normal" || Length::parse(value).is_some(),
            Grammar::DashArray => {
                value == "none"
                    || value
                        .split(|c: char| c == ',' || c.is_whitespace())
                        .filter(|s| !s.is_empty())
                        .all(|s| Length::parse(s).is_some_and(|l| l.value >= 0.0))
            }
            Grammar::UrlOrNone => value == "none" || parse_url_ref(value).is_some(),
            Grammar::Keywords(words) => words.contains(&value),
            Grammar::Any => true,
        }
    }
}

/// One value slot per property plus its priority.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    values: [Option<String>; COUNT],
    important: [bool; COUNT],
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|_| None),
            important: [false; COUNT],
        }
    }
}

impl Properties {
    /// Computed set for the document root's parent: every property at its default.
    pub fn initial() -> Properties {
        let mut out = Properties::default();
        for (property, _, default, _, _) in TABLE {
            out.values[property.index()] = Some(default.to_string());
        }
        out
    }

    pub fn get(&self, property: Property) -> Option<&str> {
        self.values[property.index()].as_deref()
    }

    /// Computed value; falls back to the default for sets that were never computed.
    pub fn value(&self, property: Property) -> &str {
        self.get(property).unwrap_or(property.default_value())
    }

    pub fn is_important(&self, property: Property) -> bool {
        self.important[property.index()]
    }

    pub fn is_set(&self, property: Property) -> bool {
        self.values[property.index()].is_some()
    }

    /// Applies one declaration. Returns `false` if it was rejected.
    ///
    /// Unknown names and invalid values leave the prior value in place. A normal declaration
    /// never replaces an important one.
    pub fn set(&mut self, name: &str, value: &str, important: bool) -> bool {
        if name == "font" {
            return self.set_font_shorthand(value, important);
        }
        if name == "marker" {
            let mut applied = false;
            for property in [Property::MarkerStart, Property::MarkerMid, Property::MarkerEnd] {
                applied |= self.set_property(property, value, important);
            }
            return applied;
        }
        match Property::from_name(name) {
            Some(property) => self.set_property(property, value, important),
            None => false,
        }
    }

    fn set_property(&mut self, property: Property, value: &str, important: bool) -> bool {
        let index = property.index();
        if self.important[index] && !important {
            return false;
        }
        if !property.accepts(value) {
            return false;
        }
        self.values[index] = Some(value.trim().to_string());
        self.important[index] = important;
        true
    }

    fn set_font_shorthand(&mut self, value: &str, important: bool) -> bool {
        let Some(longhands) = expand_font_shorthand(value) else {
            return false;
        };
        if FONT_LONGHANDS
            .iter()
            .any(|p| self.important[p.index()] && !important)
        {
            return false;
        }
        for (property, longhand) in FONT_LONGHANDS.iter().zip(longhands) {
            self.values[property.index()] = Some(longhand);
            self.important[property.index()] = important;
        }
        true
    }

    /// Specified values for one element.
    ///
    /// Precedence, lowest first: stylesheet rules, presentation attributes, inline `style`,
    /// important stylesheet rules, important inline declarations.
    pub fn specified(element: &XmlElement) -> Properties {
        let mut out = Properties::default();
        let inline = element
            .attribute("style")
            .map(parse_style_attribute)
            .unwrap_or_default();

        apply(&mut out, element.styles.iter().filter(|d| !d.important));
        for (name, value) in element.attributes() {
            if name == "font" || name == "marker" {
                continue;
            }
            if Property::from_name(name).is_some() {
                out.set(name, value, false);
            }
        }
        apply(&mut out, inline.iter().filter(|d| !d.important));
        apply(&mut out, element.styles.iter().filter(|d| d.important));
        apply(&mut out, inline.iter().filter(|d| d.important));
        out
    }

    /// Resolves inheritance against the parent's computed set.
    pub fn compute(specified: &Properties, parent: &Properties) -> Properties {
        let mut out = Properties::default();
        for (property, _, default, inherited, _) in TABLE {
            let index = property.index();
            let value = match specified.values[index].as_deref() {
                Some("inherit") => parent.value(*property).to_string(),
                Some(value) => value.to_string(),
                None if *inherited => parent.value(*property).to_string(),
                None => default.to_string(),
            };
            out.values[index] = Some(value);
            out.important[index] = specified.important[index];
        }
        out
    }
}

fn apply<'a>(out: &mut Properties, declarations: impl Iterator<Item = &'a Declaration>) {
    for declaration in declarations {
        out.set(&declaration.name, &declaration.value, declaration.important);
    }
}

fn is_font_size(value: &str) -> bool {
    FONT_SIZE_KEYWORDS.iter().any(|(k, _)| *k == value)
        || value == "smaller"
        || value == "larger"
        || Length::parse(value).is_some_and(|l| l.value >= 0.0)
}

fn is_font_weight(value: &str) -> bool {
    matches!(value, "normal" | "bold" | "bolder" | "lighter")
        || value
            .parse::<u16>()
            .is_ok_and(|w| (1..=1000).contains(&w))
}

const FONT_SIZE_KEYWORDS: [(&str, f64); 7] = [
    ("xx-small", 9.0),
    ("x-small", 10.0),
    ("small", 13.0),
    ("medium", 16.0),
    ("large", 18.0),
    ("x-large", 24.0),
    ("xx-large", 32.0),
];

/// `[style] [variant] [weight] size[/line-height] family`.
///
/// Returns the five longhands in `FONT_LONGHANDS` order, or `None` if any part is not
/// recognized, in which case the whole shorthand is ignored.
fn expand_font_shorthand(value: &str) -> Option<[String; 5]> {
    let mut style = "normal";
    let mut variant = "normal";
    let mut weight = "normal";
    let mut rest = value.trim();

    loop {
        let (token, tail) = match rest.split_once(char::is_whitespace) {
            Some((token, tail)) => (token, tail.trim_start()),
            None => (rest, ""),
        };
        if token.is_empty() {
            return None;
        }
        match token {
            "normal" => {}
            "italic" | "oblique" => style = token,
            "small-caps" => variant = token,
            t if is_font_weight(t) => weight = t,
            _ => {
                let size = token.split_once('/').map_or(token, |(size, _)| size);
                if !is_font_size(size) {
                    return None;
                }
                // Line height may be spaced out ("12px / 14px").
                let family = match tail.strip_prefix('/') {
                    Some(line_height) => line_height
                        .trim_start()
                        .split_once(char::is_whitespace)
                        .map_or("", |(_, family)| family),
                    None => tail,
                }
                .trim();
                if family.is_empty() {
                    return None;
                }
                return Some([
                    style.to_string(),
                    variant.to_string(),
                    weight.to_string(),
                    size.to_string(),
                    family.to_string(),
                ]);
            }
        }
        rest = tail;
    }
}

/// Numeric font size for an element whose computed `font-size` is `value`.
pub fn resolve_font_size(value: &str, parent_size: f64, root_size: f64, viewport: &LengthContext) -> f64 {
    if let Some((_, size)) = FONT_SIZE_KEYWORDS.iter().find(|(k, _)| *k == value) {
        return *size;
    }
    match value {
        "smaller" => return parent_size / 1.2,
        "larger" => return parent_size * 1.2,
        _ => {}
    }
    let Some(length) = Length::parse(value) else {
        return parent_size;
    };
    let ctx = LengthContext {
        font_size: parent_size,
        root_font_size: root_size,
        ..*viewport
    };
    match length.unit {
        Unit::Percent => length.value / 100.0 * parent_size,
        _ => length.resolve(&ctx, Axis::Diagonal),
    }
}

/// `stroke-dasharray` as numbers; odd-length lists are repeated, all-zero lists disable
/// dashing.
pub fn resolve_dash_array(value: &str, ctx: &LengthContext) -> Option<Vec<f64>> {
    if value == "none" {
        return None;
    }
    let mut out: Vec<f64> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .filter_map(Length::parse)
        .map(|l| l.resolve(ctx, Axis::Diagonal))
        .collect();
    if out.is_empty() || out.iter().all(|v| *v <= 0.0) {
        return None;
    }
    if out.len() % 2 == 1 {
        out.extend_from_within(..);
    }
    Some(out)
}
