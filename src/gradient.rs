use crate::length::{Axis, Length, LengthContext, parse_fraction};
use crate::matrix::Matrix;
use crate::transform::parse_transform;
use crate::types::Color;
use crate::xml::XmlElement;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    Linear,
    Radial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Units {
    #[default]
    ObjectBoundingBox,
    UserSpaceOnUse,
}

impl Units {
    pub fn parse(value: &str) -> Option<Units> {
        match value.trim() {
            "objectBoundingBox" => Some(Units::ObjectBoundingBox),
            "userSpaceOnUse" => Some(Units::UserSpaceOnUse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Spread {
    #[default]
    Pad,
    Reflect,
    Repeat,
}

impl Spread {
    pub fn parse(value: &str) -> Option<Spread> {
        match value.trim() {
            "pad" => Some(Spread::Pad),
            "reflect" => Some(Spread::Reflect),
            "repeat" => Some(Spread::Repeat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stop {
    pub offset: f64,
    pub color: Color,
    pub opacity: f64,
}

const GEOMETRY_ATTRIBUTES: [&str; 10] = ["x1", "y1", "x2", "y2", "cx", "cy", "r", "fx", "fy", "fr"];

/// A gradient definition as written, before `href` inheritance and unit resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub id: String,
    pub kind: GradientKind,
    pub units: Option<Units>,
    pub spread: Option<Spread>,
    pub transform: Option<Matrix>,
    geometry: HashMap<&'static str, String>,
    pub stops: Vec<Stop>,
    pub href: Option<String>,
}

/// Gradient geometry in its own coordinate system (bounding-box fractions or user units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GradientGeometry {
    Linear {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Radial {
        cx: f64,
        cy: f64,
        r: f64,
        fx: f64,
        fy: f64,
        fr: f64,
    },
}

/// Fully inherited gradient, ready for shading construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedGradient {
    pub geometry: GradientGeometry,
    pub units: Units,
    pub spread: Spread,
    pub transform: Matrix,
    /// Normalized: first offset 0, last offset 1, non-decreasing.
    pub stops: Vec<Stop>,
}

impl Gradient {
    /// Reads gradient attributes from `element`. Stops are collected by the caller because
    /// their colors go through the cascade.
    pub fn from_element(
        element: &XmlElement,
        kind: GradientKind,
        stops: Vec<Stop>,
        warnings: &mut Vec<String>,
    ) -> Option<Gradient> {
        let id = element.id()?.to_string();
        let transform = match element.attribute("gradientTransform") {
            Some(value) => match parse_transform(value, warnings) {
                Ok(m) => Some(m),
                Err(err) => {
                    warnings.push(format!("gradient '{id}': {err}"));
                    None
                }
            },
            None => None,
        };
        let geometry = GEOMETRY_ATTRIBUTES
            .iter()
            .filter_map(|name| element.attribute(name).map(|v| (*name, v.trim().to_string())))
            .collect();
        Some(Gradient {
            id,
            kind,
            units: element.attribute("gradientUnits").and_then(Units::parse),
            spread: element.attribute("spreadMethod").and_then(Spread::parse),
            transform,
            geometry,
            stops,
            href: element.href().and_then(crate::color::parse_href),
        })
    }
}

/// Gradients by id. Inheritance through `href` is resolved at lookup time, one level deep.
#[derive(Debug, Clone, Default)]
pub struct GradientRegistry {
    gradients: HashMap<String, Gradient>,
}

impl GradientRegistry {
    pub fn insert(&mut self, gradient: Gradient) {
        self.gradients.insert(gradient.id.clone(), gradient);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.gradients.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Gradient> {
        self.gradients.get(id)
    }

    /// `ctx` supplies the viewport for user-space percentages.
    pub fn resolve(&self, id: &str, ctx: &LengthContext) -> Option<ResolvedGradient> {
        let own = self.gradients.get(id)?;
        let parent = own
            .href
            .as_deref()
            .filter(|href| *href != id)
            .and_then(|href| self.gradients.get(href));

        let units = own
            .units
            .or(parent.and_then(|p| p.units))
            .unwrap_or_default();
        let spread = own
            .spread
            .or(parent.and_then(|p| p.spread))
            .unwrap_or_default();
        let transform = own
            .transform
            .or(parent.and_then(|p| p.transform))
            .unwrap_or_default();
        let stops = if own.stops.is_empty() {
            parent.map(|p| p.stops.clone()).unwrap_or_default()
        } else {
            own.stops.clone()
        };
        // Geometry attributes only inherit between gradients of the same kind.
        let inherited = parent.filter(|p| p.kind == own.kind);
        let attribute = |name: &str| {
            own.geometry
                .get(name)
                .or_else(|| inherited.and_then(|p| p.geometry.get(name)))
                .map(String::as_str)
        };
        let coordinate = |name: &str, default: &str, axis: Axis| {
            let value = attribute(name).unwrap_or(default);
            resolve_coordinate(value, units, ctx, axis)
                .or_else(|| resolve_coordinate(default, units, ctx, axis))
                .unwrap_or(0.0)
        };

        let geometry = match own.kind {
            GradientKind::Linear => GradientGeometry::Linear {
                x1: coordinate("x1", "0%", Axis::X),
                y1: coordinate("y1", "0%", Axis::Y),
                x2: coordinate("x2", "100%", Axis::X),
                y2: coordinate("y2", "0%", Axis::Y),
            },
            GradientKind::Radial => {
                let cx = coordinate("cx", "50%", Axis::X);
                let cy = coordinate("cy", "50%", Axis::Y);
                let fx = match attribute("fx") {
                    Some(v) => resolve_coordinate(v, units, ctx, Axis::X).unwrap_or(cx),
                    None => cx,
                };
                let fy = match attribute("fy") {
                    Some(v) => resolve_coordinate(v, units, ctx, Axis::Y).unwrap_or(cy),
                    None => cy,
                };
                GradientGeometry::Radial {
                    cx,
                    cy,
                    r: coordinate("r", "50%", Axis::Diagonal),
                    fx,
                    fy,
                    fr: coordinate("fr", "0%", Axis::Diagonal),
                }
            }
        };

        Some(ResolvedGradient {
            geometry,
            units,
            spread,
            transform,
            stops: normalize_stops(&stops),
        })
    }
}

fn resolve_coordinate(value: &str, units: Units, ctx: &LengthContext, axis: Axis) -> Option<f64> {
    match units {
        Units::ObjectBoundingBox => parse_fraction(value),
        Units::UserSpaceOnUse => Length::parse(value).map(|l| l.resolve(ctx, axis)),
    }
}

/// Clamps offsets to `0..=1`, forces them non-decreasing and pads both ends with copies of
/// the nearest stop so the list always spans exactly `0..=1`.
pub fn normalize_stops(stops: &[Stop]) -> Vec<Stop> {
    let mut out: Vec<Stop> = Vec::with_capacity(stops.len() + 2);
    let mut previous = 0.0f64;
    for stop in stops {
        let offset = stop.offset.clamp(0.0, 1.0).max(previous);
        previous = offset;
        out.push(Stop {
            offset,
            opacity: stop.opacity.clamp(0.0, 1.0),
            ..*stop
        });
    }
    if let Some(first) = out.first().copied() {
        if first.offset > 0.0 {
            out.insert(0, Stop { offset: 0.0, ..first });
        }
    }
    if let Some(last) = out.last().copied() {
        if last.offset < 1.0 {
            out.push(Stop { offset: 1.0, ..last });
        }
    }
    out
}
