use crate::error::SvgError;
use crate::types::Pt;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font: String,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, f64>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<f64> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: f64) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            if let Some(old) = self.order.pop_front() {
                self.map.remove(&old);
            } else {
                break;
            }
        }
    }
}

/// CSS weight classes, in the order the fallback chains walk them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FontWeight {
    Light,
    Normal,
    Semibold,
    Bold,
    Extrabold,
    Black,
}

impl FontWeight {
    pub fn parse(value: &str) -> FontWeight {
        match value.trim() {
            "bold" | "bolder" => FontWeight::Bold,
            "lighter" => FontWeight::Light,
            "normal" => FontWeight::Normal,
            other => other
                .parse::<u16>()
                .map(FontWeight::from_number)
                .unwrap_or(FontWeight::Normal),
        }
    }

    pub fn from_number(weight: u16) -> FontWeight {
        match weight {
            0..=349 => FontWeight::Light,
            350..=549 => FontWeight::Normal,
            550..=649 => FontWeight::Semibold,
            650..=749 => FontWeight::Bold,
            750..=849 => FontWeight::Extrabold,
            _ => FontWeight::Black,
        }
    }

    /// This weight followed by the weights to try when it is not available.
    pub fn fallback_chain(self) -> &'static [FontWeight] {
        use FontWeight::*;
        match self {
            Light => &[Light, Normal],
            Normal => &[Normal],
            Semibold => &[Semibold, Bold, Normal],
            Bold => &[Bold, Normal],
            Extrabold => &[Extrabold, Bold, Normal],
            Black => &[Black, Extrabold, Bold, Normal],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRequest {
    /// `font-family` list in priority order, quotes removed.
    pub families: Vec<String>,
    pub weight: FontWeight,
    pub italic: bool,
}

impl FontRequest {
    pub fn new(family_list: &str, weight: &str, style: &str) -> Self {
        Self {
            families: family_list
                .split(',')
                .map(|f| f.trim().trim_matches('"').trim_matches('\'').to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            weight: FontWeight::parse(weight),
            italic: matches!(style.trim(), "italic" | "oblique"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandardFamily {
    Helvetica,
    Times,
    Courier,
}

impl StandardFamily {
    fn from_family(name: &str) -> Option<StandardFamily> {
        match normalize_name(name).as_str() {
            "helvetica" | "arial" | "sans-serif" | "system-ui" => Some(StandardFamily::Helvetica),
            "times" | "times-roman" | "times new roman" | "serif" => Some(StandardFamily::Times),
            "courier" | "courier new" | "monospace" => Some(StandardFamily::Courier),
            _ => None,
        }
    }

    fn font_name(self, bold: bool, italic: bool) -> &'static str {
        match (self, bold, italic) {
            (StandardFamily::Helvetica, false, false) => "Helvetica",
            (StandardFamily::Helvetica, true, false) => "Helvetica-Bold",
            (StandardFamily::Helvetica, false, true) => "Helvetica-Oblique",
            (StandardFamily::Helvetica, true, true) => "Helvetica-BoldOblique",
            (StandardFamily::Times, false, false) => "Times-Roman",
            (StandardFamily::Times, true, false) => "Times-Bold",
            (StandardFamily::Times, false, true) => "Times-Italic",
            (StandardFamily::Times, true, true) => "Times-BoldItalic",
            (StandardFamily::Courier, false, false) => "Courier",
            (StandardFamily::Courier, true, false) => "Courier-Bold",
            (StandardFamily::Courier, false, true) => "Courier-Oblique",
            (StandardFamily::Courier, true, true) => "Courier-BoldOblique",
        }
    }

    fn from_font_name(name: &str) -> Option<StandardFamily> {
        let lower = normalize_name(name);
        if lower.starts_with("helvetica") {
            Some(StandardFamily::Helvetica)
        } else if lower.starts_with("times") {
            Some(StandardFamily::Times)
        } else if lower.starts_with("courier") {
            Some(StandardFamily::Courier)
        } else {
            None
        }
    }

    // Average advance per character in em units; the standard fonts ship without metrics here.
    fn average_advance(self) -> f64 {
        match self {
            StandardFamily::Helvetica => 0.556,
            StandardFamily::Times => 0.5,
            StandardFamily::Courier => 0.6,
        }
    }
}

#[derive(Debug)]
struct RegisteredFont {
    name: String,
    family: String,
    weight: FontWeight,
    italic: bool,
    data: Arc<Vec<u8>>,
    metrics: FontMetrics,
}

#[derive(Debug)]
struct FontMetrics {
    first_char: u8,
    widths: Vec<u16>,
    missing_width: u16,
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let first_char = 32u8;
        let mut widths = Vec::with_capacity(224);
        for code in first_char..=255u8 {
            let width = face
                .glyph_index(code as char)
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(0);
            widths.push(((width as f32 * scale).round() as i32).clamp(0, u16::MAX as i32) as u16);
        }
        let missing_width = widths.first().copied().unwrap_or(0);
        Self {
            first_char,
            widths,
            missing_width,
        }
    }

    fn advance_for_char(&self, ch: char) -> Option<u16> {
        let code = ch as u32;
        let first = self.first_char as u32;
        if code < first {
            return Some(self.missing_width);
        }
        self.widths.get((code - first) as usize).copied()
    }
}

/// Font collaborator: resolves family lists to concrete fonts and measures text.
///
/// Registered TrueType/OpenType fonts are preferred; the three standard PDF families answer
/// for generic names and anything else that matches them.
#[derive(Debug)]
pub struct FontRegistry {
    fonts: RwLock<Vec<RegisteredFont>>,
    text_width_cache: Mutex<TextWidthCache>,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: OnceLock<Arc<FontRegistry>> = OnceLock::new();

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: RwLock::new(Vec::new()),
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    /// Process-wide registry, created empty on first access.
    pub fn global() -> Arc<FontRegistry> {
        GLOBAL.get_or_init(|| Arc::new(FontRegistry::new())).clone()
    }

    /// Registers every `.ttf`/`.otf` file directly inside `path`. Returns how many loaded.
    pub fn register_dir(&self, path: impl AsRef<Path>) -> Result<usize, SvgError> {
        let mut count = 0;
        for entry in fs::read_dir(path.as_ref())?.flatten() {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
                continue;
            };
            if !matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf") {
                continue;
            }
            let data = fs::read(&path)?;
            match self.register_bytes(data, path.file_stem().and_then(|s| s.to_str())) {
                Ok(_) => count += 1,
                Err(err) => tracing::warn!(path = %path.display(), "{err}"),
            }
        }
        Ok(count)
    }

    /// Registers one font program and returns its primary name.
    pub fn register_bytes(&self, data: Vec<u8>, source_name: Option<&str>) -> Result<String, SvgError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| SvgError::Font(format!("invalid font data for {source}: {err}")))?;
        let (name, family) = font_names(&face, source);
        let weight = FontWeight::from_number(face.weight().to_number());
        let italic = face.is_italic() || face.is_oblique();
        let metrics = FontMetrics::from_face(&face);
        drop(face);

        let font = RegisteredFont {
            name: name.clone(),
            family,
            weight,
            italic,
            data: Arc::new(data),
            metrics,
        };
        match self.fonts.write() {
            Ok(mut fonts) => fonts.push(font),
            Err(_) => return Err(SvgError::Font("font registry lock poisoned".to_string())),
        }
        Ok(name)
    }

    /// Resolves a request to a font name, walking families in order and, within a family,
    /// the weight fallback chain (exact style before the other style).
    pub fn resolve(&self, request: &FontRequest) -> Option<String> {
        let fonts = self.fonts.read().ok()?;
        for family in &request.families {
            let key = normalize_name(family);
            let candidates: Vec<&RegisteredFont> = fonts
                .iter()
                .filter(|f| normalize_name(&f.family) == key || normalize_name(&f.name) == key)
                .collect();
            if !candidates.is_empty() {
                for italic in [request.italic, !request.italic] {
                    for weight in request.weight.fallback_chain() {
                        if let Some(font) = candidates
                            .iter()
                            .find(|f| f.weight == *weight && f.italic == italic)
                        {
                            return Some(font.name.clone());
                        }
                    }
                }
                return candidates.first().map(|f| f.name.clone());
            }
            if let Some(standard) = StandardFamily::from_family(family) {
                let bold = request.weight >= FontWeight::Semibold;
                return Some(standard.font_name(bold, request.italic).to_string());
            }
        }
        None
    }

    pub fn is_known(&self, name: &str) -> bool {
        StandardFamily::from_font_name(name).is_some()
            || self
                .fonts
                .read()
                .map(|fonts| fonts.iter().any(|f| f.name == name))
                .unwrap_or(false)
    }

    /// Advance width of `text` at `font_size`, in the same units as the size.
    pub fn measure_text_width(&self, name: &str, font_size: f64, text: &str) -> f64 {
        let key = TextWidthKey {
            font: name.to_string(),
            size_milli: Pt::from_f64(font_size).to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&key) {
                return value;
            }
        }
        let value = self.measure_uncached(name, font_size, text);
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(key, value);
        }
        value
    }

    fn measure_uncached(&self, name: &str, font_size: f64, text: &str) -> f64 {
        if let Ok(fonts) = self.fonts.read() {
            if let Some(font) = fonts.iter().find(|f| f.name == name) {
                return measure_registered(font, font_size, text);
            }
        }
        let average = StandardFamily::from_font_name(name)
            .map(StandardFamily::average_advance)
            .unwrap_or(0.6);
        average * font_size * text.chars().count() as f64
    }
}

fn measure_registered(font: &RegisteredFont, font_size: f64, text: &str) -> f64 {
    let mut total_units: i64 = 0;
    let mut face: Option<ttf_parser::Face<'_>> = None;
    for ch in text.chars() {
        let advance = match font.metrics.advance_for_char(ch) {
            Some(advance) => advance as i64,
            None => {
                // Outside the Latin-1 table: ask the font program directly.
                if face.is_none() {
                    face = ttf_parser::Face::parse(&font.data, 0).ok();
                }
                face.as_ref()
                    .and_then(|face| {
                        let units = face.units_per_em().max(1) as i64;
                        face.glyph_index(ch)
                            .and_then(|id| face.glyph_hor_advance(id))
                            .map(|adv| (adv as i64 * 1000 + units / 2) / units)
                    })
                    .unwrap_or(font.metrics.missing_width as i64)
            }
        };
        total_units = total_units.saturating_add(advance);
    }
    total_units.max(0) as f64 * font_size / 1000.0
}

fn font_names(face: &ttf_parser::Face<'_>, source: &str) -> (String, String) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut typographic_family = None;
    let mut post = None;
    let mut full = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY if typographic_family.is_none() => {
                typographic_family = Some(name)
            }
            name_id::FAMILY if family.is_none() => family = Some(name),
            name_id::FULL_NAME if full.is_none() => full = Some(name),
            name_id::POST_SCRIPT_NAME if post.is_none() => post = Some(name),
            _ => {}
        }
    }

    let family = typographic_family
        .or(family)
        .unwrap_or_else(|| source.to_string());
    let primary = post.or(full).unwrap_or_else(|| family.clone());
    (primary, family)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}
