use crate::font::FontRegistry;
use crate::image_loader::{DataUriLoader, ImageLoader};
use crate::types::{Color, Point};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    #[default]
    Rgb,
    Cmyk,
}

impl ColorMode {
    /// Converts `color` into this mode's output space.
    pub fn convert(self, color: Color) -> Color {
        match self {
            ColorMode::Rgb => color,
            ColorMode::Cmyk => color.to_cmyk(),
        }
    }
}

/// Conversion settings.
///
/// ```ignore
/// let options = Options::new().width(200.0).color_mode(ColorMode::Cmyk);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) origin: Point,
    pub(crate) width: Option<f64>,
    pub(crate) height: Option<f64>,
    pub(crate) bounds: Option<(f64, f64)>,
    pub(crate) color_mode: ColorMode,
    pub(crate) fallback_font_name: Option<String>,
    pub(crate) language: String,
    pub(crate) fonts: Arc<FontRegistry>,
    pub(crate) image_loader: Arc<dyn ImageLoader>,
    pub(crate) debug_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    pub fn new() -> Self {
        Self {
            origin: Point::default(),
            width: None,
            height: None,
            bounds: None,
            color_mode: ColorMode::Rgb,
            fallback_font_name: Some("Times-Roman".to_string()),
            language: "en".to_string(),
            fonts: FontRegistry::global(),
            image_loader: Arc::new(DataUriLoader),
            debug_path: None,
        }
    }

    /// Page-space position of the drawing's lower-left corner.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.origin = Point::new(x, y);
        self
    }

    /// Output width; the drawing is scaled uniformly to match.
    pub fn width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    /// Output height, used when no width is requested.
    pub fn height(mut self, height: f64) -> Self {
        self.height = Some(height);
        self
    }

    /// Container size for percentage dimensions on the root element.
    pub fn bounds(mut self, width: f64, height: f64) -> Self {
        self.bounds = Some((width, height));
        self
    }

    pub fn color_mode(mut self, mode: ColorMode) -> Self {
        self.color_mode = mode;
        self
    }

    // None skips text whose families do not resolve.
    pub fn fallback_font_name(mut self, name: Option<String>) -> Self {
        self.fallback_font_name = name;
        self
    }

    /// Language tag `systemLanguage` tests compare against.
    pub fn language(mut self, tag: impl Into<String>) -> Self {
        self.language = tag.into();
        self
    }

    pub fn font_registry(mut self, fonts: Arc<FontRegistry>) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.image_loader = loader;
        self
    }

    /// Writes JSON-lines diagnostics to `path`.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn fonts(&self) -> &Arc<FontRegistry> {
        &self.fonts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let options = Options::new()
            .at(10.0, 20.0)
            .width(50.0)
            .color_mode(ColorMode::Cmyk)
            .fallback_font_name(None)
            .language("fr-CA");
        assert_eq!(options.origin, Point::new(10.0, 20.0));
        assert_eq!(options.width, Some(50.0));
        assert_eq!(options.height, None);
        assert!(options.fallback_font_name.is_none());
        assert_eq!(options.language, "fr-CA");
        assert_eq!(
            options.color_mode.convert(Color::rgb(0, 0, 0)),
            Color::cmyk(0.0, 0.0, 0.0, 1.0)
        );
    }
}
