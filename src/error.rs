use thiserror::Error;

/// Failures that abort a whole conversion. Problems local to one element become warnings.
#[derive(Debug, Error)]
pub enum SvgError {
    #[error("malformed markup: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("root element is <{0}>, expected <svg>")]
    MissingRoot(String),
    #[error("root viewport resolves to {width}x{height}")]
    InvalidSizing { width: f64, height: f64 },
    #[error("font error: {0}")]
    Font(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of an element that produced no calls.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SkipElement {
    /// Intentionally contributes nothing (definitions, zero-sized shapes).
    Quiet,
    /// Recoverable problem, reported as a document warning.
    Warned(String),
}

impl SkipElement {
    pub(crate) fn warn(message: impl Into<String>) -> Self {
        SkipElement::Warned(message.into())
    }
}

pub(crate) type ElementResult<T> = Result<T, SkipElement>;
