//! Error types for template parsing and rendering

/// Errors raised while parsing or rendering a template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// A bare `{{NAME}}` token has no binding
    #[error("unbound placeholder: {0}")]
    UnboundPlaceholder(String),

    /// A `{{default NAME}}` token is missing its literal
    #[error("default token for {0} has no literal value")]
    MissingDefault(String),

    /// A token of the form `{{NAME extra}}` that is neither bare nor `default`
    #[error("unsupported token: {0}")]
    UnsupportedToken(String),
}

impl RenderError {
    /// Name of the placeholder involved, when the error is tied to one
    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        match self {
            Self::UnboundPlaceholder(name) | Self::MissingDefault(name) => Some(name),
            Self::UnsupportedToken(_) => None,
        }
    }

    /// Whether the error comes from the template text itself rather than
    /// from the bindings supplied for one variant
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::UnboundPlaceholder(_))
    }
}
