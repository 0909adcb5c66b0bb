//! Token scanning
//!
//! A template is split once into literal text and placeholder segments so
//! that rendering many variants does not rescan the source.

use crate::error::RenderError;
use crate::Bindings;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Keyword introducing a token with a fallback literal
pub const DEFAULT_KEYWORD: &str = "default";

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"\{\{\s*(?:(default)\s+)?([A-Za-z_][A-Za-z0-9_]*)(?:\s+([^{}]*?))?\s*\}\}")
            .unwrap_or_else(|e| unreachable!("token pattern is valid: {e}"))
    })
}

/// A single placeholder token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Placeholder name
    pub name: String,
    /// Literal used when the name is unbound (`{{default NAME literal}}`)
    pub default: Option<String>,
}

impl Placeholder {
    /// Whether a binding must be supplied for this token
    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Resolve the token against a set of bindings
    ///
    /// # Errors
    /// `RenderError::UnboundPlaceholder` for a bare token without binding
    pub fn resolve<'a>(&'a self, bindings: &'a Bindings) -> Result<&'a str, RenderError> {
        match (bindings.get(&self.name), &self.default) {
            (Some(value), _) => Ok(value.as_str()),
            (None, Some(literal)) => Ok(literal.as_str()),
            (None, None) => Err(RenderError::UnboundPlaceholder(self.name.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(Range<usize>),
    Token(Placeholder),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text
    ///
    /// Text between `{{` and `}}` that is not a well-formed name is kept
    /// verbatim, so brace initializers in C++ sources survive untouched.
    ///
    /// # Errors
    /// - `RenderError::MissingDefault` for `{{default NAME}}`
    /// - `RenderError::UnsupportedToken` for `{{NAME extra}}`
    pub fn parse(source: impl Into<String>) -> Result<Self, RenderError> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut cursor = 0;

        for caps in token_regex().captures_iter(&source) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let is_default = caps.get(1).is_some();
            let name = caps.get(2).map_or("", |m| m.as_str()).to_string();
            let literal = caps
                .get(3)
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty());

            let default = match (is_default, literal) {
                (true, Some(literal)) => Some(literal.to_string()),
                (true, None) => return Err(RenderError::MissingDefault(name)),
                (false, Some(_)) => {
                    return Err(RenderError::UnsupportedToken(source[whole.clone()].to_string()))
                }
                (false, None) => None,
            };

            if whole.start > cursor {
                segments.push(Segment::Text(cursor..whole.start));
            }
            cursor = whole.end;
            segments.push(Segment::Token(Placeholder { name, default }));
        }

        if cursor < source.len() {
            segments.push(Segment::Text(cursor..source.len()));
        }

        Ok(Self { source, segments })
    }

    /// Template source text
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All placeholder tokens in order of appearance
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Token(p) => Some(p),
            Segment::Text(_) => None,
        })
    }

    /// Names that must be bound for rendering to succeed
    #[must_use]
    pub fn required_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .placeholders()
            .filter(|p| p.is_required())
            .map(|p| p.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Render the template with the given bindings
    ///
    /// # Errors
    /// `RenderError::UnboundPlaceholder` for the first bare token without a binding
    pub fn render(&self, bindings: &Bindings) -> Result<String, RenderError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(range) => out.push_str(&self.source[range.clone()]),
                Segment::Token(placeholder) => out.push_str(placeholder.resolve(bindings)?),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parse_collects_placeholders_in_order() {
        let template = Template::parse("a {{X}} b {{default Y 3}} c {{X}}").unwrap();
        let names: Vec<&str> = template.placeholders().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["X", "Y", "X"]);
        assert_eq!(template.required_names(), vec!["X"]);
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let template = Template::parse("{{ N }} {{  default M  7  }}").unwrap();
        let out = template.render(&bindings(&[("N", "1")])).unwrap();
        assert_eq!(out, "1 7");
    }

    #[test]
    fn literal_keeps_inner_spaces() {
        let template = Template::parse("{{default T unsigned long}} x;").unwrap();
        assert_eq!(template.render(&Bindings::new()).unwrap(), "unsigned long x;");
    }

    #[test]
    fn brace_initializers_are_not_tokens() {
        let src = "int a[2][2] = {{1, 2}, {3, 4}};";
        let template = Template::parse(src).unwrap();
        assert_eq!(template.placeholders().count(), 0);
        assert_eq!(template.render(&Bindings::new()).unwrap(), src);
    }

    #[test]
    fn missing_default_literal_is_rejected() {
        let err = Template::parse("{{default N}}").unwrap_err();
        assert_eq!(err, RenderError::MissingDefault("N".to_string()));
    }

    #[test]
    fn helper_form_is_rejected() {
        let err = Template::parse("{{N 42}}").unwrap_err();
        assert_eq!(err, RenderError::UnsupportedToken("{{N 42}}".to_string()));
    }

    #[test]
    fn bare_default_keyword_is_a_name() {
        let template = Template::parse("{{default}}").unwrap();
        assert_eq!(template.required_names(), vec!["default"]);
    }

    #[test]
    fn triple_braces_keep_outer_brace() {
        let template = Template::parse("{{{N}}}").unwrap();
        assert_eq!(template.render(&bindings(&[("N", "5")])).unwrap(), "{5}");
    }
}
