//! varbuild template renderer
//!
//! Substitutes placeholder tokens in a source template:
//!
//! - `{{NAME}}` must be bound, rendering fails otherwise
//! - `{{default NAME literal}}` falls back to `literal`, copied verbatim with any
//!   quotes, when `NAME` is unbound
//!
//! Values are inserted as source text without any type checking; a value that
//! does not fit its usage surfaces later as a build failure.
//!
//! # Example
//!
//! ```rust
//! use varbuild_template::{render, Bindings};
//!
//! let mut bindings = Bindings::new();
//! bindings.insert("N".to_string(), "10".to_string());
//!
//! let out = render("print<{{default N 42}}>();", &bindings).unwrap();
//! assert_eq!(out, "print<10>();");
//!
//! let out = render("print<{{default N 42}}>();", &Bindings::new()).unwrap();
//! assert_eq!(out, "print<42>();");
//! ```

pub mod error;
pub mod token;

pub use error::RenderError;
pub use token::{Placeholder, Template, DEFAULT_KEYWORD};

use std::collections::BTreeMap;

/// Placeholder name to literal substitution value
pub type Bindings = BTreeMap<String, String>;

/// Render template text with the given bindings
///
/// # Errors
/// Any [`RenderError`] raised while parsing or resolving tokens
pub fn render(template: &str, bindings: &Bindings) -> Result<String, RenderError> {
    Template::parse(template)?.render(bindings)
}
