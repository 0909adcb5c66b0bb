//! Variant identity resolution
//!
//! A variant process learns its identity from the environment or from its
//! first positional argument. The environment wins; values that do not parse
//! fall through to the next source, and the last resort is 0.

use crate::config::DEFAULT_IDENTITY_ENV;

/// Identity used when no source yields a value
pub const DEFAULT_IDENTITY: u64 = 0;

/// Resolve an identity from an environment value and positional arguments
///
/// `args` excludes the program name.
#[must_use]
pub fn resolve_identity<I, S>(env_value: Option<&str>, args: I) -> u64
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    env_value
        .and_then(parse)
        .or_else(|| args.into_iter().next().and_then(|arg| parse(arg.as_ref())))
        .unwrap_or(DEFAULT_IDENTITY)
}

/// Resolve the identity of the current process
#[must_use]
pub fn current_identity() -> u64 {
    let env_value = std::env::var(DEFAULT_IDENTITY_ENV).ok();
    resolve_identity(env_value.as_deref(), std::env::args().skip(1))
}

fn parse(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_takes_precedence() {
        assert_eq!(resolve_identity(Some("3"), ["9"]), 3);
    }

    #[test]
    fn falls_back_to_first_argument() {
        assert_eq!(resolve_identity(None, ["5", "6"]), 5);
    }

    #[test]
    fn unparseable_environment_falls_through() {
        assert_eq!(resolve_identity(Some("abc"), ["4"]), 4);
    }

    #[test]
    fn defaults_to_zero() {
        assert_eq!(resolve_identity(None, Vec::<String>::new()), 0);
        assert_eq!(resolve_identity(Some(""), ["x"]), 0);
    }
}
