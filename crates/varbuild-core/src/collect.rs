//! Result collection
//!
//! Reads the output a variant was expected to leave behind and compares it
//! to the planned expectation.

use crate::error::CollectError;
use crate::executor::RunResult;
use crate::report::Outcome;
use crate::types::{OutputLocator, Variant, VariantId};

/// Verify one run's output
///
/// Trailing whitespace is ignored on both sides. Values that both parse as
/// integers are compared exactly; other numbers are compared as floats, so
/// `7` matches `7.0`.
///
/// # Errors
/// - `CollectError::MissingOutput` if the file is absent or unreadable
/// - `CollectError::ParseFailure` if it is not UTF-8
/// - `CollectError::Mismatch` if the content differs
pub async fn verify(
    id: VariantId,
    locator: &OutputLocator,
    expected: &str,
    run: &RunResult,
) -> Result<(), CollectError> {
    let actual = match locator.resolve(id, &run.work_dir) {
        Some(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| CollectError::MissingOutput(format!("{}: {e}", path.display())))?;
            String::from_utf8(bytes)
                .map_err(|e| CollectError::ParseFailure(format!("{}: {e}", path.display())))?
        }
        None => run.stdout.clone(),
    };

    if matches_expected(&actual, expected) {
        Ok(())
    } else {
        Err(CollectError::Mismatch {
            expected: expected.trim_end().to_string(),
            actual: actual.trim_end().to_string(),
        })
    }
}

/// Integers compare exactly; `f64` is used only when a side is non-integral
#[allow(clippy::float_cmp)]
fn matches_expected(actual: &str, expected: &str) -> bool {
    let (actual, expected) = (actual.trim_end(), expected.trim_end());
    if actual == expected {
        return true;
    }
    let (actual, expected) = (actual.trim(), expected.trim());
    if let (Ok(a), Ok(b)) = (actual.parse::<i128>(), expected.parse::<i128>()) {
        return a == b;
    }
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Turns run results into outcomes
#[derive(Debug, Clone, Copy, Default)]
pub struct Collector;

impl Collector {
    /// Outcome of a variant whose run succeeded
    pub async fn collect(&self, variant: &Variant, run: &RunResult) -> Outcome {
        let Some(expectation) = &variant.expectation else {
            return Outcome::Pass;
        };
        match verify(variant.id, &expectation.locator, &expectation.value, run).await {
            Ok(()) => Outcome::Pass,
            Err(e) => {
                tracing::info!(variant_id = %variant.id, error = %e, "output mismatch");
                Outcome::Mismatch {
                    detail: e.to_string(),
                }
            }
        }
    }
}
