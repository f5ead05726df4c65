//! Validation shared by the evaluator builders.

use strata_core::{ConfigError, Dim, FieldTag};
use strata_evaluator::FieldBindings;

pub(crate) fn invalid(evaluator: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        evaluator: evaluator.to_string(),
        reason: reason.into(),
    }
}

/// Unwrap a builder setting that has no default.
pub(crate) fn required<T>(value: Option<T>, evaluator: &str, what: &str) -> Result<T, ConfigError> {
    value.ok_or_else(|| invalid(evaluator, format!("{what} is required")))
}

pub(crate) fn finite(evaluator: &str, what: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(evaluator, format!("{what} must be finite, got {value}")))
    }
}

/// Reject a tag whose dimension kinds differ from `kinds`, at build time.
pub(crate) fn shaped(evaluator: &str, tag: &FieldTag, kinds: &[Dim]) -> Result<(), ConfigError> {
    if tag.layout().kinds().eq(kinds.iter().copied()) {
        return Ok(());
    }
    let expected = kinds
        .iter()
        .map(|d| d.label())
        .collect::<Vec<_>>()
        .join(",");
    Err(ConfigError::InconsistentLayout {
        evaluator: evaluator.to_string(),
        field: tag.to_string(),
        expected: format!("<{expected}>"),
        found: tag.layout().to_string(),
    })
}

/// Check that every tag agrees with `reference` on the extent of `dim`.
pub(crate) fn same_extent(
    bindings: &FieldBindings<'_>,
    dim: Dim,
    reference: &FieldTag,
    others: &[&FieldTag],
) -> Result<usize, ConfigError> {
    let n = bindings.extent(reference, dim)?;
    for tag in others {
        bindings.expect_extent(tag, dim, n)?;
    }
    Ok(n)
}
