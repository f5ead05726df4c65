//! Error types for the Strata evaluation engine.
//!
//! Organized by phase: [`ConfigError`] for construction and setup,
//! [`EvaluatorError`] for a single evaluator's `evaluate` call and
//! [`StepError`] for a whole batch as seen by the field manager.

use crate::scalar::ScalarKind;
use std::error::Error;
use std::fmt;

/// Errors raised while configuring or setting up an evaluator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A declared field lacks a dimension the evaluator needs.
    MissingDimension {
        /// Evaluator being set up.
        evaluator: String,
        /// Offending field (rendered tag).
        field: String,
        /// Name of the missing dimension.
        dim: String,
    },
    /// Two declared fields disagree on a shared extent.
    InconsistentLayout {
        /// Evaluator being set up.
        evaluator: String,
        /// Offending field (rendered tag).
        field: String,
        /// What was expected.
        expected: String,
        /// What was found.
        found: String,
    },
    /// A declared field was not bound by the field manager.
    UnboundField {
        /// Evaluator being set up.
        evaluator: String,
        /// Offending field (rendered tag).
        field: String,
    },
    /// A construction parameter is invalid.
    InvalidParameter {
        /// Evaluator being configured.
        evaluator: String,
        /// Description of the problem.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDimension {
                evaluator,
                field,
                dim,
            } => write!(f, "evaluator '{evaluator}': field {field} has no {dim} dimension"),
            Self::InconsistentLayout {
                evaluator,
                field,
                expected,
                found,
            } => write!(
                f,
                "evaluator '{evaluator}': field {field} expected {expected}, found {found}"
            ),
            Self::UnboundField { evaluator, field } => {
                write!(f, "evaluator '{evaluator}': field {field} is not bound")
            }
            Self::InvalidParameter { evaluator, reason } => {
                write!(f, "evaluator '{evaluator}': invalid parameter: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Errors from a single evaluator's `evaluate` call.
///
/// Wrapped in [`StepError::EvaluatorFailed`] by the field manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvaluatorError {
    /// The evaluator's kernel failed.
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
    /// A non-finite value was produced or consumed.
    NonFinite {
        /// The affected field (rendered tag).
        field: String,
        /// Flat index of the first offending entry, if known.
        index: Option<usize>,
    },
    /// A required state array is absent from the workset's state.
    MissingState {
        /// State array name.
        name: String,
    },
    /// `evaluate` was called before `setup` succeeded.
    NotSetUp,
    /// A bound field is not accessible in the current context.
    FieldUnavailable {
        /// The field (rendered id or tag).
        field: String,
    },
}

impl fmt::Display for EvaluatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionFailed { reason } => write!(f, "execution failed: {reason}"),
            Self::NonFinite { field, index } => {
                write!(f, "non-finite value in field {field}")?;
                if let Some(idx) = index {
                    write!(f, " at index {idx}")?;
                }
                Ok(())
            }
            Self::MissingState { name } => write!(f, "state array '{name}' not found"),
            Self::NotSetUp => write!(f, "evaluator used before setup"),
            Self::FieldUnavailable { field } => write!(f, "field {field} is not accessible"),
        }
    }
}

impl Error for EvaluatorError {}

/// Errors from evaluating one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepError {
    /// An evaluator returned an error; the batch was abandoned.
    EvaluatorFailed {
        /// Name of the failing evaluator.
        name: String,
        /// The underlying evaluator error.
        reason: EvaluatorError,
    },
    /// The workset holds more cells than the configured maximum batch size.
    BatchTooLarge {
        /// Cells in the workset.
        cell_count: usize,
        /// Configured maximum.
        max_batch: usize,
    },
    /// Evaluation was requested before a successful setup.
    NotSetUp,
    /// The requested scalar kind was not configured.
    KindNotActive(ScalarKind),
    /// A root value array does not fit the field's storage.
    RootSizeMismatch {
        /// The field (rendered tag).
        field: String,
        /// Supplied length.
        len: usize,
        /// Storage length.
        capacity: usize,
    },
    /// The named field is not part of the compiled graph.
    UnknownField {
        /// The field (rendered tag).
        field: String,
    },
    /// The field was not declared as a degree of freedom.
    UnknownDof {
        /// The field (rendered tag).
        field: String,
    },
    /// No parameter of this name was declared.
    UnknownParameter {
        /// Parameter name.
        name: String,
    },
    /// A derivative seed needs a slot the scalar type does not have.
    DerivativeSlot {
        /// The seeded field (rendered tag).
        field: String,
        /// Requested slot.
        slot: usize,
        /// Slots available.
        capacity: usize,
    },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EvaluatorFailed { name, reason } => {
                write!(f, "evaluator '{name}' failed: {reason}")
            }
            Self::BatchTooLarge {
                cell_count,
                max_batch,
            } => write!(
                f,
                "workset has {cell_count} cells, maximum batch size is {max_batch}"
            ),
            Self::NotSetUp => write!(f, "field manager is not set up"),
            Self::KindNotActive(kind) => write!(f, "{kind} evaluation is not configured"),
            Self::RootSizeMismatch {
                field,
                len,
                capacity,
            } => write!(
                f,
                "root {field}: {len} values do not fit storage of {capacity}"
            ),
            Self::UnknownField { field } => write!(f, "field {field} is not in the graph"),
            Self::UnknownDof { field } => {
                write!(f, "field {field} is not a declared degree of freedom")
            }
            Self::UnknownParameter { name } => write!(f, "parameter '{name}' is not declared"),
            Self::DerivativeSlot {
                field,
                slot,
                capacity,
            } => write!(
                f,
                "field {field}: derivative slot {slot} exceeds capacity {capacity}"
            ),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::EvaluatorFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluator_failure_chains_source() {
        let err = StepError::EvaluatorFailed {
            name: "phase residual".into(),
            reason: EvaluatorError::MissingState {
                name: "Temperature_old".into(),
            },
        };
        assert_eq!(
            err.to_string(),
            "evaluator 'phase residual' failed: state array 'Temperature_old' not found"
        );
        assert!(err.source().is_some());
        assert!(StepError::NotSetUp.source().is_none());
    }

    #[test]
    fn non_finite_reports_index_when_known() {
        let with = EvaluatorError::NonFinite {
            field: "T".into(),
            index: Some(3),
        };
        let without = EvaluatorError::NonFinite {
            field: "T".into(),
            index: None,
        };
        assert_eq!(with.to_string(), "non-finite value in field T at index 3");
        assert_eq!(without.to_string(), "non-finite value in field T");
    }
}
