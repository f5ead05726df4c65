//! Engine configuration, validation, and setup error types.
//!
//! [`EngineConfig`] is the builder-input for [`EvaluationModes`]. It holds
//! already-parsed values; reading them from an input deck is the caller's
//! job. [`validate()`](EngineConfig::validate) checks structural
//! invariants before any evaluator is instantiated.
//!
//! [`EvaluationModes`]: crate::EvaluationModes

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use strata_core::{ConfigError, FieldTag, ScalarKind, FAD_CAPACITY};
use strata_evaluator::{EvaluatorFactory, GraphBuildError};

// ── SetupError ─────────────────────────────────────────────────────

/// Errors detected while validating a configuration or setting up a
/// field manager.
#[derive(Debug, PartialEq)]
pub enum SetupError {
    /// Dependency graph construction failed.
    Graph(GraphBuildError),
    /// An evaluator could not be constructed or set up.
    Config(ConfigError),
    /// The maximum batch size is zero.
    InvalidBatchSize {
        /// The configured value.
        value: usize,
    },
    /// No scalar kind was requested.
    NoScalarKinds,
    /// The same scalar kind was requested twice.
    DuplicateKind(ScalarKind),
    /// A cell-batched field's leading extent differs from the maximum
    /// batch size.
    BatchExtentMismatch {
        /// The field (rendered tag).
        field: String,
        /// Its `Cell` extent.
        extent: usize,
        /// Configured maximum batch size.
        max_batch: usize,
    },
    /// More derivative slots are needed than the derivative scalar type
    /// carries.
    DerivativeCapacity {
        /// What needs the slots (`"local unknowns"` or `"parameters"`).
        what: &'static str,
        /// Slots needed.
        required: usize,
        /// Slots available.
        capacity: usize,
    },
    /// Two parameters share a name.
    DuplicateParameter(String),
    /// A degree-of-freedom field is not cell-batched.
    UnbatchedDof {
        /// The field (rendered tag).
        field: String,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(e) => write!(f, "graph: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::InvalidBatchSize { value } => {
                write!(f, "max_batch_size must be at least 1, got {value}")
            }
            Self::NoScalarKinds => write!(f, "no scalar kinds requested"),
            Self::DuplicateKind(kind) => write!(f, "scalar kind {kind} requested twice"),
            Self::BatchExtentMismatch {
                field,
                extent,
                max_batch,
            } => write!(
                f,
                "field {field} has Cell extent {extent}, maximum batch size is {max_batch}"
            ),
            Self::DerivativeCapacity {
                what,
                required,
                capacity,
            } => write!(
                f,
                "{required} {what} need derivative slots, only {capacity} available"
            ),
            Self::DuplicateParameter(name) => write!(f, "parameter '{name}' declared twice"),
            Self::UnbatchedDof { field } => {
                write!(f, "degree of freedom {field} is not cell-batched")
            }
        }
    }
}

impl Error for SetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Graph(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphBuildError> for SetupError {
    fn from(e: GraphBuildError) -> Self {
        Self::Graph(e)
    }
}

impl From<ConfigError> for SetupError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ── EngineConfig ───────────────────────────────────────────────────

/// Complete configuration for a set of evaluation modes.
///
/// Passed to [`EvaluationModes::new()`](crate::EvaluationModes::new).
/// Consumed during construction.
#[derive(Clone)]
pub struct EngineConfig {
    /// Maximum number of cells per workset. Every cell-batched field's
    /// leading extent must equal this.
    pub max_batch_size: usize,
    /// Scalar kinds to build a field manager for.
    pub kinds: Vec<ScalarKind>,
    /// Fields supplied from outside the graph.
    pub roots: Vec<FieldTag>,
    /// Fields the caller reads back. Empty means every produced field.
    pub required: Vec<FieldTag>,
    /// Nodal unknowns seeded as independent variables in Jacobian mode.
    /// Each is also a root. Local derivative slots are assigned in this
    /// order, one per entry of a cell.
    pub dofs: Vec<FieldTag>,
    /// Named parameters seeded as independent variables in tangent mode.
    /// Each field is also a root; the parameter's slot is its position.
    pub parameters: Vec<(String, FieldTag)>,
    /// Evaluator registration list, in registration order.
    pub evaluators: Vec<Arc<dyn EvaluatorFactory>>,
}

impl EngineConfig {
    /// A residual-only configuration with no roots or evaluators.
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            kinds: vec![ScalarKind::Residual],
            roots: Vec::new(),
            required: Vec::new(),
            dofs: Vec::new(),
            parameters: Vec::new(),
            evaluators: Vec::new(),
        }
    }

    /// Replace the requested scalar kinds.
    pub fn with_kinds(mut self, kinds: &[ScalarKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    /// Declare an external root field.
    pub fn with_root(mut self, tag: FieldTag) -> Self {
        self.roots.push(tag);
        self
    }

    /// Request a field for output.
    pub fn with_required(mut self, tag: FieldTag) -> Self {
        self.required.push(tag);
        self
    }

    /// Declare a degree-of-freedom field.
    pub fn with_dof(mut self, tag: FieldTag) -> Self {
        self.dofs.push(tag);
        self
    }

    /// Declare a named parameter held in `tag`.
    pub fn with_parameter(mut self, name: impl Into<String>, tag: FieldTag) -> Self {
        self.parameters.push((name.into(), tag));
        self
    }

    /// Derivative slots the degrees of freedom of one cell occupy.
    pub fn local_unknowns(&self) -> usize {
        self.dofs.iter().map(|t| t.layout().per_cell()).sum()
    }

    /// Append an evaluator to the registration list.
    pub fn with_evaluator(mut self, factory: Arc<dyn EvaluatorFactory>) -> Self {
        self.evaluators.push(factory);
        self
    }

    /// Check structural invariants. Called automatically by
    /// `EvaluationModes::new()`.
    pub fn validate(&self) -> Result<(), SetupError> {
        // 1. Batch size.
        if self.max_batch_size == 0 {
            return Err(SetupError::InvalidBatchSize {
                value: self.max_batch_size,
            });
        }
        // 2. Kinds.
        if self.kinds.is_empty() {
            return Err(SetupError::NoScalarKinds);
        }
        for (i, kind) in self.kinds.iter().enumerate() {
            if self.kinds[..i].contains(kind) {
                return Err(SetupError::DuplicateKind(*kind));
            }
        }
        // 3. Batched roots and outputs must match the batch size.
        let parameter_tags = self.parameters.iter().map(|(_, t)| t);
        for tag in self
            .roots
            .iter()
            .chain(&self.required)
            .chain(&self.dofs)
            .chain(parameter_tags)
        {
            check_batch_extent(tag, self.max_batch_size)?;
        }
        // 4. Derivative seeds must fit the derivative scalar.
        for tag in &self.dofs {
            if !tag.layout().is_batched() {
                return Err(SetupError::UnbatchedDof {
                    field: tag.to_string(),
                });
            }
        }
        if self.kinds.contains(&ScalarKind::Jacobian) {
            check_capacity("local unknowns", self.local_unknowns())?;
        }
        for (i, (name, _)) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|(n, _)| n == name) {
                return Err(SetupError::DuplicateParameter(name.clone()));
            }
        }
        if self.kinds.contains(&ScalarKind::Tangent) {
            check_capacity("parameters", self.parameters.len())?;
        }
        Ok(())
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.evaluators.iter().map(|e| e.name()).collect();
        f.debug_struct("EngineConfig")
            .field("max_batch_size", &self.max_batch_size)
            .field("kinds", &self.kinds)
            .field("roots", &self.roots)
            .field("required", &self.required)
            .field("dofs", &self.dofs)
            .field("parameters", &self.parameters)
            .field("evaluators", &names)
            .finish()
    }
}

fn check_capacity(what: &'static str, required: usize) -> Result<(), SetupError> {
    if required > FAD_CAPACITY {
        return Err(SetupError::DerivativeCapacity {
            what,
            required,
            capacity: FAD_CAPACITY,
        });
    }
    Ok(())
}

/// Reject a cell-batched tag whose leading extent is not `max_batch`.
pub(crate) fn check_batch_extent(tag: &FieldTag, max_batch: usize) -> Result<(), SetupError> {
    match tag.layout().batch_extent() {
        Some(extent) if extent != max_batch => Err(SetupError::BatchExtentMismatch {
            field: tag.to_string(),
            extent,
            max_batch,
        }),
        _ => Ok(()),
    }
}
