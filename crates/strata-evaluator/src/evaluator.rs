//! The [`Evaluator`] trait.
//!
//! Evaluators are independently authored units of computation. Each one
//! declares the named fields it requires and produces; the graph builder
//! orders them and the field manager runs them once per workset.

use crate::bindings::FieldBindings;
use crate::context::EvalContext;
use crate::graph::EvaluatorDecl;
use strata_core::{ConfigError, EvalScalar, EvaluatorError, FieldTag};

/// A unit of computation in the field evaluation graph.
///
/// # Contract
///
/// - `requires()` and `produces()` are called once per graph build, not
///   per workset, and must return the same tags every time.
/// - `setup()` runs once after the graph is built, in execution order. It
///   receives bound handles for every declared field and is where
///   batch-invariant extents are cached.
/// - `evaluate()` MUST be deterministic and write each output for exactly
///   the cells `[0, cell_count)` of the current workset. The engine never
///   clears outputs: an evaluator that accumulates into an output zeroes
///   that range itself first.
/// - `&self` during evaluation: evaluators hold no per-workset state.
///
/// The same algorithm body serves every evaluation mode by being generic
/// over `S`.
///
/// # Object safety
///
/// This trait is object-safe; managers store evaluators as
/// `Vec<Box<dyn Evaluator<S>>>`.
///
/// # Examples
///
/// An evaluator that fills a field with a constant value:
///
/// ```
/// use strata_core::{ConfigError, Dim, EvalScalar, EvaluatorError, FieldLayout, FieldTag};
/// use strata_evaluator::{EvalContext, Evaluator, FieldBindings, FieldHandle};
///
/// struct Fill<S> {
///     out: FieldTag,
///     value: S,
///     handle: Option<FieldHandle>,
/// }
///
/// impl<S: EvalScalar> Evaluator<S> for Fill<S> {
///     fn name(&self) -> &str {
///         "fill"
///     }
///
///     fn requires(&self) -> Vec<FieldTag> {
///         Vec::new()
///     }
///
///     fn produces(&self) -> Vec<FieldTag> {
///         vec![self.out.clone()]
///     }
///
///     fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
///         self.handle = Some(bindings.bind(&self.out)?);
///         Ok(())
///     }
///
///     fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
///         let out = self.handle.ok_or(EvaluatorError::NotSetUp)?;
///         ctx.output(out)?.fill(self.value);
///         Ok(())
///     }
/// }
///
/// let fill = Fill {
///     out: FieldTag::new("rho", FieldLayout::new(&[(Dim::Cell, 4)])),
///     value: 1.5f64,
///     handle: None,
/// };
/// assert_eq!(Evaluator::<f64>::name(&fill), "fill");
/// ```
pub trait Evaluator<S: EvalScalar>: Send + Sync + 'static {
    /// Human-readable name for error reporting and metrics.
    fn name(&self) -> &str;

    /// Fields that must be available before this evaluator runs.
    fn requires(&self) -> Vec<FieldTag>;

    /// Fields this evaluator writes. No other evaluator in the same graph
    /// may produce any of them.
    fn produces(&self) -> Vec<FieldTag>;

    /// Both declarations, as consumed by the graph builder.
    fn declared_fields(&self) -> EvaluatorDecl {
        EvaluatorDecl::new(self.name(), self.requires(), self.produces())
    }

    /// Scratch space needed during `evaluate`, in scalars.
    ///
    /// Queried after `setup`. The manager allocates the maximum over all
    /// evaluators and resets the region between evaluators.
    fn scratch_len(&self) -> usize {
        0
    }

    /// Bind field handles and cache layout extents.
    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError>;

    /// Compute the outputs for the current workset.
    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError>;
}
