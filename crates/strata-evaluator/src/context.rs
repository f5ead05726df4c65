//! Execution context passed to evaluators during workset evaluation.
//!
//! [`EvalContext`] provides read access to every field, write access to
//! the running evaluator's declared outputs, scratch memory and the
//! current workset. Input slices borrow the field storage rather than the
//! context, so an evaluator can hold its inputs while writing its outputs.

use crate::bindings::FieldHandle;
use crate::guard::FullWriteGuard;
use crate::scratch::ScratchRegion;
use strata_core::{EvaluatorError, FieldReader, FieldWriter, ScalarKind, Workset};

/// Execution context passed to each evaluator's `evaluate()` method.
///
/// Uses dynamic dispatch (`&dyn FieldReader`, `&mut dyn FieldWriter`) to
/// keep the [`Evaluator`](crate::Evaluator) trait object-safe while
/// supporting mock-based testing.
///
/// [`input`](Self::input) and [`output`](Self::output) return only the
/// valid range of a cell-batched field: `[0, cell_count * per_cell)`.
pub struct EvalContext<'a, S> {
    evaluator: &'a str,
    reads: &'a dyn FieldReader<S>,
    writes: &'a mut dyn FieldWriter<S>,
    scratch: &'a mut ScratchRegion<S>,
    workset: &'a Workset<'a>,
    kind: ScalarKind,
}

impl<'a, S: strata_core::EvalScalar> EvalContext<'a, S> {
    /// Construct a new context.
    ///
    /// Typically called by the field manager, not by evaluators directly.
    /// For testing, construct with mock readers/writers from
    /// `strata-test-utils`.
    pub fn new(
        evaluator: &'a str,
        reads: &'a dyn FieldReader<S>,
        writes: &'a mut dyn FieldWriter<S>,
        scratch: &'a mut ScratchRegion<S>,
        workset: &'a Workset<'a>,
        kind: ScalarKind,
    ) -> Self {
        Self {
            evaluator,
            reads,
            writes,
            scratch,
            workset,
            kind,
        }
    }

    /// Reader over all fields.
    pub fn reads(&self) -> &'a dyn FieldReader<S> {
        self.reads
    }

    /// Writer over the running evaluator's declared outputs.
    pub fn writes(&mut self) -> &mut dyn FieldWriter<S> {
        self.writes
    }

    /// Scratch memory allocator. Reset between evaluators.
    pub fn scratch(&mut self) -> &mut ScratchRegion<S> {
        self.scratch
    }

    /// The workset being evaluated.
    pub fn workset(&self) -> &'a Workset<'a> {
        self.workset
    }

    /// Number of valid cells in the current workset.
    pub fn cell_count(&self) -> usize {
        self.workset.cell_count()
    }

    /// Evaluation mode of the running manager.
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Name of the running evaluator.
    pub fn evaluator(&self) -> &'a str {
        self.evaluator
    }

    /// The valid range of an input field.
    pub fn input(&self, field: FieldHandle) -> Result<&'a [S], EvaluatorError> {
        let reads = self.reads;
        let data = reads
            .read(field.id())
            .ok_or_else(|| EvaluatorError::FieldUnavailable {
                field: field.id().to_string(),
            })?;
        let len = field.valid_len(self.cell_count());
        data.get(..len)
            .ok_or_else(|| EvaluatorError::FieldUnavailable {
                field: field.id().to_string(),
            })
    }

    /// The valid range of an optional input field.
    pub fn input_opt(&self, field: Option<FieldHandle>) -> Result<Option<&'a [S]>, EvaluatorError> {
        field.map(|h| self.input(h)).transpose()
    }

    /// The valid range of a declared output field.
    pub fn output(&mut self, field: FieldHandle) -> Result<&mut [S], EvaluatorError> {
        let len = field.valid_len(self.cell_count());
        let data = self
            .writes
            .write(field.id())
            .ok_or_else(|| EvaluatorError::FieldUnavailable {
                field: field.id().to_string(),
            })?;
        let available = data.len();
        data.get_mut(..len)
            .ok_or_else(|| EvaluatorError::FieldUnavailable {
                field: format!("{} ({available} of {len} entries)", field.id()),
            })
    }

    /// The valid range of an output together with the scratch region.
    pub fn output_with_scratch(
        &mut self,
        field: FieldHandle,
    ) -> Result<(&mut [S], &mut ScratchRegion<S>), EvaluatorError> {
        let len = field.valid_len(self.workset.cell_count());
        let data = self
            .writes
            .write(field.id())
            .ok_or_else(|| EvaluatorError::FieldUnavailable {
                field: field.id().to_string(),
            })?;
        let out = data
            .get_mut(..len)
            .ok_or_else(|| EvaluatorError::FieldUnavailable {
                field: field.id().to_string(),
            })?;
        Ok((out, &mut *self.scratch))
    }

    /// The valid range of an output wrapped in a coverage guard, for
    /// outputs the evaluator overwrites completely rather than accumulates.
    pub fn output_guarded(&mut self, field: FieldHandle) -> Result<FullWriteGuard<'_, S>, EvaluatorError> {
        let evaluator = self.evaluator;
        let out = self.output(field)?;
        Ok(FullWriteGuard::new(out, field.per_cell(), evaluator, field.id()))
    }
}
