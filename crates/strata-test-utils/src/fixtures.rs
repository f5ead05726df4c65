//! Reusable evaluator test fixtures.
//!
//! Three standard evaluators for graph and engine testing:
//!
//! - [`ConstEvaluator`]: writes a constant value (no inputs).
//! - [`CopyEvaluator`]: copies an input field to an output field.
//! - [`FailingEvaluator`]: fails deterministically after N calls.
//!
//! Each is generic over the scalar type and doubles as its own
//! [`EvaluatorTemplate`], so it can go straight into a registration list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_core::{ConfigError, EvalScalar, EvaluatorError, FieldTag};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

/// Writes a constant value to every valid entry of its output.
#[derive(Clone, Debug)]
pub struct ConstEvaluator {
    pub name: String,
    pub output: FieldTag,
    pub value: f64,
    handle: Option<FieldHandle>,
}

impl ConstEvaluator {
    pub fn new(name: impl Into<String>, output: FieldTag, value: f64) -> Self {
        Self {
            name: name.into(),
            output,
            value,
            handle: None,
        }
    }
}

impl<S: EvalScalar> Evaluator<S> for ConstEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        Vec::new()
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.output.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        self.handle = Some(bindings.bind(&self.output)?);
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let out = self.handle.ok_or(EvaluatorError::NotSetUp)?;
        ctx.output(out)?.fill(S::from_f64(self.value));
        Ok(())
    }
}

impl EvaluatorTemplate for ConstEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}

/// Reads one field and copies it to another with the same per-cell size.
///
/// Useful for checking ordering: if the output matches the input, the
/// producer of the input ran first.
#[derive(Clone, Debug)]
pub struct CopyEvaluator {
    pub name: String,
    pub input: FieldTag,
    pub output: FieldTag,
    handles: Option<(FieldHandle, FieldHandle)>,
}

impl CopyEvaluator {
    pub fn new(name: impl Into<String>, input: FieldTag, output: FieldTag) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            handles: None,
        }
    }
}

impl<S: EvalScalar> Evaluator<S> for CopyEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![self.input.clone()]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.output.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        let input = bindings.bind(&self.input)?;
        let output = bindings.bind(&self.output)?;
        if input.per_cell() != output.per_cell() {
            return Err(ConfigError::InconsistentLayout {
                evaluator: self.name.clone(),
                field: self.output.to_string(),
                expected: format!("{} entries per cell", input.per_cell()),
                found: format!("{} entries per cell", output.per_cell()),
            });
        }
        self.handles = Some((input, output));
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let (input, output) = self.handles.ok_or(EvaluatorError::NotSetUp)?;
        let src = ctx.input(input)?;
        let dst = ctx.output(output)?;
        if src.len() != dst.len() {
            return Err(EvaluatorError::ExecutionFailed {
                reason: format!(
                    "size mismatch: input has {} entries, output has {}",
                    src.len(),
                    dst.len()
                ),
            });
        }
        dst.copy_from_slice(src);
        Ok(())
    }
}

impl EvaluatorTemplate for CopyEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}

/// Fails deterministically after a configurable number of successful calls.
///
/// The call counter is shared by every instance built from the same
/// template, so a test can observe calls across evaluation modes.
#[derive(Clone, Debug)]
pub struct FailingEvaluator {
    pub name: String,
    pub output: FieldTag,
    pub succeed_count: usize,
    call_count: Arc<AtomicUsize>,
    handle: Option<FieldHandle>,
}

impl FailingEvaluator {
    /// Create an evaluator that succeeds `succeed_count` times then fails.
    pub fn new(name: impl Into<String>, output: FieldTag, succeed_count: usize) -> Self {
        Self {
            name: name.into(),
            output,
            succeed_count,
            call_count: Arc::new(AtomicUsize::new(0)),
            handle: None,
        }
    }

    /// How many times `evaluate()` has been called.
    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Reset the call counter.
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::Relaxed);
    }
}

impl<S: EvalScalar> Evaluator<S> for FailingEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        Vec::new()
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.output.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        self.handle = Some(bindings.bind(&self.output)?);
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if n >= self.succeed_count {
            return Err(EvaluatorError::ExecutionFailed {
                reason: format!(
                    "deliberate failure after {} successful calls",
                    self.succeed_count
                ),
            });
        }
        // On success, fill output with the call index for traceability.
        let out = self.handle.ok_or(EvaluatorError::NotSetUp)?;
        ctx.output(out)?.fill(S::from_f64(n as f64));
        Ok(())
    }
}

impl EvaluatorTemplate for FailingEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}
