//! Fields holding one value everywhere.

use strata_core::{ConfigError, EvalScalar, EvaluatorError, FieldTag};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

use crate::support::{finite, required};

/// Fills the valid range of its output with a constant.
///
/// The value carries no derivative content in any evaluation mode. Works
/// for any layout; unbatched layouts (e.g. a workset scalar) are filled
/// completely.
#[derive(Clone, Debug)]
pub struct ConstantField {
    name: String,
    output: FieldTag,
    value: f64,
    handle: Option<FieldHandle>,
}

/// Builder for [`ConstantField`].
///
/// Required: `output` and `value`.
#[derive(Debug, Default)]
pub struct ConstantFieldBuilder {
    name: Option<String>,
    output: Option<FieldTag>,
    value: Option<f64>,
}

impl ConstantField {
    /// Create a new builder.
    pub fn builder() -> ConstantFieldBuilder {
        ConstantFieldBuilder::default()
    }

    /// The constant written.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// The produced field.
    pub fn output(&self) -> &FieldTag {
        &self.output
    }
}

impl ConstantFieldBuilder {
    /// Evaluator name (default `Constant <field>`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The field to fill.
    pub fn output(mut self, tag: FieldTag) -> Self {
        self.output = Some(tag);
        self
    }

    /// The value to fill it with. Must be finite.
    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Build the evaluator.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidParameter`] if `output` or `value` is missing
    /// or the value is not finite.
    pub fn build(self) -> Result<ConstantField, ConfigError> {
        let fallback = self
            .output
            .as_ref()
            .map(|t| format!("Constant {}", t.name()))
            .unwrap_or_else(|| "ConstantField".to_string());
        let name = self.name.unwrap_or(fallback);
        let output = required(self.output, &name, "output")?;
        let value = finite(&name, "value", required(self.value, &name, "value")?)?;
        Ok(ConstantField {
            name,
            output,
            value,
            handle: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for ConstantField {
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
        ctx.output_guarded(out)?.fill(S::from_f64(self.value));
        Ok(())
    }
}

impl EvaluatorTemplate for ConstantField {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}
