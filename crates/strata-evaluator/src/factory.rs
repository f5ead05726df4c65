//! Construction of evaluators for every evaluation mode.
//!
//! A registration list holds one [`EvaluatorFactory`] per evaluator. Each
//! evaluation mode asks the factory for its own instance, so fields of one
//! scalar kind never leak into another. Authors usually implement the
//! generic [`EvaluatorTemplate`] and get the object-safe factory for free.

use crate::evaluator::Evaluator;
use strata_core::{ConfigError, EvalScalar, Fad};

/// Generic constructor of an evaluator for any scalar type.
pub trait EvaluatorTemplate: Send + Sync + 'static {
    /// Name of the evaluators this template builds.
    fn name(&self) -> &str;

    /// Build an instance for scalar type `S`.
    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError>;
}

/// Object-safe constructor used in registration lists.
pub trait EvaluatorFactory: Send + Sync {
    /// Name of the evaluators this factory builds.
    fn name(&self) -> &str;

    /// Build an instance for plain-value evaluation.
    fn build_residual(&self) -> Result<Box<dyn Evaluator<f64>>, ConfigError>;

    /// Build an instance for derivative evaluation (Jacobian or tangent).
    fn build_derivative(&self) -> Result<Box<dyn Evaluator<Fad>>, ConfigError>;
}

impl<T: EvaluatorTemplate> EvaluatorFactory for T {
    fn name(&self) -> &str {
        EvaluatorTemplate::name(self)
    }

    fn build_residual(&self) -> Result<Box<dyn Evaluator<f64>>, ConfigError> {
        self.instantiate::<f64>()
    }

    fn build_derivative(&self) -> Result<Box<dyn Evaluator<Fad>>, ConfigError> {
        self.instantiate::<Fad>()
    }
}
