//! Nodal unknowns to quadrature points.
//!
//! Both evaluators contract a nodal field with basis function values:
//!
//! ```text
//! u(c,q)    = Σ_n u(c,n) BF(c,n,q)
//! ∇u(c,q,d) = Σ_n u(c,n) GradBF(c,n,q,d)
//! ```
//!
//! In derivative modes the nodal values arrive seeded, so the results
//! carry the sensitivities with respect to every nodal unknown.

use strata_core::{ConfigError, Dim, EvalScalar, EvaluatorError, FieldTag};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

use crate::support::{required, same_extent, shaped};

// ── DofInterpolation ───────────────────────────────────────────────

/// Interpolates a nodal scalar to the quadrature points.
#[derive(Clone, Debug)]
pub struct DofInterpolation {
    name: String,
    dof: FieldTag,
    basis: FieldTag,
    output: FieldTag,
    bound: Option<ScalarBound>,
}

#[derive(Clone, Copy, Debug)]
struct ScalarBound {
    dof: FieldHandle,
    basis: FieldHandle,
    output: FieldHandle,
    nodes: usize,
    qps: usize,
}

/// Builder for [`DofInterpolation`].
///
/// Required: `dof` `<Cell,Node>`, `basis` `<Cell,Node,QuadPoint>` and
/// `output` `<Cell,QuadPoint>`.
#[derive(Debug, Default)]
pub struct DofInterpolationBuilder {
    name: Option<String>,
    dof: Option<FieldTag>,
    basis: Option<FieldTag>,
    output: Option<FieldTag>,
}

impl DofInterpolation {
    /// Create a new builder.
    pub fn builder() -> DofInterpolationBuilder {
        DofInterpolationBuilder::default()
    }
}

impl DofInterpolationBuilder {
    /// Evaluator name (default `DofInterpolation <dof>`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The nodal field.
    pub fn dof(mut self, tag: FieldTag) -> Self {
        self.dof = Some(tag);
        self
    }

    /// Basis function values.
    pub fn basis(mut self, tag: FieldTag) -> Self {
        self.basis = Some(tag);
        self
    }

    /// The interpolated field.
    pub fn output(mut self, tag: FieldTag) -> Self {
        self.output = Some(tag);
        self
    }

    /// Build the evaluator, checking the dimension kinds of every field.
    pub fn build(self) -> Result<DofInterpolation, ConfigError> {
        let name = self.name.unwrap_or_else(|| match &self.dof {
            Some(t) => format!("DofInterpolation {}", t.name()),
            None => "DofInterpolation".to_string(),
        });
        let dof = required(self.dof, &name, "dof")?;
        let basis = required(self.basis, &name, "basis")?;
        let output = required(self.output, &name, "output")?;
        shaped(&name, &dof, &[Dim::Cell, Dim::Node])?;
        shaped(&name, &basis, &[Dim::Cell, Dim::Node, Dim::QuadPoint])?;
        shaped(&name, &output, &[Dim::Cell, Dim::QuadPoint])?;
        Ok(DofInterpolation {
            name,
            dof,
            basis,
            output,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for DofInterpolation {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![self.dof.clone(), self.basis.clone()]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.output.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        let nodes = same_extent(bindings, Dim::Node, &self.basis, &[&self.dof])?;
        let qps = same_extent(bindings, Dim::QuadPoint, &self.basis, &[&self.output])?;
        self.bound = Some(ScalarBound {
            dof: bindings.bind(&self.dof)?,
            basis: bindings.bind(&self.basis)?,
            output: bindings.bind(&self.output)?,
            nodes,
            qps,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let cells = ctx.cell_count();
        let dof = ctx.input(b.dof)?;
        let bf = ctx.input(b.basis)?;
        let mut out = ctx.output_guarded(b.output)?;
        for cell in 0..cells {
            let u_qp = out.cell_mut(cell);
            for (qp, u) in u_qp.iter_mut().enumerate() {
                let mut sum = S::zero();
                for node in 0..b.nodes {
                    let cn = cell * b.nodes + node;
                    sum += dof[cn] * bf[cn * b.qps + qp];
                }
                *u = sum;
            }
        }
        Ok(())
    }
}

impl EvaluatorTemplate for DofInterpolation {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}

// ── DofGradInterpolation ───────────────────────────────────────────

/// Interpolates the gradient of a nodal scalar to the quadrature points.
#[derive(Clone, Debug)]
pub struct DofGradInterpolation {
    name: String,
    dof: FieldTag,
    grad_basis: FieldTag,
    output: FieldTag,
    bound: Option<GradBound>,
}

#[derive(Clone, Copy, Debug)]
struct GradBound {
    dof: FieldHandle,
    grad_basis: FieldHandle,
    output: FieldHandle,
    nodes: usize,
    qps: usize,
    dims: usize,
}

/// Builder for [`DofGradInterpolation`].
///
/// Required: `dof` `<Cell,Node>`, `grad_basis` `<Cell,Node,QuadPoint,Dim>`
/// and `output` `<Cell,QuadPoint,Dim>`.
#[derive(Debug, Default)]
pub struct DofGradInterpolationBuilder {
    name: Option<String>,
    dof: Option<FieldTag>,
    grad_basis: Option<FieldTag>,
    output: Option<FieldTag>,
}

impl DofGradInterpolation {
    /// Create a new builder.
    pub fn builder() -> DofGradInterpolationBuilder {
        DofGradInterpolationBuilder::default()
    }
}

impl DofGradInterpolationBuilder {
    /// Evaluator name (default `DofGradInterpolation <dof>`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The nodal field.
    pub fn dof(mut self, tag: FieldTag) -> Self {
        self.dof = Some(tag);
        self
    }

    /// Basis function gradients.
    pub fn grad_basis(mut self, tag: FieldTag) -> Self {
        self.grad_basis = Some(tag);
        self
    }

    /// The interpolated gradient.
    pub fn output(mut self, tag: FieldTag) -> Self {
        self.output = Some(tag);
        self
    }

    /// Build the evaluator, checking the dimension kinds of every field.
    pub fn build(self) -> Result<DofGradInterpolation, ConfigError> {
        let name = self.name.unwrap_or_else(|| match &self.dof {
            Some(t) => format!("DofGradInterpolation {}", t.name()),
            None => "DofGradInterpolation".to_string(),
        });
        let dof = required(self.dof, &name, "dof")?;
        let grad_basis = required(self.grad_basis, &name, "grad_basis")?;
        let output = required(self.output, &name, "output")?;
        shaped(&name, &dof, &[Dim::Cell, Dim::Node])?;
        shaped(
            &name,
            &grad_basis,
            &[Dim::Cell, Dim::Node, Dim::QuadPoint, Dim::Dim],
        )?;
        shaped(&name, &output, &[Dim::Cell, Dim::QuadPoint, Dim::Dim])?;
        Ok(DofGradInterpolation {
            name,
            dof,
            grad_basis,
            output,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for DofGradInterpolation {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![self.dof.clone(), self.grad_basis.clone()]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.output.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        let nodes = same_extent(bindings, Dim::Node, &self.grad_basis, &[&self.dof])?;
        let qps = same_extent(bindings, Dim::QuadPoint, &self.grad_basis, &[&self.output])?;
        let dims = same_extent(bindings, Dim::Dim, &self.grad_basis, &[&self.output])?;
        self.bound = Some(GradBound {
            dof: bindings.bind(&self.dof)?,
            grad_basis: bindings.bind(&self.grad_basis)?,
            output: bindings.bind(&self.output)?,
            nodes,
            qps,
            dims,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let cells = ctx.cell_count();
        let dof = ctx.input(b.dof)?;
        let gbf = ctx.input(b.grad_basis)?;
        let out = ctx.output(b.output)?;
        for cell in 0..cells {
            for qp in 0..b.qps {
                for dim in 0..b.dims {
                    let mut sum = S::zero();
                    for node in 0..b.nodes {
                        let cn = cell * b.nodes + node;
                        sum += dof[cn] * gbf[(cn * b.qps + qp) * b.dims + dim];
                    }
                    out[(cell * b.qps + qp) * b.dims + dim] = sum;
                }
            }
        }
        Ok(())
    }
}

impl EvaluatorTemplate for DofGradInterpolation {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}
