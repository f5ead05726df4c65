//! Fourier conduction: flux at the quadrature points and its weak-form
//! residual.

use strata_core::{ConfigError, Dim, EvalScalar, EvaluatorError, FieldTag};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

use crate::support::{required, same_extent, shaped};

// ── HeatFlux ───────────────────────────────────────────────────────

const QP_TENSOR: [Dim; 4] = [Dim::Cell, Dim::QuadPoint, Dim::Dim, Dim::Dim];

fn is_tensor(conductivity: &FieldTag) -> bool {
    conductivity.layout().rank() == QP_TENSOR.len()
}

/// `q(c,q,d) = -k(c,q) ∇T(c,q,d)`, or `q_i = -Σ_j K_ij ∇T_j` when the
/// conductivity is a `<Cell,QuadPoint,Dim,Dim>` tensor.
#[derive(Clone, Debug)]
pub struct HeatFlux {
    name: String,
    conductivity: FieldTag,
    gradient: FieldTag,
    flux: FieldTag,
    bound: Option<FluxBound>,
}

#[derive(Clone, Copy, Debug)]
struct FluxBound {
    conductivity: FieldHandle,
    gradient: FieldHandle,
    flux: FieldHandle,
    dims: usize,
    tensor: bool,
}

/// Builder for [`HeatFlux`].
#[derive(Debug, Default)]
pub struct HeatFluxBuilder {
    name: Option<String>,
    conductivity: Option<FieldTag>,
    gradient: Option<FieldTag>,
    flux: Option<FieldTag>,
}

impl HeatFlux {
    /// Create a new builder.
    pub fn builder() -> HeatFluxBuilder {
        HeatFluxBuilder::default()
    }
}

impl HeatFluxBuilder {
    /// Evaluator name (default `HeatFlux`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Thermal conductivity, `<Cell,QuadPoint>` or
    /// `<Cell,QuadPoint,Dim,Dim>`.
    pub fn conductivity(mut self, tag: FieldTag) -> Self {
        self.conductivity = Some(tag);
        self
    }

    /// Temperature gradient, `<Cell,QuadPoint,Dim>`.
    pub fn gradient(mut self, tag: FieldTag) -> Self {
        self.gradient = Some(tag);
        self
    }

    /// Produced heat flux, `<Cell,QuadPoint,Dim>`.
    pub fn flux(mut self, tag: FieldTag) -> Self {
        self.flux = Some(tag);
        self
    }

    /// Build the evaluator.
    pub fn build(self) -> Result<HeatFlux, ConfigError> {
        let name = self.name.unwrap_or_else(|| "HeatFlux".to_string());
        let conductivity = required(self.conductivity, &name, "conductivity")?;
        let gradient = required(self.gradient, &name, "gradient")?;
        let flux = required(self.flux, &name, "flux")?;
        let kinds: &[Dim] = if is_tensor(&conductivity) {
            &QP_TENSOR
        } else {
            &[Dim::Cell, Dim::QuadPoint]
        };
        shaped(&name, &conductivity, kinds)?;
        shaped(&name, &gradient, &[Dim::Cell, Dim::QuadPoint, Dim::Dim])?;
        shaped(&name, &flux, &[Dim::Cell, Dim::QuadPoint, Dim::Dim])?;
        Ok(HeatFlux {
            name,
            conductivity,
            gradient,
            flux,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for HeatFlux {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![self.conductivity.clone(), self.gradient.clone()]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.flux.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        same_extent(
            bindings,
            Dim::QuadPoint,
            &self.gradient,
            &[&self.conductivity, &self.flux],
        )?;
        let dims = same_extent(bindings, Dim::Dim, &self.gradient, &[&self.flux])?;
        let tensor = is_tensor(&self.conductivity);
        if tensor {
            for nth in 0..2 {
                let n = bindings.nth_extent(&self.conductivity, Dim::Dim, nth)?;
                if n != dims {
                    return Err(ConfigError::InconsistentLayout {
                        evaluator: self.name.clone(),
                        field: self.conductivity.to_string(),
                        expected: format!("{dims}x{dims} tensor"),
                        found: self.conductivity.layout().to_string(),
                    });
                }
            }
        }
        self.bound = Some(FluxBound {
            conductivity: bindings.bind(&self.conductivity)?,
            gradient: bindings.bind(&self.gradient)?,
            flux: bindings.bind(&self.flux)?,
            dims,
            tensor,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let k = ctx.input(b.conductivity)?;
        let grad = ctx.input(b.gradient)?;
        let out = ctx.output(b.flux)?;
        if b.dims == 0 {
            return Ok(());
        }
        if !b.tensor {
            for (i, q) in out.iter_mut().enumerate() {
                *q = -(k[i / b.dims] * grad[i]);
            }
            return Ok(());
        }
        let d = b.dims;
        for (cq, (q, g)) in out.chunks_exact_mut(d).zip(grad.chunks_exact(d)).enumerate() {
            let kt = &k[cq * d * d..(cq + 1) * d * d];
            for (i, qi) in q.iter_mut().enumerate() {
                let mut sum = S::zero();
                for (j, gj) in g.iter().enumerate() {
                    sum += kt[i * d + j] * *gj;
                }
                *qi = -sum;
            }
        }
        Ok(())
    }
}

impl EvaluatorTemplate for HeatFlux {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}

// ── DiffusionResidual ──────────────────────────────────────────────

/// `R(c,n) = -Σ_q Σ_d q(c,q,d) wGradBF(c,n,q,d)`.
///
/// Overwrites the residual of every valid cell.
#[derive(Clone, Debug)]
pub struct DiffusionResidual {
    name: String,
    flux: FieldTag,
    weighted_grad_basis: FieldTag,
    residual: FieldTag,
    bound: Option<ResidualBound>,
}

#[derive(Clone, Copy, Debug)]
struct ResidualBound {
    flux: FieldHandle,
    weighted_grad_basis: FieldHandle,
    residual: FieldHandle,
    nodes: usize,
    qps: usize,
    dims: usize,
}

/// Builder for [`DiffusionResidual`].
#[derive(Debug, Default)]
pub struct DiffusionResidualBuilder {
    name: Option<String>,
    flux: Option<FieldTag>,
    weighted_grad_basis: Option<FieldTag>,
    residual: Option<FieldTag>,
}

impl DiffusionResidual {
    /// Create a new builder.
    pub fn builder() -> DiffusionResidualBuilder {
        DiffusionResidualBuilder::default()
    }
}

impl DiffusionResidualBuilder {
    /// Evaluator name (default `DiffusionResidual`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Heat flux, `<Cell,QuadPoint,Dim>`.
    pub fn flux(mut self, tag: FieldTag) -> Self {
        self.flux = Some(tag);
        self
    }

    /// Weighted basis gradients, `<Cell,Node,QuadPoint,Dim>`.
    pub fn weighted_grad_basis(mut self, tag: FieldTag) -> Self {
        self.weighted_grad_basis = Some(tag);
        self
    }

    /// Produced nodal residual, `<Cell,Node>`.
    pub fn residual(mut self, tag: FieldTag) -> Self {
        self.residual = Some(tag);
        self
    }

    /// Build the evaluator.
    pub fn build(self) -> Result<DiffusionResidual, ConfigError> {
        let name = self.name.unwrap_or_else(|| "DiffusionResidual".to_string());
        let flux = required(self.flux, &name, "flux")?;
        let weighted_grad_basis =
            required(self.weighted_grad_basis, &name, "weighted_grad_basis")?;
        let residual = required(self.residual, &name, "residual")?;
        shaped(&name, &flux, &[Dim::Cell, Dim::QuadPoint, Dim::Dim])?;
        shaped(
            &name,
            &weighted_grad_basis,
            &[Dim::Cell, Dim::Node, Dim::QuadPoint, Dim::Dim],
        )?;
        shaped(&name, &residual, &[Dim::Cell, Dim::Node])?;
        Ok(DiffusionResidual {
            name,
            flux,
            weighted_grad_basis,
            residual,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for DiffusionResidual {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![self.flux.clone(), self.weighted_grad_basis.clone()]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.residual.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        let wgbf = &self.weighted_grad_basis;
        let nodes = same_extent(bindings, Dim::Node, wgbf, &[&self.residual])?;
        let qps = same_extent(bindings, Dim::QuadPoint, wgbf, &[&self.flux])?;
        let dims = same_extent(bindings, Dim::Dim, wgbf, &[&self.flux])?;
        self.bound = Some(ResidualBound {
            flux: bindings.bind(&self.flux)?,
            weighted_grad_basis: bindings.bind(wgbf)?,
            residual: bindings.bind(&self.residual)?,
            nodes,
            qps,
            dims,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let cells = ctx.cell_count();
        let flux = ctx.input(b.flux)?;
        let wgbf = ctx.input(b.weighted_grad_basis)?;
        let out = ctx.output(b.residual)?;
        out.fill(S::zero());
        for cell in 0..cells {
            for node in 0..b.nodes {
                let r = &mut out[cell * b.nodes + node];
                for qp in 0..b.qps {
                    let cq = cell * b.qps + qp;
                    let cnq = (cell * b.nodes + node) * b.qps + qp;
                    for dim in 0..b.dims {
                        *r -= flux[cq * b.dims + dim] * wgbf[cnq * b.dims + dim];
                    }
                }
            }
        }
        Ok(())
    }
}

impl EvaluatorTemplate for DiffusionResidual {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_close, evaluate, line_layouts, manager};
    use proptest::prelude::*;
    use strata_core::Fad;

    fn k() -> FieldTag {
        FieldTag::new("k", line_layouts().qp_scalar)
    }

    fn grad() -> FieldTag {
        FieldTag::new("T_grad", line_layouts().qp_gradient)
    }

    fn flux() -> FieldTag {
        FieldTag::new("flux", line_layouts().qp_gradient)
    }

    fn wgbf() -> FieldTag {
        FieldTag::new("wGradBF", line_layouts().node_qp_gradient)
    }

    fn residual() -> FieldTag {
        FieldTag::new("T_residual", line_layouts().node_scalar)
    }

    fn heat_flux() -> HeatFlux {
        HeatFlux::builder()
            .conductivity(k())
            .gradient(grad())
            .flux(flux())
            .build()
            .unwrap()
    }

    fn diffusion_residual() -> DiffusionResidual {
        DiffusionResidual::builder()
            .flux(flux())
            .weighted_grad_basis(wgbf())
            .residual(residual())
            .build()
            .unwrap()
    }

    #[test]
    fn flux_opposes_the_gradient() {
        let mut fm = manager(
            heat_flux(),
            &[
                (&k(), vec![2.0, 2.0, 0.5, 0.5]),
                (&grad(), vec![1.0, -1.0, 4.0, 0.0]),
            ],
        );
        evaluate(&mut fm, 2);
        assert_close(fm.field(&flux()).unwrap(), &[-2.0, 2.0, -2.0, 0.0]);
    }

    #[test]
    fn residual_contracts_flux_with_weighted_gradients() {
        let mut fm = manager(
            diffusion_residual(),
            &[
                (&flux(), vec![-2.0, -2.0, 1.0, 3.0]),
                (&wgbf(), vec![-0.5, -0.5, 0.5, 0.5, -0.5, -0.5, 0.5, 0.5]),
            ],
        );
        evaluate(&mut fm, 2);
        // Cell 0: -(-2 * -0.5 + -2 * -0.5) = -2 for node 0, +2 for node 1.
        assert_close(fm.field(&residual()).unwrap(), &[-2.0, 2.0, 2.0, -2.0]);
    }

    #[test]
    fn residual_is_overwritten_not_accumulated() {
        let mut fm = manager(
            diffusion_residual(),
            &[
                (&flux(), vec![1.0; 4]),
                (&wgbf(), vec![1.0; 8]),
            ],
        );
        evaluate(&mut fm, 2);
        evaluate(&mut fm, 2);
        assert_close(fm.field(&residual()).unwrap(), &[-2.0; 4]);
    }

    #[test]
    fn flux_derivative_is_conductivity() {
        let g: Vec<Fad> = (0..4).map(|i| Fad::variable(1.0, i)).collect();
        let kv = vec![Fad::constant(3.0); 4];
        let mut fm = manager(heat_flux(), &[(&k(), kv), (&grad(), g)]);
        evaluate(&mut fm, 2);
        let out = fm.field(&flux()).unwrap();
        for (i, q) in out.iter().enumerate() {
            assert_eq!(q.value(), -3.0);
            assert_eq!(q.derivative(i), -3.0);
        }
    }

    fn plane() -> strata_core::Layouts {
        strata_core::Layouts::new(strata_core::LayoutExtents {
            workset_size: 1,
            vertices: 3,
            nodes: 3,
            qps: 1,
            dims: 2,
            vec_dim: None,
            faces: 3,
        })
    }

    fn tensor_flux(l: strata_core::Layouts) -> HeatFlux {
        HeatFlux::builder()
            .conductivity(FieldTag::new("K", l.qp_tensor.clone()))
            .gradient(FieldTag::new("T_grad", l.qp_gradient.clone()))
            .flux(FieldTag::new("flux", l.qp_gradient))
            .build()
            .unwrap()
    }

    #[test]
    fn anisotropic_conductivity_mixes_components() {
        let l = plane();
        let mut fm = manager(
            tensor_flux(plane()),
            &[
                (&FieldTag::new("K", l.qp_tensor.clone()), vec![2.0, 1.0, 0.5, 3.0]),
                (&FieldTag::new("T_grad", l.qp_gradient.clone()), vec![1.0, -2.0]),
            ],
        );
        evaluate(&mut fm, 1);
        // q = -[2 1; 0.5 3] [1 -2] = -[0, -5.5].
        assert_close(
            fm.field(&FieldTag::new("flux", l.qp_gradient)).unwrap(),
            &[0.0, 5.5],
        );
    }

    #[test]
    fn tensor_of_wrong_dimension_fails_setup() {
        let l = plane();
        let k3 = FieldTag::new(
            "K",
            strata_core::FieldLayout::new(&[
                (Dim::Cell, 1),
                (Dim::QuadPoint, 1),
                (Dim::Dim, 3),
                (Dim::Dim, 3),
            ]),
        );
        let e = HeatFlux::builder()
            .conductivity(k3.clone())
            .gradient(FieldTag::new("T_grad", l.qp_gradient.clone()))
            .flux(FieldTag::new("flux", l.qp_gradient.clone()))
            .build()
            .unwrap();
        let mut fm = strata_engine::FieldManager::<f64>::new(strata_core::ScalarKind::Residual, 1);
        fm.declare_root(k3);
        fm.declare_root(FieldTag::new("T_grad", l.qp_gradient));
        fm.register_evaluator(Box::new(e));
        match fm.post_registration_setup() {
            Err(strata_engine::SetupError::Config(ConfigError::InconsistentLayout {
                expected,
                ..
            })) => assert_eq!(expected, "2x2 tensor"),
            other => panic!("expected InconsistentLayout, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn diagonal_tensor_matches_scalar_conductivity(
            k in 0.01f64..100.0,
            gx in -10.0f64..10.0,
            gy in -10.0f64..10.0,
        ) {
            let l = plane();
            let grad = FieldTag::new("T_grad", l.qp_gradient.clone());
            let flux = FieldTag::new("flux", l.qp_gradient.clone());
            let scalar = HeatFlux::builder()
                .conductivity(FieldTag::new("k", l.qp_scalar.clone()))
                .gradient(grad.clone())
                .flux(flux.clone())
                .build()
                .unwrap();
            let mut a = manager(
                scalar,
                &[(&FieldTag::new("k", l.qp_scalar.clone()), vec![k]), (&grad, vec![gx, gy])],
            );
            let mut b = manager(
                tensor_flux(plane()),
                &[
                    (&FieldTag::new("K", l.qp_tensor.clone()), vec![k, 0.0, 0.0, k]),
                    (&grad, vec![gx, gy]),
                ],
            );
            evaluate(&mut a, 1);
            evaluate(&mut b, 1);
            prop_assert_eq!(a.field(&flux).unwrap(), b.field(&flux).unwrap());
        }
    }

    #[test]
    fn missing_flux_is_reported_by_name() {
        match DiffusionResidual::builder()
            .weighted_grad_basis(wgbf())
            .residual(residual())
            .build()
        {
            Err(ConfigError::InvalidParameter { reason, .. }) => assert!(reason.contains("flux")),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }
}
