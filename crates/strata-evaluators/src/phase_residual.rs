//! Weak-form residual of transient heat conduction with phase change.
//!
//! ```text
//! R(c,n) = Σ_q [ Σ_d k ∇T_d wGradBF_d − (laser + source) wBF + ė wBF ]
//! ```
//!
//! The conductive flux `k ∇T` is formed once per quadrature point in the
//! scratch region; no input field is modified. The volumetric sources are
//! optional and count as zero when not configured.

use strata_core::{ConfigError, Dim, EvalScalar, EvaluatorError, FieldTag};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

use crate::support::{required, same_extent, shaped};

/// Nodal temperature residual of a phase-change heat problem.
#[derive(Clone, Debug)]
pub struct PhaseResidual {
    name: String,
    weighted_basis: FieldTag,
    weighted_grad_basis: FieldTag,
    gradient: FieldTag,
    conductivity: FieldTag,
    energy_rate: FieldTag,
    source: Option<FieldTag>,
    laser_source: Option<FieldTag>,
    residual: FieldTag,
    bound: Option<Bound>,
}

#[derive(Clone, Copy, Debug)]
struct Bound {
    wbf: FieldHandle,
    wgbf: FieldHandle,
    gradient: FieldHandle,
    conductivity: FieldHandle,
    energy_rate: FieldHandle,
    source: Option<FieldHandle>,
    laser_source: Option<FieldHandle>,
    residual: FieldHandle,
    batch: usize,
    nodes: usize,
    qps: usize,
    dims: usize,
}

/// Builder for [`PhaseResidual`].
///
/// Required: `weighted_basis`, `weighted_grad_basis`, `gradient`,
/// `conductivity`, `energy_rate` and `residual`.
#[derive(Debug, Default)]
pub struct PhaseResidualBuilder {
    name: Option<String>,
    weighted_basis: Option<FieldTag>,
    weighted_grad_basis: Option<FieldTag>,
    gradient: Option<FieldTag>,
    conductivity: Option<FieldTag>,
    energy_rate: Option<FieldTag>,
    source: Option<FieldTag>,
    laser_source: Option<FieldTag>,
    residual: Option<FieldTag>,
}

impl PhaseResidual {
    /// Create a new builder.
    pub fn builder() -> PhaseResidualBuilder {
        PhaseResidualBuilder::default()
    }
}

impl PhaseResidualBuilder {
    /// Evaluator name (default `PhaseResidual`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Weighted basis values, `<Cell,Node,QuadPoint>`.
    pub fn weighted_basis(mut self, tag: FieldTag) -> Self {
        self.weighted_basis = Some(tag);
        self
    }

    /// Weighted basis gradients, `<Cell,Node,QuadPoint,Dim>`.
    pub fn weighted_grad_basis(mut self, tag: FieldTag) -> Self {
        self.weighted_grad_basis = Some(tag);
        self
    }

    /// Temperature gradient, `<Cell,QuadPoint,Dim>`.
    pub fn gradient(mut self, tag: FieldTag) -> Self {
        self.gradient = Some(tag);
        self
    }

    /// Thermal conductivity, `<Cell,QuadPoint>`.
    pub fn conductivity(mut self, tag: FieldTag) -> Self {
        self.conductivity = Some(tag);
        self
    }

    /// Stored-energy rate, `<Cell,QuadPoint>`.
    pub fn energy_rate(mut self, tag: FieldTag) -> Self {
        self.energy_rate = Some(tag);
        self
    }

    /// Volumetric heat source, `<Cell,QuadPoint>`.
    pub fn source(mut self, tag: FieldTag) -> Self {
        self.source = Some(tag);
        self
    }

    /// Laser heat source, `<Cell,QuadPoint>`.
    pub fn laser_source(mut self, tag: FieldTag) -> Self {
        self.laser_source = Some(tag);
        self
    }

    /// Produced nodal residual, `<Cell,Node>`.
    pub fn residual(mut self, tag: FieldTag) -> Self {
        self.residual = Some(tag);
        self
    }

    /// Build the evaluator, checking the dimension kinds of every field.
    pub fn build(self) -> Result<PhaseResidual, ConfigError> {
        let name = self.name.unwrap_or_else(|| "PhaseResidual".to_string());
        let weighted_basis = required(self.weighted_basis, &name, "weighted_basis")?;
        let weighted_grad_basis =
            required(self.weighted_grad_basis, &name, "weighted_grad_basis")?;
        let gradient = required(self.gradient, &name, "gradient")?;
        let conductivity = required(self.conductivity, &name, "conductivity")?;
        let energy_rate = required(self.energy_rate, &name, "energy_rate")?;
        let residual = required(self.residual, &name, "residual")?;

        let qp_scalar = [Dim::Cell, Dim::QuadPoint];
        shaped(&name, &weighted_basis, &[Dim::Cell, Dim::Node, Dim::QuadPoint])?;
        shaped(
            &name,
            &weighted_grad_basis,
            &[Dim::Cell, Dim::Node, Dim::QuadPoint, Dim::Dim],
        )?;
        shaped(&name, &gradient, &[Dim::Cell, Dim::QuadPoint, Dim::Dim])?;
        shaped(&name, &residual, &[Dim::Cell, Dim::Node])?;
        for tag in [&conductivity, &energy_rate]
            .into_iter()
            .chain(self.source.as_ref())
            .chain(self.laser_source.as_ref())
        {
            shaped(&name, tag, &qp_scalar)?;
        }

        Ok(PhaseResidual {
            name,
            weighted_basis,
            weighted_grad_basis,
            gradient,
            conductivity,
            energy_rate,
            source: self.source,
            laser_source: self.laser_source,
            residual,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for PhaseResidual {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        let mut tags = vec![
            self.weighted_basis.clone(),
            self.weighted_grad_basis.clone(),
            self.gradient.clone(),
            self.conductivity.clone(),
            self.energy_rate.clone(),
        ];
        tags.extend(self.source.iter().cloned());
        tags.extend(self.laser_source.iter().cloned());
        tags
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.residual.clone()]
    }

    fn scratch_len(&self) -> usize {
        self.bound.map_or(0, |b| b.batch * b.qps * b.dims)
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        let wgbf = &self.weighted_grad_basis;
        let batch = bindings.extent(wgbf, Dim::Cell)?;
        let nodes = same_extent(
            bindings,
            Dim::Node,
            wgbf,
            &[&self.weighted_basis, &self.residual],
        )?;
        let mut at_qps = vec![
            &self.weighted_basis,
            &self.gradient,
            &self.conductivity,
            &self.energy_rate,
        ];
        at_qps.extend(self.source.as_ref());
        at_qps.extend(self.laser_source.as_ref());
        let qps = same_extent(bindings, Dim::QuadPoint, wgbf, &at_qps)?;
        let dims = same_extent(bindings, Dim::Dim, wgbf, &[&self.gradient])?;

        self.bound = Some(Bound {
            wbf: bindings.bind(&self.weighted_basis)?,
            wgbf: bindings.bind(wgbf)?,
            gradient: bindings.bind(&self.gradient)?,
            conductivity: bindings.bind(&self.conductivity)?,
            energy_rate: bindings.bind(&self.energy_rate)?,
            source: bindings.bind_opt(self.source.as_ref())?,
            laser_source: bindings.bind_opt(self.laser_source.as_ref())?,
            residual: bindings.bind(&self.residual)?,
            batch,
            nodes,
            qps,
            dims,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let cells = ctx.cell_count();
        let wbf = ctx.input(b.wbf)?;
        let wgbf = ctx.input(b.wgbf)?;
        let grad = ctx.input(b.gradient)?;
        let k = ctx.input(b.conductivity)?;
        let e_dot = ctx.input(b.energy_rate)?;
        let source = ctx.input_opt(b.source)?;
        let laser = ctx.input_opt(b.laser_source)?;

        let (out, scratch) = ctx.output_with_scratch(b.residual)?;
        let flux = scratch
            .alloc(grad.len())
            .ok_or_else(|| EvaluatorError::ExecutionFailed {
                reason: format!("scratch region too small for {} entries", grad.len()),
            })?;
        for (i, f) in flux.iter_mut().enumerate() {
            *f = k[i / b.dims] * grad[i];
        }

        out.fill(S::zero());
        for cell in 0..cells {
            for node in 0..b.nodes {
                let cn = cell * b.nodes + node;
                let mut r = S::zero();
                for qp in 0..b.qps {
                    let cq = cell * b.qps + qp;
                    let cnq = cn * b.qps + qp;
                    for dim in 0..b.dims {
                        r += flux[cq * b.dims + dim] * wgbf[cnq * b.dims + dim];
                    }
                    let mut heating = S::zero();
                    if let Some(s) = source {
                        heating += s[cq];
                    }
                    if let Some(l) = laser {
                        heating += l[cq];
                    }
                    r += (e_dot[cq] - heating) * wbf[cnq];
                }
                out[cn] = r;
            }
        }
        Ok(())
    }
}

impl EvaluatorTemplate for PhaseResidual {
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
    use strata_core::Fad;

    fn tag(name: &str, which: fn(&strata_core::Layouts) -> &strata_core::FieldLayout) -> FieldTag {
        FieldTag::new(name, which(&line_layouts()).clone())
    }

    fn wbf() -> FieldTag {
        tag("wBF", |dl| &dl.node_qp_scalar)
    }
    fn wgbf() -> FieldTag {
        tag("wGradBF", |dl| &dl.node_qp_gradient)
    }
    fn grad() -> FieldTag {
        tag("T_grad", |dl| &dl.qp_gradient)
    }
    fn qp(name: &str) -> FieldTag {
        tag(name, |dl| &dl.qp_scalar)
    }
    fn residual() -> FieldTag {
        tag("T_residual", |dl| &dl.node_scalar)
    }

    fn builder() -> PhaseResidualBuilder {
        PhaseResidual::builder()
            .weighted_basis(wbf())
            .weighted_grad_basis(wgbf())
            .gradient(grad())
            .conductivity(qp("k"))
            .energy_rate(qp("energy_dot"))
            .residual(residual())
    }

    // One-dimensional linear elements of length 1, two-point rule with
    // weights 1/2: wBF = BF/2 and wGradBF = ±1/2.
    const WBF: [f64; 8] = [0.375, 0.125, 0.125, 0.375, 0.375, 0.125, 0.125, 0.375];
    const WGBF: [f64; 8] = [-0.5, -0.5, 0.5, 0.5, -0.5, -0.5, 0.5, 0.5];

    fn roots(sources: bool) -> Vec<(FieldTag, Vec<f64>)> {
        let mut r = vec![
            (wbf(), WBF.to_vec()),
            (wgbf(), WGBF.to_vec()),
            (grad(), vec![2.0, 2.0, -1.0, -1.0]),
            (qp("k"), vec![3.0; 4]),
            (qp("energy_dot"), vec![4.0; 4]),
        ];
        if sources {
            r.push((qp("source"), vec![1.0; 4]));
            r.push((qp("laser"), vec![2.0; 4]));
        }
        r
    }

    fn run(e: PhaseResidual, roots: &[(FieldTag, Vec<f64>)]) -> Vec<f64> {
        let refs: Vec<(&FieldTag, Vec<f64>)> = roots.iter().map(|(t, v)| (t, v.clone())).collect();
        let mut fm = manager(e, &refs);
        evaluate(&mut fm, 2);
        fm.field(&residual()).unwrap().to_vec()
    }

    #[test]
    fn conduction_and_storage_terms() {
        let out = run(builder().build().unwrap(), &roots(false));
        // Cell 0: k∇T = 6, so the conduction term is ∓6 over two qps;
        // the storage term is 4 * (0.375 + 0.125) = 2 per node.
        assert_close(&out, &[-4.0, 8.0, 5.0, -1.0]);
    }

    #[test]
    fn sources_reduce_the_residual() {
        let e = builder()
            .source(qp("source"))
            .laser_source(qp("laser"))
            .build()
            .unwrap();
        let out = run(e, &roots(true));
        // (laser + source) * Σ wBF = 3 * 0.5 per node.
        assert_close(&out, &[-5.5, 6.5, 3.5, -2.5]);
    }

    #[test]
    fn inputs_are_left_untouched() {
        let roots = roots(false);
        let refs: Vec<(&FieldTag, Vec<f64>)> = roots.iter().map(|(t, v)| (t, v.clone())).collect();
        let mut fm = manager(builder().build().unwrap(), &refs);
        evaluate(&mut fm, 2);
        for (tag, values) in &roots {
            assert_eq!(fm.field(tag).unwrap(), values.as_slice(), "{tag}");
        }
    }

    #[test]
    fn scratch_is_sized_for_the_full_batch() {
        let roots = roots(false);
        let refs: Vec<(&FieldTag, Vec<f64>)> = roots.iter().map(|(t, v)| (t, v.clone())).collect();
        let fm = manager(builder().build().unwrap(), &refs);
        assert_eq!(fm.new_scratch().capacity(), 2 * 2 * 1);
    }

    #[test]
    fn jacobian_with_respect_to_gradient() {
        let roots = roots(false);
        let refs: Vec<(&FieldTag, Vec<Fad>)> = roots
            .iter()
            .map(|(t, v)| {
                let seeded: Vec<Fad> = if *t == grad() {
                    v.iter().enumerate().map(|(i, &x)| Fad::variable(x, i)).collect()
                } else {
                    v.iter().map(|&x| Fad::constant(x)).collect()
                };
                (t, seeded)
            })
            .collect();
        let mut fm = manager(builder().build().unwrap(), &refs);
        evaluate(&mut fm, 2);
        let out = fm.field(&residual()).unwrap();
        // ∂R(0,0)/∂∇T(0,q) = k wGradBF(0,0,q) = -1.5 for both qps.
        assert_eq!(out[0].derivative(0), -1.5);
        assert_eq!(out[0].derivative(1), -1.5);
        assert_eq!(out[0].derivative(2), 0.0);
        assert_eq!(out[1].derivative(0), 1.5);
        assert_close(&[out[0].value(), out[1].value()], &[-4.0, 8.0]);
    }

    #[test]
    fn source_with_wrong_layout_is_rejected() {
        let r = builder().source(grad()).build();
        assert!(matches!(r, Err(ConfigError::InconsistentLayout { .. })));
    }
}
