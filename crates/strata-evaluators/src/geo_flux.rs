//! Geothermal heat flux through a basal side set.
//!
//! For every side of the named side set touching the workset, each node
//! of that side receives
//!
//! ```text
//! Σ_q G(c,s,q) BF(c,s,n,q) w(c,s,q)
//! ```
//!
//! where `G` is a constant or a side field. With stabilization enabled, a
//! second output receives the SUPG term
//!
//! ```text
//! Σ_q Σ_d G(c,s,q) SUPG_SCALE u_d(c,s,q) GradBF_d(c,s,n,q) w(c,s,q)
//! ```
//!
//! over the first `min(vec_dim, 2)` velocity components. Side node maps
//! come from the cell topology, so sides with fewer nodes than the widest
//! side (triangles on a wedge) only touch their own nodes.

use smallvec::SmallVec;
use strata_core::{
    CellTopology, ConfigError, Dim, EvalScalar, EvaluatorError, FieldTag, SideRef,
};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

use crate::support::{finite, invalid, required, same_extent, shaped};

/// Default geothermal flux in W/m².
pub const DEFAULT_GEO_FLUX: f64 = 0.05;

/// Velocity scaling of the SUPG term: one over a thousand years in
/// seconds.
pub const SUPG_SCALE: f64 = 1.0 / 3.154e10;

const SIDE_QP: [Dim; 3] = [Dim::Cell, Dim::Side, Dim::QuadPoint];

/// Source of the geothermal flux.
#[derive(Clone, Debug, PartialEq)]
pub enum GeoFlux {
    /// The same flux at every side quadrature point.
    Constant(f64),
    /// A `<Cell,Side,QuadPoint>` field.
    Field(FieldTag),
}

impl Default for GeoFlux {
    fn default() -> Self {
        Self::Constant(DEFAULT_GEO_FLUX)
    }
}

#[derive(Clone, Debug)]
struct Stabilization {
    velocity: FieldTag,
    grad_basis: FieldTag,
    output: FieldTag,
}

/// Boundary heat input on a named side set.
///
/// Zeroes its outputs over the valid cells first, so cells without a
/// basal side get no contribution.
#[derive(Clone, Debug)]
pub struct GeoFluxHeat {
    name: String,
    side_set: String,
    side_nodes: Vec<SmallVec<[usize; 4]>>,
    cell_nodes: usize,
    output: FieldTag,
    basis: FieldTag,
    measure: FieldTag,
    flux: GeoFlux,
    supg: Option<Stabilization>,
    bound: Option<Bound>,
}

#[derive(Clone, Copy, Debug)]
struct Bound {
    output: FieldHandle,
    basis: FieldHandle,
    measure: FieldHandle,
    flux: Option<FieldHandle>,
    supg: Option<SupgBound>,
    sides: usize,
    side_nodes: usize,
    qps: usize,
}

#[derive(Clone, Copy, Debug)]
struct SupgBound {
    velocity: FieldHandle,
    grad_basis: FieldHandle,
    output: FieldHandle,
    velocity_dims: usize,
    grad_dims: usize,
    components: usize,
}

/// Builder for [`GeoFluxHeat`].
///
/// Required: `side_set`, `topology`, `output` `<Cell,Node>`, `basis`
/// `<Cell,Side,Node,QuadPoint>` and `measure` `<Cell,Side,QuadPoint>`. The
/// flux defaults to [`DEFAULT_GEO_FLUX`].
#[derive(Debug, Default)]
pub struct GeoFluxHeatBuilder {
    name: Option<String>,
    side_set: Option<String>,
    topology: Option<CellTopology>,
    output: Option<FieldTag>,
    basis: Option<FieldTag>,
    measure: Option<FieldTag>,
    flux: GeoFlux,
    supg: Option<Stabilization>,
}

impl GeoFluxHeat {
    /// Create a new builder.
    pub fn builder() -> GeoFluxHeatBuilder {
        GeoFluxHeatBuilder::default()
    }

    /// The side set this evaluator integrates over.
    pub fn side_set(&self) -> &str {
        &self.side_set
    }

    /// Whether the SUPG output is produced.
    pub fn is_stabilized(&self) -> bool {
        self.supg.is_some()
    }
}

impl GeoFluxHeatBuilder {
    /// Evaluator name (default `GeoFluxHeat <side set>`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name of the side set.
    pub fn side_set(mut self, name: impl Into<String>) -> Self {
        self.side_set = Some(name.into());
        self
    }

    /// Topology of the parent cells.
    pub fn topology(mut self, topology: CellTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Produced nodal heat input, `<Cell,Node>`.
    pub fn output(mut self, tag: FieldTag) -> Self {
        self.output = Some(tag);
        self
    }

    /// Side basis values, `<Cell,Side,Node,QuadPoint>`.
    pub fn basis(mut self, tag: FieldTag) -> Self {
        self.basis = Some(tag);
        self
    }

    /// Weighted side measure, `<Cell,Side,QuadPoint>`.
    pub fn measure(mut self, tag: FieldTag) -> Self {
        self.measure = Some(tag);
        self
    }

    /// Flux source (default [`DEFAULT_GEO_FLUX`]).
    pub fn flux(mut self, flux: GeoFlux) -> Self {
        self.flux = flux;
        self
    }

    /// Enable the SUPG output from a side velocity `<Cell,Side,QuadPoint,Dim>`
    /// and side basis gradients `<Cell,Side,Node,QuadPoint,Dim>`.
    pub fn supg(mut self, velocity: FieldTag, grad_basis: FieldTag, output: FieldTag) -> Self {
        self.supg = Some(Stabilization {
            velocity,
            grad_basis,
            output,
        });
        self
    }

    /// Build the evaluator and precompute the side node maps.
    pub fn build(self) -> Result<GeoFluxHeat, ConfigError> {
        let side_set = self.side_set.unwrap_or_default();
        let name = self
            .name
            .unwrap_or_else(|| format!("GeoFluxHeat {side_set}"));
        if side_set.is_empty() {
            return Err(invalid(&name, "side_set is required"));
        }
        let topology = required(self.topology, &name, "topology")?;
        let output = required(self.output, &name, "output")?;
        let basis = required(self.basis, &name, "basis")?;
        let measure = required(self.measure, &name, "measure")?;

        shaped(&name, &output, &[Dim::Cell, Dim::Node])?;
        shaped(
            &name,
            &basis,
            &[Dim::Cell, Dim::Side, Dim::Node, Dim::QuadPoint],
        )?;
        shaped(&name, &measure, &SIDE_QP)?;
        match &self.flux {
            GeoFlux::Constant(g) => {
                finite(&name, "flux", *g)?;
            }
            GeoFlux::Field(tag) => shaped(&name, tag, &SIDE_QP)?,
        }
        if let Some(s) = &self.supg {
            shaped(
                &name,
                &s.velocity,
                &[Dim::Cell, Dim::Side, Dim::QuadPoint, Dim::Dim],
            )?;
            shaped(
                &name,
                &s.grad_basis,
                &[Dim::Cell, Dim::Side, Dim::Node, Dim::QuadPoint, Dim::Dim],
            )?;
            shaped(&name, &s.output, &[Dim::Cell, Dim::Node])?;
        }
        if topology.side_count() == 0 {
            return Err(invalid(
                &name,
                format!("topology {} has no sides", topology.name()),
            ));
        }

        let side_nodes = topology
            .side_node_map()
            .iter()
            .map(|nodes| nodes.iter().copied().collect())
            .collect();
        log::debug!(
            "{name}: {} sides of {}, at most {} nodes each",
            topology.side_count(),
            topology.name(),
            topology.max_side_nodes()
        );
        Ok(GeoFluxHeat {
            name,
            side_set,
            side_nodes,
            cell_nodes: topology.node_count(),
            output,
            basis,
            measure,
            flux: self.flux,
            supg: self.supg,
            bound: None,
        })
    }
}

impl GeoFluxHeat {
    fn max_side_nodes(&self) -> usize {
        self.side_nodes.iter().map(SmallVec::len).max().unwrap_or(0)
    }

    fn setup_supg(
        &self,
        bindings: &FieldBindings<'_>,
        s: &Stabilization,
    ) -> Result<SupgBound, ConfigError> {
        same_extent(bindings, Dim::Side, &self.basis, &[&s.velocity, &s.grad_basis])?;
        same_extent(bindings, Dim::Node, &self.basis, &[&s.grad_basis])?;
        same_extent(
            bindings,
            Dim::QuadPoint,
            &self.basis,
            &[&s.velocity, &s.grad_basis],
        )?;
        bindings.expect_extent(&s.output, Dim::Node, self.cell_nodes)?;
        let velocity_dims = bindings.extent(&s.velocity, Dim::Dim)?;
        let grad_dims = bindings.extent(&s.grad_basis, Dim::Dim)?;
        Ok(SupgBound {
            velocity: bindings.bind(&s.velocity)?,
            grad_basis: bindings.bind(&s.grad_basis)?,
            output: bindings.bind(&s.output)?,
            velocity_dims,
            grad_dims,
            components: velocity_dims.min(2).min(grad_dims),
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for GeoFluxHeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        let mut tags = vec![self.basis.clone(), self.measure.clone()];
        if let GeoFlux::Field(tag) = &self.flux {
            tags.push(tag.clone());
        }
        if let Some(s) = &self.supg {
            tags.push(s.velocity.clone());
            tags.push(s.grad_basis.clone());
        }
        tags
    }

    fn produces(&self) -> Vec<FieldTag> {
        let mut tags = vec![self.output.clone()];
        if let Some(s) = &self.supg {
            tags.push(s.output.clone());
        }
        tags
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        bindings.expect_extent(&self.output, Dim::Node, self.cell_nodes)?;
        let flux = match &self.flux {
            GeoFlux::Constant(_) => None,
            GeoFlux::Field(tag) => Some(tag),
        };
        let mut side_qp = vec![&self.measure];
        side_qp.extend(flux);
        let sides = same_extent(bindings, Dim::Side, &self.basis, &side_qp)?;
        let qps = same_extent(bindings, Dim::QuadPoint, &self.basis, &side_qp)?;
        let side_nodes = bindings.extent(&self.basis, Dim::Node)?;
        if sides != self.side_nodes.len() || side_nodes < self.max_side_nodes() {
            return Err(ConfigError::InconsistentLayout {
                evaluator: self.name.clone(),
                field: self.basis.to_string(),
                expected: format!(
                    "{} sides of at most {} nodes",
                    self.side_nodes.len(),
                    self.max_side_nodes()
                ),
                found: format!("{sides} sides of {side_nodes} nodes"),
            });
        }
        let supg = self
            .supg
            .as_ref()
            .map(|s| self.setup_supg(bindings, s))
            .transpose()?;

        self.bound = Some(Bound {
            output: bindings.bind(&self.output)?,
            basis: bindings.bind(&self.basis)?,
            measure: bindings.bind(&self.measure)?,
            flux: bindings.bind_opt(flux)?,
            supg,
            sides,
            side_nodes,
            qps,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let cells = ctx.cell_count();
        let bf = ctx.input(b.basis)?;
        let w = ctx.input(b.measure)?;
        let flux_field = ctx.input_opt(b.flux)?;
        let flux = |sq: usize| match (flux_field, &self.flux) {
            (Some(g), _) => g[sq],
            (None, GeoFlux::Constant(g)) => S::from_f64(*g),
            (None, GeoFlux::Field(_)) => S::zero(),
        };
        let sides = ctx.workset().side_set(&self.side_set);

        let out = ctx.output(b.output)?;
        out.fill(S::zero());
        for &side in sides.unwrap_or_default() {
            let nodes = self.nodes_of(side, cells)?;
            let cs = side.cell * b.sides + side.side;
            for (local, &node) in nodes.iter().enumerate() {
                let mut sum = S::zero();
                for qp in 0..b.qps {
                    let sq = cs * b.qps + qp;
                    sum += flux(sq) * bf[(cs * b.side_nodes + local) * b.qps + qp] * w[sq];
                }
                out[side.cell * self.cell_nodes + node] = sum;
            }
        }

        let Some(s) = b.supg else {
            return Ok(());
        };
        let velocity = ctx.input(s.velocity)?;
        let gbf = ctx.input(s.grad_basis)?;
        let out = ctx.output(s.output)?;
        out.fill(S::zero());
        for &side in sides.unwrap_or_default() {
            let nodes = self.nodes_of(side, cells)?;
            let cs = side.cell * b.sides + side.side;
            for (local, &node) in nodes.iter().enumerate() {
                let mut sum = S::zero();
                for qp in 0..b.qps {
                    let sq = cs * b.qps + qp;
                    let snq = (cs * b.side_nodes + local) * b.qps + qp;
                    for dim in 0..s.components {
                        sum += flux(sq)
                            * velocity[sq * s.velocity_dims + dim]
                            * gbf[snq * s.grad_dims + dim]
                            * w[sq]
                            * SUPG_SCALE;
                    }
                }
                out[side.cell * self.cell_nodes + node] = sum;
            }
        }
        Ok(())
    }
}

impl GeoFluxHeat {
    /// Cell-local nodes of a listed side, checked against the workset.
    fn nodes_of(&self, side: SideRef, cells: usize) -> Result<&[usize], EvaluatorError> {
        if side.cell >= cells {
            return Err(EvaluatorError::ExecutionFailed {
                reason: format!(
                    "side set '{}' lists cell {} of a {cells}-cell workset",
                    self.side_set, side.cell
                ),
            });
        }
        self.side_nodes
            .get(side.side)
            .map(SmallVec::as_slice)
            .ok_or_else(|| EvaluatorError::ExecutionFailed {
                reason: format!(
                    "side set '{}' lists side {} of a {}-sided cell",
                    self.side_set,
                    side.side,
                    self.side_nodes.len()
                ),
            })
    }
}

impl EvaluatorTemplate for GeoFluxHeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}
