//! Material properties at the quadrature points.
//!
//! Both evaluators produce isotropic `<Cell,QuadPoint,Dim,Dim>` tensors:
//! the diagonal holds the property and every off-diagonal entry is zero.

use strata_core::{ConfigError, Dim, EvalScalar, EvaluatorError, FieldTag};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

use crate::support::{finite, invalid, required, same_extent, shaped};

/// Ideal gas constant in J/(mol K).
pub const GAS_CONSTANT: f64 = 8.314;

const QP_TENSOR: [Dim; 4] = [Dim::Cell, Dim::QuadPoint, Dim::Dim, Dim::Dim];

/// Spatial dimension of a `<Cell,QuadPoint,Dim,Dim>` field whose two `Dim`
/// extents must agree.
fn square_dims(bindings: &FieldBindings<'_>, tag: &FieldTag) -> Result<usize, ConfigError> {
    let rows = bindings.nth_extent(tag, Dim::Dim, 0)?;
    let cols = bindings.nth_extent(tag, Dim::Dim, 1)?;
    if rows != cols {
        return Err(ConfigError::InconsistentLayout {
            evaluator: bindings.evaluator().to_string(),
            field: tag.to_string(),
            expected: format!("square tensor of extent {rows}"),
            found: format!("{rows}x{cols}"),
        });
    }
    Ok(rows)
}

/// Write `value(c,q)` on the diagonal of every valid tensor.
fn fill_isotropic<S: EvalScalar>(out: &mut [S], dims: usize, value: impl Fn(usize) -> S) {
    let block = dims * dims;
    if block == 0 {
        return;
    }
    for (cq, tensor) in out.chunks_exact_mut(block).enumerate() {
        tensor.fill(S::zero());
        let v = value(cq);
        for i in 0..dims {
            tensor[i * dims + i] = v;
        }
    }
}

// ── DiffusionCoefficient ───────────────────────────────────────────

/// A material constant given either as a number or as a
/// `<Cell,QuadPoint>` field.
///
/// `F` is the field representation: a tag while building, a handle once
/// bound and a slice while evaluating.
#[derive(Clone, Copy, Debug)]
enum Coefficient<F> {
    Value(f64),
    Field(F),
}

impl Coefficient<FieldTag> {
    fn tag(&self) -> Option<&FieldTag> {
        match self {
            Self::Value(_) => None,
            Self::Field(tag) => Some(tag),
        }
    }

    fn bind(&self, bindings: &FieldBindings<'_>) -> Result<Coefficient<FieldHandle>, ConfigError> {
        Ok(match self {
            Self::Value(v) => Coefficient::Value(*v),
            Self::Field(tag) => Coefficient::Field(bindings.bind(tag)?),
        })
    }
}

impl Coefficient<FieldHandle> {
    fn read<'a, S: EvalScalar>(
        self,
        ctx: &EvalContext<'a, S>,
    ) -> Result<Coefficient<&'a [S]>, EvaluatorError> {
        Ok(match self {
            Self::Value(v) => Coefficient::Value(v),
            Self::Field(h) => Coefficient::Field(ctx.input(h)?),
        })
    }
}

impl<S: EvalScalar> Coefficient<&[S]> {
    fn at(&self, cq: usize) -> S {
        match self {
            Self::Value(v) => S::from_f64(*v),
            Self::Field(f) => f[cq],
        }
    }
}

/// Check a numeric coefficient at build time. Field coefficients are
/// taken as given.
fn check_value(
    evaluator: &str,
    what: &str,
    c: &Coefficient<FieldTag>,
    valid: impl Fn(f64) -> bool,
    requirement: &str,
) -> Result<(), ConfigError> {
    match c {
        Coefficient::Value(v) => {
            let v = finite(evaluator, what, *v)?;
            if valid(v) {
                Ok(())
            } else {
                Err(invalid(evaluator, format!("{what} must be {requirement}, got {v}")))
            }
        }
        Coefficient::Field(tag) => shaped(evaluator, tag, &[Dim::Cell, Dim::QuadPoint]),
    }
}

/// Arrhenius diffusivity, `D(c,q,i,j) = δ_ij D_pre exp(−Q/(R T))`.
///
/// `D_pre`, `Q` and `R` are numbers or `<Cell,QuadPoint>` fields. A field
/// coefficient is an ordinary input, so it carries derivatives when it is
/// seeded as a parameter.
#[derive(Clone, Debug)]
pub struct DiffusionCoefficient {
    name: String,
    temperature: FieldTag,
    output: FieldTag,
    prefactor: Coefficient<FieldTag>,
    activation_energy: Coefficient<FieldTag>,
    gas_constant: Coefficient<FieldTag>,
    bound: Option<ArrheniusBound>,
}

#[derive(Clone, Copy, Debug)]
struct ArrheniusBound {
    temperature: FieldHandle,
    output: FieldHandle,
    prefactor: Coefficient<FieldHandle>,
    activation_energy: Coefficient<FieldHandle>,
    gas_constant: Coefficient<FieldHandle>,
    dims: usize,
}

/// Builder for [`DiffusionCoefficient`].
///
/// Required: `temperature`, `output`, and the prefactor and activation
/// energy (as values or fields). The gas constant defaults to
/// [`GAS_CONSTANT`].
#[derive(Debug)]
pub struct DiffusionCoefficientBuilder {
    name: Option<String>,
    temperature: Option<FieldTag>,
    output: Option<FieldTag>,
    prefactor: Option<Coefficient<FieldTag>>,
    activation_energy: Option<Coefficient<FieldTag>>,
    gas_constant: Coefficient<FieldTag>,
}

impl DiffusionCoefficient {
    /// Create a new builder.
    pub fn builder() -> DiffusionCoefficientBuilder {
        DiffusionCoefficientBuilder {
            name: None,
            temperature: None,
            output: None,
            prefactor: None,
            activation_energy: None,
            gas_constant: Coefficient::Value(GAS_CONSTANT),
        }
    }

    fn coefficient_fields(&self) -> impl Iterator<Item = &FieldTag> {
        [&self.prefactor, &self.activation_energy, &self.gas_constant]
            .into_iter()
            .filter_map(Coefficient::tag)
    }
}

impl DiffusionCoefficientBuilder {
    /// Evaluator name (default `DiffusionCoefficient`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Temperature, `<Cell,QuadPoint>`.
    pub fn temperature(mut self, tag: FieldTag) -> Self {
        self.temperature = Some(tag);
        self
    }

    /// Produced diffusivity tensor, `<Cell,QuadPoint,Dim,Dim>`.
    pub fn output(mut self, tag: FieldTag) -> Self {
        self.output = Some(tag);
        self
    }

    /// Pre-exponential factor `D_pre`. Must be finite and >= 0.
    pub fn prefactor(mut self, d_pre: f64) -> Self {
        self.prefactor = Some(Coefficient::Value(d_pre));
        self
    }

    /// Read `D_pre` from a `<Cell,QuadPoint>` field.
    pub fn prefactor_field(mut self, tag: FieldTag) -> Self {
        self.prefactor = Some(Coefficient::Field(tag));
        self
    }

    /// Activation energy `Q`. Must be finite.
    pub fn activation_energy(mut self, q: f64) -> Self {
        self.activation_energy = Some(Coefficient::Value(q));
        self
    }

    /// Read `Q` from a `<Cell,QuadPoint>` field.
    pub fn activation_energy_field(mut self, tag: FieldTag) -> Self {
        self.activation_energy = Some(Coefficient::Field(tag));
        self
    }

    /// Gas constant `R`. Must be finite and > 0.
    pub fn gas_constant(mut self, r: f64) -> Self {
        self.gas_constant = Coefficient::Value(r);
        self
    }

    /// Read `R` from a `<Cell,QuadPoint>` field.
    pub fn gas_constant_field(mut self, tag: FieldTag) -> Self {
        self.gas_constant = Coefficient::Field(tag);
        self
    }

    /// Build the evaluator.
    pub fn build(self) -> Result<DiffusionCoefficient, ConfigError> {
        let name = self
            .name
            .unwrap_or_else(|| "DiffusionCoefficient".to_string());
        let temperature = required(self.temperature, &name, "temperature")?;
        let output = required(self.output, &name, "output")?;
        let prefactor = required(self.prefactor, &name, "prefactor")?;
        let activation_energy = required(self.activation_energy, &name, "activation_energy")?;
        let gas_constant = self.gas_constant;
        check_value(&name, "prefactor", &prefactor, |v| v >= 0.0, ">= 0")?;
        check_value(&name, "activation_energy", &activation_energy, |_| true, "finite")?;
        check_value(&name, "gas_constant", &gas_constant, |v| v > 0.0, "> 0")?;
        shaped(&name, &temperature, &[Dim::Cell, Dim::QuadPoint])?;
        shaped(&name, &output, &QP_TENSOR)?;
        Ok(DiffusionCoefficient {
            name,
            temperature,
            output,
            prefactor,
            activation_energy,
            gas_constant,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for DiffusionCoefficient {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        std::iter::once(&self.temperature)
            .chain(self.coefficient_fields())
            .cloned()
            .collect()
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.output.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        let mut inputs = vec![&self.temperature];
        inputs.extend(self.coefficient_fields());
        same_extent(bindings, Dim::QuadPoint, &self.output, &inputs)?;
        let dims = square_dims(bindings, &self.output)?;
        self.bound = Some(ArrheniusBound {
            temperature: bindings.bind(&self.temperature)?,
            output: bindings.bind(&self.output)?,
            prefactor: self.prefactor.bind(bindings)?,
            activation_energy: self.activation_energy.bind(bindings)?,
            gas_constant: self.gas_constant.bind(bindings)?,
            dims,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let t = ctx.input(b.temperature)?;
        let d_pre = b.prefactor.read(ctx)?;
        let q = b.activation_energy.read(ctx)?;
        let r = b.gas_constant.read(ctx)?;
        fill_isotropic(ctx.output(b.output)?, b.dims, |cq| {
            (-q.at(cq) / (r.at(cq) * t[cq])).exp() * d_pre.at(cq)
        });
        Ok(())
    }
}

impl EvaluatorTemplate for DiffusionCoefficient {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}

// ── MixtureSpecificHeat ────────────────────────────────────────────

/// Volumetric heat capacity of a porous mixture:
/// `c(c,q,i,j) = δ_ij [φ γ_f ρ_f + (1−φ) γ_s ρ_s]`.
#[derive(Clone, Debug)]
pub struct MixtureSpecificHeat {
    name: String,
    porosity: FieldTag,
    solid_heat: FieldTag,
    fluid_heat: FieldTag,
    solid_density: FieldTag,
    fluid_density: FieldTag,
    output: FieldTag,
    bound: Option<MixtureBound>,
}

#[derive(Clone, Copy, Debug)]
struct MixtureBound {
    inputs: [FieldHandle; 5],
    output: FieldHandle,
    dims: usize,
}

/// Builder for [`MixtureSpecificHeat`]. Every field is required.
#[derive(Debug, Default)]
pub struct MixtureSpecificHeatBuilder {
    name: Option<String>,
    porosity: Option<FieldTag>,
    solid_heat: Option<FieldTag>,
    fluid_heat: Option<FieldTag>,
    solid_density: Option<FieldTag>,
    fluid_density: Option<FieldTag>,
    output: Option<FieldTag>,
}

impl MixtureSpecificHeat {
    /// Create a new builder.
    pub fn builder() -> MixtureSpecificHeatBuilder {
        MixtureSpecificHeatBuilder::default()
    }

    fn inputs(&self) -> [&FieldTag; 5] {
        [
            &self.porosity,
            &self.solid_heat,
            &self.fluid_heat,
            &self.solid_density,
            &self.fluid_density,
        ]
    }
}

impl MixtureSpecificHeatBuilder {
    /// Evaluator name (default `MixtureSpecificHeat`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Porosity `φ`, `<Cell,QuadPoint>`.
    pub fn porosity(mut self, tag: FieldTag) -> Self {
        self.porosity = Some(tag);
        self
    }

    /// Specific heat of the solid `γ_s`, `<Cell,QuadPoint>`.
    pub fn solid_heat(mut self, tag: FieldTag) -> Self {
        self.solid_heat = Some(tag);
        self
    }

    /// Specific heat of the fluid `γ_f`, `<Cell,QuadPoint>`.
    pub fn fluid_heat(mut self, tag: FieldTag) -> Self {
        self.fluid_heat = Some(tag);
        self
    }

    /// Density of the solid `ρ_s`, `<Cell,QuadPoint>`.
    pub fn solid_density(mut self, tag: FieldTag) -> Self {
        self.solid_density = Some(tag);
        self
    }

    /// Density of the fluid `ρ_f`, `<Cell,QuadPoint>`.
    pub fn fluid_density(mut self, tag: FieldTag) -> Self {
        self.fluid_density = Some(tag);
        self
    }

    /// Produced heat capacity tensor, `<Cell,QuadPoint,Dim,Dim>`.
    pub fn output(mut self, tag: FieldTag) -> Self {
        self.output = Some(tag);
        self
    }

    /// Build the evaluator.
    pub fn build(self) -> Result<MixtureSpecificHeat, ConfigError> {
        let name = self
            .name
            .unwrap_or_else(|| "MixtureSpecificHeat".to_string());
        let e = MixtureSpecificHeat {
            porosity: required(self.porosity, &name, "porosity")?,
            solid_heat: required(self.solid_heat, &name, "solid_heat")?,
            fluid_heat: required(self.fluid_heat, &name, "fluid_heat")?,
            solid_density: required(self.solid_density, &name, "solid_density")?,
            fluid_density: required(self.fluid_density, &name, "fluid_density")?,
            output: required(self.output, &name, "output")?,
            name,
            bound: None,
        };
        for tag in e.inputs() {
            shaped(&e.name, tag, &[Dim::Cell, Dim::QuadPoint])?;
        }
        shaped(&e.name, &e.output, &QP_TENSOR)?;
        Ok(e)
    }
}

impl<S: EvalScalar> Evaluator<S> for MixtureSpecificHeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        self.inputs().into_iter().cloned().collect()
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.output.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        same_extent(bindings, Dim::QuadPoint, &self.output, &self.inputs())?;
        let dims = square_dims(bindings, &self.output)?;
        let [phi, gs, gf, rs, rf] = self.inputs();
        self.bound = Some(MixtureBound {
            inputs: [
                bindings.bind(phi)?,
                bindings.bind(gs)?,
                bindings.bind(gf)?,
                bindings.bind(rs)?,
                bindings.bind(rf)?,
            ],
            output: bindings.bind(&self.output)?,
            dims,
        });
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let b = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let [phi, gamma_s, gamma_f, rho_s, rho_f] = b.inputs;
        let phi = ctx.input(phi)?;
        let gamma_s = ctx.input(gamma_s)?;
        let gamma_f = ctx.input(gamma_f)?;
        let rho_s = ctx.input(rho_s)?;
        let rho_f = ctx.input(rho_f)?;
        fill_isotropic(ctx.output(b.output)?, b.dims, |cq| {
            phi[cq] * gamma_f[cq] * rho_f[cq]
                + (S::one() - phi[cq]) * gamma_s[cq] * rho_s[cq]
        });
        Ok(())
    }
}

impl EvaluatorTemplate for MixtureSpecificHeat {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}
