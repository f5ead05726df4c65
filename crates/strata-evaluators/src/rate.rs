//! Time rates at the quadrature points.
//!
//! [`TemperatureRate`] is the backward-difference rate of the temperature,
//! reading the previous step's values from the workset's state arrays.
//! A workset reporting a step size of exactly zero divides by
//! [`MIN_STEP_SIZE`](strata_core::MIN_STEP_SIZE) instead, which keeps the
//! rate finite. [`EnergyRate`] turns that rate into a stored-energy rate.

use strata_core::{ConfigError, Dim, EvalScalar, EvaluatorError, FieldTag, OLD_SUFFIX};
use strata_evaluator::{EvalContext, Evaluator, EvaluatorTemplate, FieldBindings, FieldHandle};

use crate::support::{invalid, required, same_extent, shaped};

// ── TemperatureRate ────────────────────────────────────────────────

/// `Ṫ(c,q) = (T(c,q) - T_old(c,q)) / dt`.
#[derive(Clone, Debug)]
pub struct TemperatureRate {
    name: String,
    temperature: FieldTag,
    old_state: String,
    rate: FieldTag,
    bound: Option<(FieldHandle, FieldHandle)>,
}

/// Builder for [`TemperatureRate`].
#[derive(Debug, Default)]
pub struct TemperatureRateBuilder {
    name: Option<String>,
    temperature: Option<FieldTag>,
    old_state: Option<String>,
    rate: Option<FieldTag>,
}

impl TemperatureRate {
    /// Create a new builder.
    pub fn builder() -> TemperatureRateBuilder {
        TemperatureRateBuilder::default()
    }

    /// Name of the state array holding the previous temperature.
    pub fn old_state(&self) -> &str {
        &self.old_state
    }
}

impl TemperatureRateBuilder {
    /// Evaluator name (default `TemperatureRate`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Current temperature, `<Cell,QuadPoint>`.
    pub fn temperature(mut self, tag: FieldTag) -> Self {
        self.temperature = Some(tag);
        self
    }

    /// State array with the previous step's temperature (default: the
    /// temperature's name with the `_old` suffix).
    pub fn old_state(mut self, name: impl Into<String>) -> Self {
        self.old_state = Some(name.into());
        self
    }

    /// Produced rate, `<Cell,QuadPoint>`.
    pub fn rate(mut self, tag: FieldTag) -> Self {
        self.rate = Some(tag);
        self
    }

    /// Build the evaluator.
    pub fn build(self) -> Result<TemperatureRate, ConfigError> {
        let name = self.name.unwrap_or_else(|| "TemperatureRate".to_string());
        let temperature = required(self.temperature, &name, "temperature")?;
        let rate = required(self.rate, &name, "rate")?;
        shaped(&name, &temperature, &[Dim::Cell, Dim::QuadPoint])?;
        shaped(&name, &rate, &[Dim::Cell, Dim::QuadPoint])?;
        let old_state = self
            .old_state
            .unwrap_or_else(|| format!("{}{OLD_SUFFIX}", temperature.name()));
        if old_state.is_empty() {
            return Err(invalid(&name, "old_state must not be empty"));
        }
        Ok(TemperatureRate {
            name,
            temperature,
            old_state,
            rate,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for TemperatureRate {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![self.temperature.clone()]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.rate.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        same_extent(bindings, Dim::QuadPoint, &self.temperature, &[&self.rate])?;
        self.bound = Some((
            bindings.bind(&self.temperature)?,
            bindings.bind(&self.rate)?,
        ));
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let (temperature, rate) = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let workset = ctx.workset();
        let dt = workset.effective_step_size();
        let old = workset
            .state()
            .get(&self.old_state)
            .ok_or_else(|| EvaluatorError::MissingState {
                name: self.old_state.clone(),
            })?;
        let t = ctx.input(temperature)?;
        let out = ctx.output(rate)?;
        if old.len() < out.len() {
            return Err(EvaluatorError::ExecutionFailed {
                reason: format!(
                    "state array '{}' has {} entries, {} needed",
                    self.old_state,
                    old.len(),
                    out.len()
                ),
            });
        }
        for ((r, &now), &before) in out.iter_mut().zip(t).zip(old) {
            *r = (now - before) / dt;
        }
        Ok(())
    }
}

impl EvaluatorTemplate for TemperatureRate {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}

// ── EnergyRate ─────────────────────────────────────────────────────

/// `ė(c,q) = ρc_p(c,q) Ṫ(c,q)`.
#[derive(Clone, Debug)]
pub struct EnergyRate {
    name: String,
    heat_capacity: FieldTag,
    temperature_rate: FieldTag,
    energy_rate: FieldTag,
    bound: Option<[FieldHandle; 3]>,
}

/// Builder for [`EnergyRate`].
#[derive(Debug, Default)]
pub struct EnergyRateBuilder {
    name: Option<String>,
    heat_capacity: Option<FieldTag>,
    temperature_rate: Option<FieldTag>,
    energy_rate: Option<FieldTag>,
}

impl EnergyRate {
    /// Create a new builder.
    pub fn builder() -> EnergyRateBuilder {
        EnergyRateBuilder::default()
    }
}

impl EnergyRateBuilder {
    /// Evaluator name (default `EnergyRate`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Volumetric heat capacity `ρc_p`, `<Cell,QuadPoint>`.
    pub fn heat_capacity(mut self, tag: FieldTag) -> Self {
        self.heat_capacity = Some(tag);
        self
    }

    /// Temperature rate, `<Cell,QuadPoint>`.
    pub fn temperature_rate(mut self, tag: FieldTag) -> Self {
        self.temperature_rate = Some(tag);
        self
    }

    /// Produced energy rate, `<Cell,QuadPoint>`.
    pub fn energy_rate(mut self, tag: FieldTag) -> Self {
        self.energy_rate = Some(tag);
        self
    }

    /// Build the evaluator.
    pub fn build(self) -> Result<EnergyRate, ConfigError> {
        let name = self.name.unwrap_or_else(|| "EnergyRate".to_string());
        let heat_capacity = required(self.heat_capacity, &name, "heat_capacity")?;
        let temperature_rate = required(self.temperature_rate, &name, "temperature_rate")?;
        let energy_rate = required(self.energy_rate, &name, "energy_rate")?;
        for tag in [&heat_capacity, &temperature_rate, &energy_rate] {
            shaped(&name, tag, &[Dim::Cell, Dim::QuadPoint])?;
        }
        Ok(EnergyRate {
            name,
            heat_capacity,
            temperature_rate,
            energy_rate,
            bound: None,
        })
    }
}

impl<S: EvalScalar> Evaluator<S> for EnergyRate {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![self.heat_capacity.clone(), self.temperature_rate.clone()]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![self.energy_rate.clone()]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        same_extent(
            bindings,
            Dim::QuadPoint,
            &self.energy_rate,
            &[&self.heat_capacity, &self.temperature_rate],
        )?;
        self.bound = Some([
            bindings.bind(&self.heat_capacity)?,
            bindings.bind(&self.temperature_rate)?,
            bindings.bind(&self.energy_rate)?,
        ]);
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let [rho_cp, t_dot, e_dot] = self.bound.ok_or(EvaluatorError::NotSetUp)?;
        let rho_cp = ctx.input(rho_cp)?;
        let t_dot = ctx.input(t_dot)?;
        for ((e, &c), &r) in ctx.output(e_dot)?.iter_mut().zip(rho_cp).zip(t_dot) {
            *e = c * r;
        }
        Ok(())
    }
}

impl EvaluatorTemplate for EnergyRate {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate<S: EvalScalar>(&self) -> Result<Box<dyn Evaluator<S>>, ConfigError> {
        Ok(Box::new(self.clone()))
    }
}
