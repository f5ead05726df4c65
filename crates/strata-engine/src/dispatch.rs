//! Evaluation-mode dispatch.
//!
//! [`EvaluationModes`] keeps one independent [`FieldManager`] per
//! configured [`ScalarKind`], each built from the same registration list.
//! Residual evaluation runs on `f64`; Jacobian and tangent evaluation run
//! on [`Fad`] in separate managers, so their fields never alias.
//!
//! # Derivative seeding
//!
//! The two derivative modes differ only in what is seeded. Jacobian mode
//! seeds the degrees of freedom: entry `e` of a cell of the `k`-th DOF
//! field gets slot `offset_k + e`, where `offset_k` counts the per-cell
//! entries of the DOF fields declared before it. Tangent mode seeds named
//! parameters, one slot each in declaration order. Everything else enters
//! both modes as a constant.

use indexmap::IndexMap;
use strata_core::{
    ConfigError, EvalScalar, Fad, FieldTag, ScalarKind, StepError, Workset, FAD_CAPACITY,
};
use strata_evaluator::{Evaluator, EvaluatorFactory};

use crate::config::{EngineConfig, SetupError};
use crate::manager::FieldManager;

/// Scalar types a factory can build evaluators for.
pub(crate) trait FactoryScalar: EvalScalar {
    /// Build the instance of `factory` for this scalar type.
    fn build(factory: &dyn EvaluatorFactory) -> Result<Box<dyn Evaluator<Self>>, ConfigError>;
}

impl FactoryScalar for f64 {
    fn build(factory: &dyn EvaluatorFactory) -> Result<Box<dyn Evaluator<f64>>, ConfigError> {
        factory.build_residual()
    }
}

impl FactoryScalar for Fad {
    fn build(factory: &dyn EvaluatorFactory) -> Result<Box<dyn Evaluator<Fad>>, ConfigError> {
        factory.build_derivative()
    }
}

/// Build `factory`'s instance for `manager`'s scalar type, if the manager
/// exists.
fn instance_for<S: FactoryScalar>(
    manager: &Option<FieldManager<S>>,
    factory: &dyn EvaluatorFactory,
) -> Result<Option<Box<dyn Evaluator<S>>>, ConfigError> {
    manager.as_ref().map(|_| S::build(factory)).transpose()
}

/// Seed `values` as independent variables, entry `i` in slot `slot(i)`.
fn seeded(
    tag: &FieldTag,
    values: &[f64],
    slot: impl Fn(usize) -> usize,
) -> Result<Vec<Fad>, StepError> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            Fad::try_variable(v, slot(i)).ok_or_else(|| StepError::DerivativeSlot {
                field: tag.to_string(),
                slot: slot(i),
                capacity: FAD_CAPACITY,
            })
        })
        .collect()
}

/// One field manager per requested scalar kind.
pub struct EvaluationModes {
    kinds: Vec<ScalarKind>,
    residual: Option<FieldManager<f64>>,
    jacobian: Option<FieldManager<Fad>>,
    tangent: Option<FieldManager<Fad>>,
    /// DOF fields with the first local slot of each.
    dofs: Vec<(FieldTag, usize)>,
    /// Parameter name to field; the slot is the index.
    parameters: IndexMap<String, FieldTag>,
    generation: u64,
    setup_generation: Option<u64>,
}

impl EvaluationModes {
    /// Validate `config` and register its evaluators with a manager per
    /// requested kind.
    ///
    /// Call [`post_registration_setup()`](Self::post_registration_setup)
    /// before evaluating.
    pub fn new(config: EngineConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let batch = config.max_batch_size;
        let has = |k: ScalarKind| config.kinds.contains(&k);
        let mut modes = Self {
            kinds: config.kinds.clone(),
            residual: has(ScalarKind::Residual)
                .then(|| FieldManager::new(ScalarKind::Residual, batch)),
            jacobian: has(ScalarKind::Jacobian)
                .then(|| FieldManager::new(ScalarKind::Jacobian, batch)),
            tangent: has(ScalarKind::Tangent).then(|| FieldManager::new(ScalarKind::Tangent, batch)),
            dofs: Vec::with_capacity(config.dofs.len()),
            parameters: IndexMap::with_capacity(config.parameters.len()),
            generation: 0,
            setup_generation: None,
        };
        for tag in config.roots {
            modes.declare_root(tag);
        }
        let mut offset = 0;
        for tag in config.dofs {
            modes.declare_root(tag.clone());
            let per_cell = tag.layout().per_cell();
            modes.dofs.push((tag, offset));
            offset += per_cell;
        }
        for (name, tag) in config.parameters {
            modes.declare_root(tag.clone());
            modes.parameters.insert(name, tag);
        }
        for tag in config.required {
            modes.require_field(tag);
        }
        for factory in &config.evaluators {
            modes.register(factory.as_ref())?;
        }
        Ok(modes)
    }

    /// Requested kinds, in configuration order.
    pub fn kinds(&self) -> &[ScalarKind] {
        &self.kinds
    }

    /// Whether a manager exists for `kind`.
    pub fn is_active(&self, kind: ScalarKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Registration generation. Bumped by every registration change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether setup has completed for the current generation.
    pub fn is_ready(&self) -> bool {
        self.setup_generation == Some(self.generation)
    }

    /// Total graph builds over all managers.
    pub fn graph_builds(&self) -> u64 {
        self.residual.as_ref().map_or(0, FieldManager::graph_builds)
            + self.jacobian.as_ref().map_or(0, FieldManager::graph_builds)
            + self.tangent.as_ref().map_or(0, FieldManager::graph_builds)
    }

    /// Tangent-mode derivative slot of a parameter.
    pub fn parameter_slot(&self, name: &str) -> Option<usize> {
        self.parameters.get_index_of(name)
    }

    /// Jacobian-mode derivative slot of entry `entry` of a cell of a DOF
    /// field.
    pub fn dof_slot(&self, tag: &FieldTag, entry: usize) -> Option<usize> {
        self.dofs
            .iter()
            .find(|(t, _)| t == tag)
            .filter(|(t, _)| entry < t.layout().per_cell())
            .map(|&(_, offset)| offset + entry)
    }

    // ── Registration ───────────────────────────────────────────────

    /// Build `factory` for every active kind and register the instances.
    ///
    /// Every instance is built before any is registered, so a factory that
    /// fails for one kind leaves all managers unchanged.
    pub fn register(&mut self, factory: &dyn EvaluatorFactory) -> Result<(), SetupError> {
        let residual = instance_for(&self.residual, factory)?;
        let jacobian = instance_for(&self.jacobian, factory)?;
        let tangent = instance_for(&self.tangent, factory)?;
        if let (Some(m), Some(e)) = (self.residual.as_mut(), residual) {
            m.register_evaluator(e);
        }
        if let (Some(m), Some(e)) = (self.jacobian.as_mut(), jacobian) {
            m.register_evaluator(e);
        }
        if let (Some(m), Some(e)) = (self.tangent.as_mut(), tangent) {
            m.register_evaluator(e);
        }
        self.generation += 1;
        Ok(())
    }

    /// Declare an external root in every active manager.
    pub fn declare_root(&mut self, tag: FieldTag) {
        if let Some(m) = self.residual.as_mut() {
            m.declare_root(tag.clone());
        }
        if let Some(m) = self.jacobian.as_mut() {
            m.declare_root(tag.clone());
        }
        if let Some(m) = self.tangent.as_mut() {
            m.declare_root(tag);
        }
        self.generation += 1;
    }

    /// Request an output field in every active manager.
    pub fn require_field(&mut self, tag: FieldTag) {
        if let Some(m) = self.residual.as_mut() {
            m.require_field(tag.clone());
        }
        if let Some(m) = self.jacobian.as_mut() {
            m.require_field(tag.clone());
        }
        if let Some(m) = self.tangent.as_mut() {
            m.require_field(tag);
        }
        self.generation += 1;
    }

    /// Set up every active manager, unless already done for the current
    /// generation.
    pub fn post_registration_setup(&mut self) -> Result<(), SetupError> {
        if self.is_ready() {
            return Ok(());
        }
        if let Some(m) = self.residual.as_mut() {
            m.post_registration_setup()?;
        }
        if let Some(m) = self.jacobian.as_mut() {
            m.post_registration_setup()?;
        }
        if let Some(m) = self.tangent.as_mut() {
            m.post_registration_setup()?;
        }
        self.setup_generation = Some(self.generation);
        log::info!(
            "evaluation modes ready at generation {}: {:?}",
            self.generation,
            self.kinds
        );
        Ok(())
    }

    // ── Managers ───────────────────────────────────────────────────

    /// The residual (`f64`) manager.
    pub fn residual(&self) -> Result<&FieldManager<f64>, StepError> {
        self.residual
            .as_ref()
            .ok_or(StepError::KindNotActive(ScalarKind::Residual))
    }

    /// The residual (`f64`) manager, mutably.
    pub fn residual_mut(&mut self) -> Result<&mut FieldManager<f64>, StepError> {
        self.residual
            .as_mut()
            .ok_or(StepError::KindNotActive(ScalarKind::Residual))
    }

    /// The Jacobian manager.
    pub fn jacobian(&self) -> Result<&FieldManager<Fad>, StepError> {
        self.jacobian
            .as_ref()
            .ok_or(StepError::KindNotActive(ScalarKind::Jacobian))
    }

    /// The Jacobian manager, mutably.
    pub fn jacobian_mut(&mut self) -> Result<&mut FieldManager<Fad>, StepError> {
        self.jacobian
            .as_mut()
            .ok_or(StepError::KindNotActive(ScalarKind::Jacobian))
    }

    /// The tangent manager.
    pub fn tangent(&self) -> Result<&FieldManager<Fad>, StepError> {
        self.tangent
            .as_ref()
            .ok_or(StepError::KindNotActive(ScalarKind::Tangent))
    }

    /// The tangent manager, mutably.
    pub fn tangent_mut(&mut self) -> Result<&mut FieldManager<Fad>, StepError> {
        self.tangent
            .as_mut()
            .ok_or(StepError::KindNotActive(ScalarKind::Tangent))
    }

    // ── Evaluation ─────────────────────────────────────────────────

    /// Copy plain values into a root of every active manager. Derivative
    /// managers receive constants (zero derivatives).
    pub fn set_root_values(&mut self, tag: &FieldTag, values: &[f64]) -> Result<(), StepError> {
        if let Some(m) = self.residual.as_mut() {
            m.set_root(tag, values)?;
        }
        if self.jacobian.is_some() || self.tangent.is_some() {
            let constants: Vec<Fad> = values.iter().map(|&v| Fad::constant(v)).collect();
            if let Some(m) = self.jacobian.as_mut() {
                m.set_root(tag, &constants)?;
            }
            if let Some(m) = self.tangent.as_mut() {
                m.set_root(tag, &constants)?;
            }
        }
        Ok(())
    }

    /// Set the values of a degree-of-freedom field in every active
    /// manager. Jacobian mode seeds each entry in its local slot (see
    /// [`dof_slot()`](Self::dof_slot)); tangent mode receives constants.
    pub fn set_dof_values(&mut self, tag: &FieldTag, values: &[f64]) -> Result<(), StepError> {
        let offset = self
            .dofs
            .iter()
            .find(|(t, _)| t == tag)
            .map(|&(_, offset)| offset)
            .ok_or_else(|| StepError::UnknownDof {
                field: tag.to_string(),
            })?;
        let per_cell = tag.layout().per_cell().max(1);
        if let Some(m) = self.residual.as_mut() {
            m.set_root(tag, values)?;
        }
        if let Some(m) = self.jacobian.as_mut() {
            m.set_root(tag, &seeded(tag, values, |i| offset + i % per_cell)?)?;
        }
        if let Some(m) = self.tangent.as_mut() {
            let constants: Vec<Fad> = values.iter().map(|&v| Fad::constant(v)).collect();
            m.set_root(tag, &constants)?;
        }
        Ok(())
    }

    /// Fill the field of a named parameter with `value` in every active
    /// manager. Tangent mode seeds it in the parameter's slot (see
    /// [`parameter_slot()`](Self::parameter_slot)); Jacobian mode receives
    /// a constant.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), StepError> {
        let (slot, _, tag) =
            self.parameters
                .get_full(name)
                .ok_or_else(|| StepError::UnknownParameter {
                    name: name.to_string(),
                })?;
        let tag = tag.clone();
        if let Some(m) = self.residual.as_mut() {
            m.root_mut(&tag)?.fill(value);
        }
        if let Some(m) = self.jacobian.as_mut() {
            m.root_mut(&tag)?.fill(Fad::constant(value));
        }
        if let Some(m) = self.tangent.as_mut() {
            let seed = Fad::try_variable(value, slot).ok_or_else(|| StepError::DerivativeSlot {
                field: tag.to_string(),
                slot,
                capacity: FAD_CAPACITY,
            })?;
            m.root_mut(&tag)?.fill(seed);
        }
        log::debug!("parameter '{name}' = {value} (tangent slot {slot})");
        Ok(())
    }

    /// Evaluate `workset` in the manager of `kind`.
    pub fn evaluate(&mut self, kind: ScalarKind, workset: &Workset<'_>) -> Result<(), StepError> {
        match kind {
            ScalarKind::Residual => self.residual_mut()?.evaluate_fields(workset),
            ScalarKind::Jacobian => self.jacobian_mut()?.evaluate_fields(workset),
            ScalarKind::Tangent => self.tangent_mut()?.evaluate_fields(workset),
        }
    }
}
