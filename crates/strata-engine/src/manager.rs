//! Field manager: the per-kind evaluation loop.
//!
//! [`FieldManager`] owns the evaluators registered for one scalar kind,
//! the compiled [`EvaluationPlan`] and the field storage. The plan is
//! cached until registration changes, so repeated setup calls and mode
//! switches never rebuild the graph.
//!
//! # Evaluation
//!
//! Each `evaluate_fields()` call runs the scheduled evaluators once, in
//! topological order. Before an evaluator runs its declared outputs are
//! moved out of storage into a write set; after it returns they are moved
//! back, whether it succeeded or not. A failing evaluator abandons the
//! batch and leaves the manager usable for the next one.

use std::error::Error;
use std::fmt;
use std::time::Instant;

use strata_core::{
    EvalScalar, FieldId, FieldRegistry, FieldTag, ScalarKind, StateError, StateStore, StepError,
    Workset,
};
use strata_evaluator::{
    build_graph, EvalContext, EvaluationPlan, Evaluator, FieldBindings, ScratchRegion,
};

use crate::config::{check_batch_extent, SetupError};
use crate::metrics::EvalMetrics;
use crate::storage::FieldStorage;

// ── ExportError ────────────────────────────────────────────────────

/// Error returned from [`FieldManager::export_state()`].
#[derive(Debug, PartialEq, Eq)]
pub enum ExportError {
    /// The field could not be read.
    Field(StepError),
    /// The state store rejected the values.
    State(StateError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(e) => write!(f, "field: {e}"),
            Self::State(e) => write!(f, "state: {e}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Field(e) => Some(e),
            Self::State(e) => Some(e),
        }
    }
}

impl From<StepError> for ExportError {
    fn from(e: StepError) -> Self {
        Self::Field(e)
    }
}

impl From<StateError> for ExportError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

// ── FieldManager ───────────────────────────────────────────────────

/// Owns the evaluators, plan and storage of one evaluation mode.
pub struct FieldManager<S: EvalScalar> {
    kind: ScalarKind,
    max_batch: usize,
    evaluators: Vec<Box<dyn Evaluator<S>>>,
    roots: Vec<FieldTag>,
    required: Vec<FieldTag>,
    plan: Option<EvaluationPlan>,
    storage: FieldStorage<S>,
    scratch: ScratchRegion<S>,
    scratch_len: usize,
    ready: bool,
    graph_builds: u64,
    last_metrics: EvalMetrics,
}

impl<S: EvalScalar> FieldManager<S> {
    /// Create an empty manager for worksets of at most `max_batch` cells.
    pub fn new(kind: ScalarKind, max_batch: usize) -> Self {
        Self {
            kind,
            max_batch,
            evaluators: Vec::new(),
            roots: Vec::new(),
            required: Vec::new(),
            plan: None,
            storage: FieldStorage::allocate(&FieldRegistry::new()),
            scratch: ScratchRegion::new(0),
            scratch_len: 0,
            ready: false,
            graph_builds: 0,
            last_metrics: EvalMetrics::default(),
        }
    }

    /// The scalar kind this manager evaluates.
    pub fn kind(&self) -> ScalarKind {
        self.kind
    }

    /// Maximum cells per workset.
    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    // ── Registration ───────────────────────────────────────────────

    /// Append an evaluator. Invalidates the compiled plan.
    pub fn register_evaluator(&mut self, evaluator: Box<dyn Evaluator<S>>) {
        self.evaluators.push(evaluator);
        self.invalidate();
    }

    /// Declare a field supplied from outside the graph. Invalidates the
    /// compiled plan.
    pub fn declare_root(&mut self, tag: FieldTag) {
        if !self.roots.contains(&tag) {
            self.roots.push(tag);
            self.invalidate();
        }
    }

    /// Request a field for output. Once any field is requested, only the
    /// evaluators the requested fields depend on are scheduled.
    pub fn require_field(&mut self, tag: FieldTag) {
        if !self.required.contains(&tag) {
            self.required.push(tag);
            self.invalidate();
        }
    }

    /// Number of registered evaluators.
    pub fn evaluator_count(&self) -> usize {
        self.evaluators.len()
    }

    fn invalidate(&mut self) {
        self.plan = None;
        self.ready = false;
    }

    // ── Setup ──────────────────────────────────────────────────────

    /// Build the graph (unless cached), allocate storage and set up the
    /// scheduled evaluators in execution order.
    ///
    /// Calling this again without a registration change is a no-op.
    pub fn post_registration_setup(&mut self) -> Result<(), SetupError> {
        if self.ready {
            return Ok(());
        }
        let plan = match self.plan.take() {
            Some(plan) => plan,
            None => {
                let plan = build_graph(&self.evaluators, &self.roots, &self.required)?;
                self.graph_builds += 1;
                plan
            }
        };
        let result = self.setup_scheduled(&plan);
        self.plan = Some(plan);
        result
    }

    fn setup_scheduled(&mut self, plan: &EvaluationPlan) -> Result<(), SetupError> {
        for (_, tag) in plan.registry().iter() {
            check_batch_extent(tag, self.max_batch)?;
        }

        let mut scratch_len = 0;
        for &i in plan.order() {
            let evaluator = &mut self.evaluators[i];
            let name = evaluator.name().to_string();
            let bindings = FieldBindings::new(&name, plan.registry());
            evaluator.setup(&bindings)?;
            scratch_len = scratch_len.max(evaluator.scratch_len());
        }

        self.storage = FieldStorage::allocate(plan.registry());
        self.scratch = ScratchRegion::new(scratch_len);
        self.scratch_len = scratch_len;
        self.ready = true;
        log::info!(
            "{} field manager ready: {} evaluators scheduled, {} fields, {} bytes, scratch {}",
            self.kind,
            plan.len(),
            plan.registry().len(),
            self.storage.memory_bytes(),
            scratch_len
        );
        Ok(())
    }

    /// Whether setup has completed for the current registration.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// How many times the dependency graph has been built.
    pub fn graph_builds(&self) -> u64 {
        self.graph_builds
    }

    /// The compiled plan, if built.
    pub fn plan(&self) -> Option<&EvaluationPlan> {
        self.plan.as_ref()
    }

    /// Evaluator names in execution order.
    pub fn evaluation_order(&self) -> Result<Vec<&str>, StepError> {
        let plan = self.plan.as_ref().ok_or(StepError::NotSetUp)?;
        Ok(plan.ordered_names())
    }

    /// Storage id of a field in the compiled graph.
    pub fn field_id(&self, tag: &FieldTag) -> Option<FieldId> {
        self.plan.as_ref().and_then(|p| p.registry().get(tag))
    }

    fn ready_plan(&self) -> Result<&EvaluationPlan, StepError> {
        match (&self.plan, self.ready) {
            (Some(plan), true) => Ok(plan),
            _ => Err(StepError::NotSetUp),
        }
    }

    fn lookup(&self, tag: &FieldTag) -> Result<FieldId, StepError> {
        self.ready_plan()?
            .registry()
            .get(tag)
            .ok_or_else(|| StepError::UnknownField {
                field: tag.to_string(),
            })
    }

    // ── Field access ───────────────────────────────────────────────

    /// Copy values into the front of a field, typically a root.
    ///
    /// Entries past `values.len()` keep their contents.
    pub fn set_root(&mut self, tag: &FieldTag, values: &[S]) -> Result<(), StepError> {
        let buf = self.root_mut(tag)?;
        if values.len() > buf.len() {
            return Err(StepError::RootSizeMismatch {
                field: tag.to_string(),
                len: values.len(),
                capacity: buf.len(),
            });
        }
        buf[..values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Mutable full buffer of a field, typically a root.
    pub fn root_mut(&mut self, tag: &FieldTag) -> Result<&mut [S], StepError> {
        let id = self.lookup(tag)?;
        self.storage
            .get_mut(id)
            .ok_or_else(|| StepError::UnknownField {
                field: tag.to_string(),
            })
    }

    /// Full buffer of a field.
    pub fn field(&self, tag: &FieldTag) -> Option<&[S]> {
        let id = self.lookup(tag).ok()?;
        self.storage.get(id)
    }

    /// Fields written by the scheduled evaluators, in first-produced order.
    pub fn outputs(&self) -> Vec<(&FieldTag, &[S])> {
        let Ok(plan) = self.ready_plan() else {
            return Vec::new();
        };
        let scheduled = plan.order();
        plan.produced()
            .filter(|(_, producer)| scheduled.contains(producer))
            .filter_map(|(id, _)| Some((plan.registry().tag(id)?, self.storage.get(id)?)))
            .collect()
    }

    /// Stage the values of a field for the first `cell_count` cells into
    /// the state store, dropping derivatives.
    pub fn export_state(
        &self,
        tag: &FieldTag,
        cell_count: usize,
        store: &mut StateStore,
        workset: usize,
        name: &str,
    ) -> Result<(), ExportError> {
        let data = self.field(tag).ok_or_else(|| StepError::UnknownField {
            field: tag.to_string(),
        })?;
        let len = tag.layout().valid_len(cell_count).min(data.len());
        let values: Vec<f64> = data[..len].iter().map(|s| s.value()).collect();
        store.stage(workset, name, &values)?;
        Ok(())
    }

    /// The manager's own storage.
    pub fn storage(&self) -> &FieldStorage<S> {
        &self.storage
    }

    /// A copy of the current storage, roots included, for evaluating
    /// worksets outside the manager.
    pub fn new_storage(&self) -> Result<FieldStorage<S>, StepError> {
        self.ready_plan()?;
        Ok(self.storage.clone())
    }

    /// A scratch region large enough for every scheduled evaluator.
    pub fn new_scratch(&self) -> ScratchRegion<S> {
        ScratchRegion::new(self.scratch_len)
    }

    /// Metrics of the most recent `evaluate_fields()` call.
    pub fn last_metrics(&self) -> &EvalMetrics {
        &self.last_metrics
    }

    // ── Evaluation ─────────────────────────────────────────────────

    /// Evaluate every scheduled evaluator once for `workset`.
    ///
    /// Only the prefix `[0, cell_count)` of each cell-batched output is
    /// exposed to evaluators; the rest keeps its contents.
    pub fn evaluate_fields(&mut self, workset: &Workset<'_>) -> Result<(), StepError> {
        let plan = match (&self.plan, self.ready) {
            (Some(plan), true) => plan,
            _ => return Err(StepError::NotSetUp),
        };
        let metrics = run_plan(
            self.kind,
            self.max_batch,
            plan,
            &self.evaluators,
            &mut self.storage,
            &mut self.scratch,
            workset,
        )?;
        self.last_metrics = metrics;
        Ok(())
    }

    /// Evaluate `workset` into caller-owned storage, sharing the
    /// evaluators by reference.
    ///
    /// `storage` must come from [`new_storage()`](Self::new_storage) and
    /// `scratch` from [`new_scratch()`](Self::new_scratch).
    pub fn evaluate_with(
        &self,
        storage: &mut FieldStorage<S>,
        scratch: &mut ScratchRegion<S>,
        workset: &Workset<'_>,
    ) -> Result<EvalMetrics, StepError> {
        let plan = self.ready_plan()?;
        run_plan(
            self.kind,
            self.max_batch,
            plan,
            &self.evaluators,
            storage,
            scratch,
            workset,
        )
    }
}

fn run_plan<S: EvalScalar>(
    kind: ScalarKind,
    max_batch: usize,
    plan: &EvaluationPlan,
    evaluators: &[Box<dyn Evaluator<S>>],
    storage: &mut FieldStorage<S>,
    scratch: &mut ScratchRegion<S>,
    workset: &Workset<'_>,
) -> Result<EvalMetrics, StepError> {
    let start = Instant::now();
    let cell_count = workset.cell_count();
    if cell_count > max_batch {
        return Err(StepError::BatchTooLarge {
            cell_count,
            max_batch,
        });
    }

    let mut evaluator_us = Vec::with_capacity(plan.len());
    for &i in plan.order() {
        let evaluator = &evaluators[i];
        let eval_start = Instant::now();

        let mut writes = storage.take_outputs(plan.outputs(i));
        scratch.reset();
        let result = {
            let mut ctx = EvalContext::new(
                evaluator.name(),
                &*storage,
                &mut writes,
                &mut *scratch,
                workset,
                kind,
            );
            evaluator.evaluate(&mut ctx)
        };
        storage.restore(writes);

        if let Err(reason) = result {
            log::error!(
                "{kind} workset {}: evaluator '{}' failed: {reason}",
                workset.index(),
                evaluator.name()
            );
            return Err(StepError::EvaluatorFailed {
                name: evaluator.name().to_string(),
                reason,
            });
        }
        evaluator_us.push((
            evaluator.name().to_string(),
            eval_start.elapsed().as_micros() as u64,
        ));
    }

    let total_us = start.elapsed().as_micros() as u64;
    log::debug!(
        "{kind} workset {}: {} cells, {} evaluators in {total_us}us",
        workset.index(),
        cell_count,
        evaluator_us.len()
    );
    Ok(EvalMetrics {
        total_us,
        evaluator_us,
        workset: workset.index(),
        cell_count,
        memory_bytes: storage.memory_bytes(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::{Dim, FieldLayout, StateArrays, StateVarSpec};
    use strata_test_utils::{ConstEvaluator, CopyEvaluator, FailingEvaluator};

    fn cell(name: &str) -> FieldTag {
        FieldTag::new(name, FieldLayout::new(&[(Dim::Cell, 4), (Dim::QuadPoint, 2)]))
    }

    fn chain() -> FieldManager<f64> {
        let mut fm = FieldManager::new(ScalarKind::Residual, 4);
        fm.declare_root(cell("T"));
        fm.register_evaluator(Box::new(CopyEvaluator::new("copy", cell("k"), cell("out"))));
        fm.register_evaluator(Box::new(CopyEvaluator::new("src", cell("T"), cell("k"))));
        fm
    }

    #[test]
    fn setup_orders_and_allocates() {
        let mut fm = chain();
        fm.post_registration_setup().unwrap();
        assert!(fm.is_ready());
        assert_eq!(fm.evaluation_order().unwrap(), vec!["src", "copy"]);
        assert_eq!(fm.field(&cell("out")).unwrap().len(), 8);
        assert_eq!(fm.graph_builds(), 1);
    }

    #[test]
    fn evaluate_before_setup_fails() {
        let mut fm = chain();
        let state = StateArrays::default();
        let ws = Workset::new(4, &state);
        assert_eq!(fm.evaluate_fields(&ws), Err(StepError::NotSetUp));
        assert!(fm.set_root(&cell("T"), &[1.0]).is_err());
    }

    #[test]
    fn values_flow_through_the_chain() {
        let mut fm = chain();
        fm.post_registration_setup().unwrap();
        let values: Vec<f64> = (0..8).map(f64::from).collect();
        fm.set_root(&cell("T"), &values).unwrap();

        let state = StateArrays::default();
        fm.evaluate_fields(&Workset::new(4, &state)).unwrap();
        assert_eq!(fm.field(&cell("out")).unwrap(), values.as_slice());

        let metrics = fm.last_metrics();
        assert_eq!(metrics.evaluator_us.len(), 2);
        assert_eq!(metrics.evaluator_us[0].0, "src");
        assert_eq!(metrics.cell_count, 4);
    }

    #[test]
    fn repeated_setup_reuses_plan() {
        let mut fm = chain();
        fm.post_registration_setup().unwrap();
        fm.post_registration_setup().unwrap();
        assert_eq!(fm.graph_builds(), 1);

        fm.register_evaluator(Box::new(ConstEvaluator::new("extra", cell("e"), 1.0)));
        assert!(!fm.is_ready());
        fm.post_registration_setup().unwrap();
        assert_eq!(fm.graph_builds(), 2);
    }

    #[test]
    fn oversized_workset_rejected() {
        let mut fm = chain();
        fm.post_registration_setup().unwrap();
        let state = StateArrays::default();
        assert_eq!(
            fm.evaluate_fields(&Workset::new(5, &state)),
            Err(StepError::BatchTooLarge {
                cell_count: 5,
                max_batch: 4
            })
        );
    }

    #[test]
    fn mismatched_cell_extent_rejected_at_setup() {
        let mut fm = FieldManager::<f64>::new(ScalarKind::Residual, 3);
        fm.register_evaluator(Box::new(ConstEvaluator::new("c", cell("k"), 1.0)));
        match fm.post_registration_setup() {
            Err(SetupError::BatchExtentMismatch {
                extent, max_batch, ..
            }) => {
                assert_eq!(extent, 4);
                assert_eq!(max_batch, 3);
            }
            other => panic!("expected BatchExtentMismatch, got {other:?}"),
        }
        assert!(!fm.is_ready());
    }

    #[test]
    fn failing_evaluator_restores_storage() {
        let mut fm = FieldManager::<f64>::new(ScalarKind::Residual, 4);
        fm.register_evaluator(Box::new(ConstEvaluator::new("k", cell("k"), 2.0)));
        let failing = FailingEvaluator::new("boom", cell("b"), 1);
        fm.register_evaluator(Box::new(failing.clone()));
        fm.post_registration_setup().unwrap();

        let state = StateArrays::default();
        let ws = Workset::new(4, &state);
        fm.evaluate_fields(&ws).unwrap();
        match fm.evaluate_fields(&ws) {
            Err(StepError::EvaluatorFailed { name, .. }) => assert_eq!(name, "boom"),
            other => panic!("expected EvaluatorFailed, got {other:?}"),
        }
        assert_eq!(failing.calls(), 2);
        // The failing evaluator's output was moved back.
        assert_eq!(fm.field(&cell("b")).unwrap(), &[0.0; 8]);
        assert_eq!(fm.field(&cell("k")).unwrap(), &[2.0; 8]);
    }

    #[test]
    fn required_fields_prune_schedule() {
        let mut fm = chain();
        fm.register_evaluator(Box::new(ConstEvaluator::new("unused", cell("u"), 1.0)));
        fm.require_field(cell("k"));
        fm.post_registration_setup().unwrap();
        assert_eq!(fm.evaluation_order().unwrap(), vec!["src"]);
        let produced: Vec<String> = fm.outputs().iter().map(|(t, _)| t.to_string()).collect();
        assert_eq!(produced, vec!["k<Cell:4,QuadPoint:2>"]);
    }

    #[test]
    fn root_size_checked() {
        let mut fm = chain();
        fm.post_registration_setup().unwrap();
        match fm.set_root(&cell("T"), &[0.0; 9]) {
            Err(StepError::RootSizeMismatch { len, capacity, .. }) => {
                assert_eq!(len, 9);
                assert_eq!(capacity, 8);
            }
            other => panic!("expected RootSizeMismatch, got {other:?}"),
        }
        let unknown = cell("nope");
        assert!(matches!(
            fm.set_root(&unknown, &[]),
            Err(StepError::UnknownField { .. })
        ));
    }

    #[test]
    fn export_state_stages_valid_prefix() {
        let mut fm = chain();
        fm.post_registration_setup().unwrap();
        fm.set_root(&cell("T"), &[1.0; 8]).unwrap();

        let mut store = StateStore::new(1);
        store
            .register(StateVarSpec::new(
                "T",
                FieldLayout::new(&[(Dim::Cell, 4), (Dim::QuadPoint, 2)]),
            ))
            .unwrap();
        fm.export_state(&cell("T"), 2, &mut store, 0, "T").unwrap();
        assert_eq!(
            store.workset(0).unwrap().get("T").unwrap(),
            &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]
        );

        assert!(matches!(
            fm.export_state(&cell("T"), 2, &mut store, 0, "missing"),
            Err(ExportError::State(StateError::UnknownVariable { .. }))
        ));
    }
}
