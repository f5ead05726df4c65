//! Integration test: parallel and sequential workset evaluation agree.

use proptest::prelude::*;

use strata_core::{
    ConfigError, Dim, EvalScalar, EvaluatorError, FieldLayout, FieldTag, ScalarKind, StateArrays,
    StateStore, StateVarSpec, Workset,
};
use strata_engine::{evaluate_parallel, evaluate_sequential, FieldManager};
use strata_evaluator::{EvalContext, Evaluator, FieldBindings, FieldHandle};

const BATCH: usize = 4;

fn cell(name: &str) -> FieldTag {
    FieldTag::new(name, FieldLayout::new(&[(Dim::Cell, BATCH), (Dim::Node, 2)]))
}

/// `out = input * time + history`, where `history` comes from the
/// workset's state arrays.
struct TimeScaled {
    handles: Option<(FieldHandle, FieldHandle)>,
}

impl<S: EvalScalar> Evaluator<S> for TimeScaled {
    fn name(&self) -> &str {
        "time_scaled"
    }

    fn requires(&self) -> Vec<FieldTag> {
        vec![cell("u")]
    }

    fn produces(&self) -> Vec<FieldTag> {
        vec![cell("v")]
    }

    fn setup(&mut self, bindings: &FieldBindings<'_>) -> Result<(), ConfigError> {
        self.handles = Some((bindings.bind(&cell("u"))?, bindings.bind(&cell("v"))?));
        Ok(())
    }

    fn evaluate(&self, ctx: &mut EvalContext<'_, S>) -> Result<(), EvaluatorError> {
        let (u, v) = self.handles.ok_or(EvaluatorError::NotSetUp)?;
        let time = ctx.workset().time();
        let history = ctx
            .workset()
            .state()
            .get("history")
            .ok_or_else(|| EvaluatorError::MissingState {
                name: "history".to_string(),
            })?;
        let u = ctx.input(u)?;
        let out = ctx.output(v)?;
        for (i, o) in out.iter_mut().enumerate() {
            *o = u[i] * time + history[i];
        }
        Ok(())
    }
}

fn manager() -> FieldManager<f64> {
    let mut fm = FieldManager::new(ScalarKind::Residual, BATCH);
    fm.declare_root(cell("u"));
    fm.register_evaluator(Box::new(TimeScaled { handles: None }));
    fm.post_registration_setup().unwrap();
    fm.set_root(&cell("u"), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
        .unwrap();
    fm
}

fn store(histories: &[f64]) -> StateStore {
    let mut store = StateStore::new(histories.len());
    store
        .register(StateVarSpec::new(
            "history",
            FieldLayout::new(&[(Dim::Cell, BATCH), (Dim::Node, 2)]),
        ))
        .unwrap();
    for (i, &h) in histories.iter().enumerate() {
        store.stage(i, "history", &[h; 2 * BATCH]).unwrap();
    }
    store
}

fn worksets<'s>(store: &'s StateStore, times: &[(f64, usize)]) -> Vec<Workset<'s>> {
    times
        .iter()
        .enumerate()
        .filter_map(|(i, &(t, cells))| {
            Some(
                Workset::new(cells, store.workset(i)?)
                    .with_index(i)
                    .with_time(t, 0.1),
            )
        })
        .collect()
}

#[test]
fn missing_state_aborts_the_batch() {
    let fm = manager();
    let empty = StateArrays::default();
    let ws = vec![Workset::new(BATCH, &empty)];
    let err = evaluate_parallel(&fm, &ws, |_, _| ()).unwrap_err();
    assert!(err.to_string().contains("history"));
}

#[test]
fn parallel_matches_known_values() {
    let fm = manager();
    let store = store(&[0.0, 10.0]);
    let ws = worksets(&store, &[(1.0, 4), (2.0, 4)]);
    let id = fm.field_id(&cell("v")).unwrap();
    let out = evaluate_parallel(&fm, &ws, |_, s| s.get(id).unwrap().to_vec()).unwrap();
    assert_eq!(out[0], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    assert_eq!(
        out[1],
        vec![12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 24.0, 26.0]
    );
}

proptest! {
    #[test]
    fn parallel_equals_sequential(
        specs in prop::collection::vec((-100.0f64..100.0, 1usize..=BATCH, -5.0f64..5.0), 1..24)
    ) {
        let fm = manager();
        let histories: Vec<f64> = specs.iter().map(|s| s.2).collect();
        let times: Vec<(f64, usize)> = specs.iter().map(|s| (s.0, s.1)).collect();
        let store = store(&histories);
        let ws = worksets(&store, &times);
        let id = fm.field_id(&cell("v")).unwrap();

        // Only the valid prefix is compared: the tail depends on which
        // worksets a worker saw before.
        let extract = |w: &Workset<'_>, s: &strata_engine::FieldStorage<f64>| {
            s.get(id).unwrap()[..2 * w.cell_count()]
                .iter()
                .map(|v| v.to_bits())
                .collect::<Vec<u64>>()
        };
        let par = evaluate_parallel(&fm, &ws, extract).unwrap();
        let seq = evaluate_sequential(&fm, &ws, extract).unwrap();
        prop_assert_eq!(par, seq);
    }
}
