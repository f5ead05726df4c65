//! Harness running one evaluator through a field manager.

use strata_core::{
    EvalScalar, FieldTag, LayoutExtents, Layouts, ScalarKind, StateArrays, Workset,
};
use strata_engine::FieldManager;
use strata_evaluator::Evaluator;

/// Two-cell batches of two-node line elements with two quadrature points.
pub(crate) fn line_layouts() -> Layouts {
    Layouts::new(LayoutExtents {
        workset_size: 2,
        vertices: 2,
        nodes: 2,
        qps: 2,
        dims: 1,
        vec_dim: None,
        faces: 2,
    })
}

/// A set-up manager whose roots are the given tags, holding the given
/// values.
pub(crate) fn manager<S, E>(evaluator: E, roots: &[(&FieldTag, Vec<S>)]) -> FieldManager<S>
where
    S: EvalScalar,
    E: Evaluator<S>,
{
    let kind = if S::derivative_capacity() == 0 {
        ScalarKind::Residual
    } else {
        ScalarKind::Jacobian
    };
    let batch = roots
        .iter()
        .find_map(|(tag, _)| tag.layout().batch_extent())
        .unwrap_or(2);
    let mut fm = FieldManager::new(kind, batch);
    for (tag, _) in roots {
        fm.declare_root((*tag).clone());
    }
    fm.register_evaluator(Box::new(evaluator));
    fm.post_registration_setup().unwrap();
    for (tag, values) in roots {
        fm.set_root(tag, values).unwrap();
    }
    fm
}

/// Evaluate a workset of `cells` cells with no state.
pub(crate) fn evaluate<S: EvalScalar>(fm: &mut FieldManager<S>, cells: usize) {
    let state = StateArrays::default();
    fm.evaluate_fields(&Workset::new(cells, &state)).unwrap();
}

pub(crate) fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-12, "{actual:?} vs {expected:?}");
    }
}
