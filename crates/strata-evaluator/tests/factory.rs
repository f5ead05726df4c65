//! Registration-list factories building per-mode evaluator instances.

use std::sync::Arc;
use strata_core::{Dim, FieldLayout, FieldTag};
use strata_evaluator::{build_graph, Evaluator, EvaluatorFactory};
use strata_test_utils::{ConstEvaluator, CopyEvaluator};

fn cell(name: &str) -> FieldTag {
    FieldTag::new(name, FieldLayout::new(&[(Dim::Cell, 2)]))
}

#[test]
fn one_template_serves_both_scalar_kinds() {
    let factory: Arc<dyn EvaluatorFactory> = Arc::new(ConstEvaluator::new("P", cell("k"), 2.0));
    assert_eq!(factory.name(), "P");

    let value = factory.build_residual().unwrap();
    let deriv = factory.build_derivative().unwrap();
    assert_eq!(value.produces(), vec![cell("k")]);
    assert_eq!(deriv.produces(), vec![cell("k")]);
    assert_eq!(value.name(), deriv.name());
}

#[test]
fn factories_build_identical_graphs_per_mode() {
    let factories: Vec<Arc<dyn EvaluatorFactory>> = vec![
        Arc::new(CopyEvaluator::new("C", cell("k"), cell("flux"))),
        Arc::new(ConstEvaluator::new("P", cell("k"), 2.0)),
    ];
    let values: Vec<Box<dyn Evaluator<f64>>> = factories
        .iter()
        .map(|f| f.build_residual().unwrap())
        .collect();
    let derivs: Vec<Box<dyn Evaluator<strata_core::Fad>>> = factories
        .iter()
        .map(|f| f.build_derivative().unwrap())
        .collect();

    let a = build_graph(&values, &[], &[]).unwrap();
    let b = build_graph(&derivs, &[], &[]).unwrap();
    assert_eq!(a.ordered_names(), vec!["P", "C"]);
    assert_eq!(a.order(), b.order());
}
