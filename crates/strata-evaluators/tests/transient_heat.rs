//! Integration test: a transient heat problem on linear 1-D elements.
//!
//! Nodal temperature is interpolated to two quadrature points per cell,
//! differenced against the previous step held in the state store and
//! assembled into a nodal residual, in residual and Jacobian mode.

use std::sync::Arc;

use strata_core::{
    EvalScalar, Fad, FieldTag, LayoutExtents, Layouts, ScalarKind, StateStore, StateVarSpec,
    Workset,
};
use strata_engine::{EngineConfig, EvaluationModes};
use strata_evaluators::fields::{
    BF, ENERGY_DOT, GRAD_BF, RHO_CP, TEMPERATURE, TEMPERATURE_DOT, TEMPERATURE_GRADIENT,
    TEMPERATURE_RESIDUAL, THERMAL_CONDUCTIVITY, WEIGHTED_BF, WEIGHTED_GRAD_BF,
};
use strata_evaluators::{
    ConstantField, DofGradInterpolation, DofInterpolation, EnergyRate, PhaseResidual,
    TemperatureRate,
};

const CELLS: usize = 2;
const K: f64 = 3.0;
const RHO_CP_VALUE: f64 = 2.0;

// Unit elements, two-point rule at 1/4 and 3/4 with weights 1/2.
const BF_VALUES: [f64; 4] = [0.75, 0.25, 0.25, 0.75];
const GRAD_BF_VALUES: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];

fn dl() -> Layouts {
    Layouts::new(LayoutExtents {
        workset_size: CELLS,
        vertices: 2,
        nodes: 2,
        qps: 2,
        dims: 1,
        vec_dim: None,
        faces: 2,
    })
}

fn t_node() -> FieldTag {
    FieldTag::new(TEMPERATURE, dl().node_scalar)
}

fn t_qp() -> FieldTag {
    FieldTag::new(TEMPERATURE, dl().qp_scalar)
}

fn residual() -> FieldTag {
    FieldTag::new(TEMPERATURE_RESIDUAL, dl().node_scalar)
}

fn basis_roots() -> Vec<(FieldTag, Vec<f64>)> {
    let dl = dl();
    let per_cell = |v: &[f64], scale: f64| -> Vec<f64> {
        (0..CELLS).flat_map(|_| v.iter().map(move |x| x * scale)).collect()
    };
    vec![
        (FieldTag::new(BF, dl.node_qp_scalar.clone()), per_cell(&BF_VALUES, 1.0)),
        (FieldTag::new(WEIGHTED_BF, dl.node_qp_scalar.clone()), per_cell(&BF_VALUES, 0.5)),
        (FieldTag::new(GRAD_BF, dl.node_qp_gradient.clone()), per_cell(&GRAD_BF_VALUES, 1.0)),
        (
            FieldTag::new(WEIGHTED_GRAD_BF, dl.node_qp_gradient.clone()),
            per_cell(&GRAD_BF_VALUES, 0.5),
        ),
    ]
}

fn config(kinds: &[ScalarKind]) -> EngineConfig {
    let dl = dl();
    let qp = |name: &str| FieldTag::new(name, dl.qp_scalar.clone());
    let grad = FieldTag::new(TEMPERATURE_GRADIENT, dl.qp_gradient.clone());

    let mut config = EngineConfig::new(CELLS)
        .with_kinds(kinds)
        .with_root(t_node())
        .with_required(residual());
    for (tag, _) in basis_roots() {
        config = config.with_root(tag);
    }

    // Registered consumers first; the graph decides the order.
    config
        .with_evaluator(Arc::new(
            PhaseResidual::builder()
                .weighted_basis(FieldTag::new(WEIGHTED_BF, dl.node_qp_scalar.clone()))
                .weighted_grad_basis(FieldTag::new(WEIGHTED_GRAD_BF, dl.node_qp_gradient.clone()))
                .gradient(grad.clone())
                .conductivity(qp(THERMAL_CONDUCTIVITY))
                .energy_rate(qp(ENERGY_DOT))
                .residual(residual())
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            EnergyRate::builder()
                .heat_capacity(qp(RHO_CP))
                .temperature_rate(qp(TEMPERATURE_DOT))
                .energy_rate(qp(ENERGY_DOT))
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            TemperatureRate::builder()
                .temperature(t_qp())
                .rate(qp(TEMPERATURE_DOT))
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            DofGradInterpolation::builder()
                .dof(t_node())
                .grad_basis(FieldTag::new(GRAD_BF, dl.node_qp_gradient.clone()))
                .output(grad)
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            DofInterpolation::builder()
                .dof(t_node())
                .basis(FieldTag::new(BF, dl.node_qp_scalar.clone()))
                .output(t_qp())
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            ConstantField::builder()
                .output(qp(THERMAL_CONDUCTIVITY))
                .value(K)
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            ConstantField::builder()
                .output(qp(RHO_CP))
                .value(RHO_CP_VALUE)
                .build()
                .unwrap(),
        ))
}

fn modes(kinds: &[ScalarKind]) -> EvaluationModes {
    let mut modes = EvaluationModes::new(config(kinds)).unwrap();
    modes.post_registration_setup().unwrap();
    for (tag, values) in basis_roots() {
        modes.set_root_values(&tag, &values).unwrap();
    }
    modes
}

/// A state store whose previous temperature is `old` at every qp.
fn history(old: f64) -> StateStore {
    let mut store = StateStore::new(1);
    store
        .register(StateVarSpec::new(TEMPERATURE, dl().qp_scalar).keep_old())
        .unwrap();
    store.stage(0, TEMPERATURE, &[old; 2 * CELLS]).unwrap();
    store.advance_time_step();
    store
}

fn residual_of(modes: &mut EvaluationModes, t: &[f64], ws: &Workset<'_>) -> Vec<f64> {
    modes.set_root_values(&t_node(), t).unwrap();
    modes.evaluate(ScalarKind::Residual, ws).unwrap();
    modes.residual().unwrap().field(&residual()).unwrap().to_vec()
}

#[test]
fn evaluation_order_follows_dependencies() {
    let modes = modes(&[ScalarKind::Residual]);
    let order = modes.residual().unwrap().evaluation_order().unwrap();
    let pos = |prefix: &str| order.iter().position(|n| n.starts_with(prefix)).unwrap();
    assert!(pos("DofInterpolation") < pos("TemperatureRate"));
    assert!(pos("TemperatureRate") < pos("EnergyRate"));
    assert!(pos("EnergyRate") < pos("PhaseResidual"));
    assert!(pos("DofGradInterpolation") < pos("PhaseResidual"));
    assert_eq!(order.len(), 7);
}

#[test]
fn steady_uniform_temperature_has_zero_residual() {
    let mut modes = modes(&[ScalarKind::Residual]);
    let store = history(5.0);
    let ws = Workset::new(CELLS, store.workset(0).unwrap()).with_time(1.0, 0.5);
    let r = residual_of(&mut modes, &[5.0; 2 * CELLS], &ws);
    assert!(r.iter().all(|v| v.abs() < 1e-12), "{r:?}");
}

#[test]
fn zero_step_size_keeps_the_residual_finite() {
    let mut modes = modes(&[ScalarKind::Residual]);
    let store = history(0.0);
    let ws = Workset::new(CELLS, store.workset(0).unwrap()).with_time(1.0, 0.0);
    let r = residual_of(&mut modes, &[1.0; 2 * CELLS], &ws);
    assert!(r.iter().all(|v| v.is_finite()), "{r:?}");
    assert!(r[0] > 1e10);
}

#[test]
fn jacobian_matches_stiffness_plus_mass() {
    let mut modes = modes(&[ScalarKind::Residual, ScalarKind::Jacobian]);
    let store = history(1.0);
    let ws = Workset::new(CELLS, store.workset(0).unwrap()).with_time(1.0, 0.5);
    let t = [1.0, 3.0, 2.0, 0.5];

    let seeded: Vec<Fad> = t
        .iter()
        .enumerate()
        .map(|(i, &v)| Fad::variable(v, i % 2))
        .collect();
    let jac = modes.jacobian_mut().unwrap();
    jac.set_root(&t_node(), &seeded).unwrap();
    jac.evaluate_fields(&ws).unwrap();
    let out = jac.field(&residual()).unwrap().to_vec();

    // k Σ_q GradBF_m wGradBF_n + (ρc_p / dt) Σ_q BF_m wBF_n
    let diagonal = K + (RHO_CP_VALUE / 0.5) * 0.3125;
    let off_diagonal = -K + (RHO_CP_VALUE / 0.5) * 0.1875;
    for cell in 0..CELLS {
        let r0 = out[cell * 2];
        let r1 = out[cell * 2 + 1];
        assert!((r0.derivative(0) - diagonal).abs() < 1e-12);
        assert!((r0.derivative(1) - off_diagonal).abs() < 1e-12);
        assert!((r1.derivative(0) - off_diagonal).abs() < 1e-12);
        assert!((r1.derivative(1) - diagonal).abs() < 1e-12);
    }

    // The values agree with residual mode.
    let plain = residual_of(&mut modes, &t, &ws);
    let jac = modes.jacobian().unwrap();
    for (p, j) in plain.iter().zip(jac.field(&residual()).unwrap()) {
        assert!((p - j.value()).abs() < 1e-12);
    }
}

#[test]
fn jacobian_matches_finite_differences() {
    let mut modes = modes(&[ScalarKind::Residual, ScalarKind::Jacobian]);
    let store = history(0.25);
    let ws = Workset::new(CELLS, store.workset(0).unwrap()).with_time(2.0, 0.1);
    let t = [0.5, 1.5, -1.0, 2.0];

    let seeded: Vec<Fad> = t
        .iter()
        .enumerate()
        .map(|(i, &v)| Fad::variable(v, i))
        .collect();
    let jac = modes.jacobian_mut().unwrap();
    jac.set_root(&t_node(), &seeded).unwrap();
    jac.evaluate_fields(&ws).unwrap();
    let analytic: Vec<Fad> = jac.field(&residual()).unwrap().to_vec();

    let eps = 1e-6;
    for m in 0..t.len() {
        let mut up = t;
        up[m] += eps;
        let mut down = t;
        down[m] -= eps;
        let r_up = residual_of(&mut modes, &up, &ws);
        let r_down = residual_of(&mut modes, &down, &ws);
        for n in 0..t.len() {
            let fd = (r_up[n] - r_down[n]) / (2.0 * eps);
            let ad = analytic[n].derivative(m);
            assert!((fd - ad).abs() < 1e-5, "dR{n}/dT{m}: {fd} vs {ad}");
        }
    }
}

#[test]
fn partial_workset_leaves_the_tail() {
    let mut modes = modes(&[ScalarKind::Residual]);
    let store = history(0.0);
    let full = Workset::new(CELLS, store.workset(0).unwrap()).with_time(1.0, 1.0);
    let before = residual_of(&mut modes, &[1.0, 2.0, 3.0, 4.0], &full);

    let partial = Workset::new(1, store.workset(0).unwrap()).with_time(1.0, 1.0);
    let after = residual_of(&mut modes, &[0.0; 4], &partial);
    assert_eq!(&after[2..], &before[2..]);
    assert!(after[..2].iter().all(|v| v.abs() < 1e-12));
}
