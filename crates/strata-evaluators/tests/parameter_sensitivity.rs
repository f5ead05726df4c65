//! Integration test: derivatives of an Arrhenius diffusion residual.
//!
//! Tangent mode differentiates with respect to the named prefactor
//! parameter, Jacobian mode with respect to the nodal temperature. Both
//! are checked against central differences of residual mode.

use std::sync::Arc;

use strata_core::{EvalScalar, FieldTag, LayoutExtents, Layouts, ScalarKind, StateArrays, Workset};
use strata_engine::{EngineConfig, EvaluationModes};
use strata_evaluators::fields::{
    BF, GRAD_BF, HEAT_FLUX, TEMPERATURE, TEMPERATURE_GRADIENT, TEMPERATURE_RESIDUAL,
    WEIGHTED_GRAD_BF,
};
use strata_evaluators::{
    DiffusionCoefficient, DiffusionResidual, DofGradInterpolation, DofInterpolation, HeatFlux,
    GAS_CONSTANT,
};

const CELLS: usize = 2;
const PREFACTOR: &str = "D_pre";
const T: [f64; 4] = [300.0, 320.0, 310.0, 290.0];

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

fn residual() -> FieldTag {
    FieldTag::new(TEMPERATURE_RESIDUAL, dl().node_scalar)
}

fn d_pre() -> FieldTag {
    FieldTag::new(PREFACTOR, dl().qp_scalar)
}

fn basis_roots() -> Vec<(FieldTag, Vec<f64>)> {
    let dl = dl();
    let per_cell = |v: [f64; 4]| -> Vec<f64> { (0..CELLS).flat_map(|_| v).collect() };
    vec![
        (FieldTag::new(BF, dl.node_qp_scalar.clone()), per_cell([0.75, 0.25, 0.25, 0.75])),
        (FieldTag::new(GRAD_BF, dl.node_qp_gradient.clone()), per_cell([-1.0, -1.0, 1.0, 1.0])),
        (
            FieldTag::new(WEIGHTED_GRAD_BF, dl.node_qp_gradient.clone()),
            per_cell([-0.5, -0.5, 0.5, 0.5]),
        ),
    ]
}

fn config(kinds: &[ScalarKind]) -> EngineConfig {
    let dl = dl();
    let t_qp = FieldTag::new(TEMPERATURE, dl.qp_scalar.clone());
    let grad = FieldTag::new(TEMPERATURE_GRADIENT, dl.qp_gradient.clone());
    let diffusivity = FieldTag::new("Diffusivity", dl.qp_tensor.clone());
    let flux = FieldTag::new(HEAT_FLUX, dl.qp_gradient.clone());

    let mut config = EngineConfig::new(CELLS)
        .with_kinds(kinds)
        .with_dof(t_node())
        .with_parameter(PREFACTOR, d_pre())
        .with_required(residual());
    for (tag, _) in basis_roots() {
        config = config.with_root(tag);
    }
    config
        .with_evaluator(Arc::new(
            DofInterpolation::builder()
                .dof(t_node())
                .basis(FieldTag::new(BF, dl.node_qp_scalar.clone()))
                .output(t_qp.clone())
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            DofGradInterpolation::builder()
                .dof(t_node())
                .grad_basis(FieldTag::new(GRAD_BF, dl.node_qp_gradient.clone()))
                .output(grad.clone())
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            DiffusionCoefficient::builder()
                .temperature(t_qp)
                .prefactor_field(d_pre())
                .activation_energy(GAS_CONSTANT * 300.0)
                .output(diffusivity.clone())
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            HeatFlux::builder()
                .conductivity(diffusivity)
                .gradient(grad)
                .flux(flux.clone())
                .build()
                .unwrap(),
        ))
        .with_evaluator(Arc::new(
            DiffusionResidual::builder()
                .flux(flux)
                .weighted_grad_basis(FieldTag::new(WEIGHTED_GRAD_BF, dl.node_qp_gradient))
                .residual(residual())
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

fn residual_at(modes: &mut EvaluationModes, t: &[f64], prefactor: f64) -> Vec<f64> {
    let state = StateArrays::default();
    modes.set_dof_values(&t_node(), t).unwrap();
    modes.set_parameter(PREFACTOR, prefactor).unwrap();
    modes
        .evaluate(ScalarKind::Residual, &Workset::new(CELLS, &state))
        .unwrap();
    modes.residual().unwrap().field(&residual()).unwrap().to_vec()
}

#[test]
fn prefactor_tangent_matches_finite_differences() {
    let mut modes = modes(&[ScalarKind::Residual, ScalarKind::Tangent]);
    assert_eq!(modes.parameter_slot(PREFACTOR), Some(0));

    let plain = residual_at(&mut modes, &T, 2.0);
    let state = StateArrays::default();
    modes
        .evaluate(ScalarKind::Tangent, &Workset::new(CELLS, &state))
        .unwrap();
    let tangent = modes.tangent().unwrap().field(&residual()).unwrap().to_vec();

    let eps = 1e-3;
    let up = residual_at(&mut modes, &T, 2.0 + eps);
    let down = residual_at(&mut modes, &T, 2.0 - eps);
    for n in 0..T.len() {
        let fd = (up[n] - down[n]) / (2.0 * eps);
        let ad = tangent[n].derivative(0);
        assert!((fd - ad).abs() < 1e-8, "dR{n}/dD_pre: {fd} vs {ad}");
        assert!((tangent[n].value() - plain[n]).abs() < 1e-12);
        assert!(ad.abs() > 1e-3, "sensitivity {n} vanished");
    }
}

#[test]
fn temperature_jacobian_matches_finite_differences() {
    let mut modes = modes(&[ScalarKind::Residual, ScalarKind::Jacobian]);
    let state = StateArrays::default();
    let ws = Workset::new(CELLS, &state);
    modes.set_dof_values(&t_node(), &T).unwrap();
    modes.set_parameter(PREFACTOR, 2.0).unwrap();
    modes.evaluate(ScalarKind::Jacobian, &ws).unwrap();
    let jac = modes.jacobian().unwrap().field(&residual()).unwrap().to_vec();

    let eps = 1e-4;
    for cell in 0..CELLS {
        for m in 0..2 {
            let mut up = T;
            up[cell * 2 + m] += eps;
            let mut down = T;
            down[cell * 2 + m] -= eps;
            let r_up = residual_at(&mut modes, &up, 2.0);
            let r_down = residual_at(&mut modes, &down, 2.0);
            for n in 0..2 {
                let i = cell * 2 + n;
                let fd = (r_up[i] - r_down[i]) / (2.0 * eps);
                let ad = jac[i].derivative(m);
                assert!((fd - ad).abs() < 1e-6, "cell {cell}: dR{n}/dT{m}: {fd} vs {ad}");
            }
        }
    }
    // The prefactor is a constant in Jacobian mode.
    let slots = modes.jacobian().unwrap().field(&d_pre()).unwrap();
    assert!(slots.iter().all(|d| d.derivative(0) == 0.0));
}
