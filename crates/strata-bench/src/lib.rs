//! Benchmark profiles for the Strata evaluation engine.
//!
//! - [`heat_profile`]: a transient phase-change heat problem on unit
//!   hexahedra (8 nodes, 8 quadrature points, 3-D), seven evaluators deep
//! - [`heat_roots`]: trilinear basis data for that profile
//! - [`heat_state`]: a state store holding the previous temperature

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use strata_core::{
    ConfigError, FieldTag, LayoutExtents, Layouts, ScalarKind, StateError, StateStore,
    StateVarSpec,
};
use strata_engine::EngineConfig;
use strata_evaluators::fields::{
    BF, ENERGY_DOT, GRAD_BF, RHO_CP, TEMPERATURE, TEMPERATURE_DOT, TEMPERATURE_GRADIENT,
    TEMPERATURE_RESIDUAL, THERMAL_CONDUCTIVITY, WEIGHTED_BF, WEIGHTED_GRAD_BF,
};
use strata_evaluators::{
    ConstantField, DofGradInterpolation, DofInterpolation, EnergyRate, PhaseResidual,
    TemperatureRate,
};

const NODES: usize = 8;
const QPS: usize = 8;
const DIMS: usize = 3;

/// Reference coordinates of the hexahedron's nodes.
const HEX_NODES: [[f64; 3]; NODES] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

/// Layouts of the heat profile for `workset_size` hexahedra per workset.
pub fn heat_layouts(workset_size: usize) -> Layouts {
    Layouts::new(LayoutExtents {
        workset_size,
        vertices: NODES,
        nodes: NODES,
        qps: QPS,
        dims: DIMS,
        vec_dim: None,
        faces: 6,
    })
}

/// Nodal temperature, the profile's unknown.
pub fn temperature(dl: &Layouts) -> FieldTag {
    FieldTag::new(TEMPERATURE, dl.node_scalar.clone())
}

/// Nodal residual, the profile's output.
pub fn residual(dl: &Layouts) -> FieldTag {
    FieldTag::new(TEMPERATURE_RESIDUAL, dl.node_scalar.clone())
}

/// Build the heat profile for the given scalar kinds.
///
/// Degree of freedom: nodal temperature. Roots: the four basis arrays of
/// [`heat_roots`].
/// Reads the `Temperature` state of [`heat_state`].
pub fn heat_profile(workset_size: usize, kinds: &[ScalarKind]) -> Result<EngineConfig, ConfigError> {
    let dl = heat_layouts(workset_size);
    let qp = |name: &str| FieldTag::new(name, dl.qp_scalar.clone());
    let grad = FieldTag::new(TEMPERATURE_GRADIENT, dl.qp_gradient.clone());

    let mut config = EngineConfig::new(workset_size)
        .with_kinds(kinds)
        .with_dof(temperature(&dl))
        .with_required(residual(&dl));
    for (tag, _) in heat_roots(workset_size) {
        config = config.with_root(tag);
    }

    Ok(config
        .with_evaluator(Arc::new(
            DofInterpolation::builder()
                .dof(temperature(&dl))
                .basis(FieldTag::new(BF, dl.node_qp_scalar.clone()))
                .output(qp(TEMPERATURE))
                .build()?,
        ))
        .with_evaluator(Arc::new(
            DofGradInterpolation::builder()
                .dof(temperature(&dl))
                .grad_basis(FieldTag::new(GRAD_BF, dl.node_qp_gradient.clone()))
                .output(grad.clone())
                .build()?,
        ))
        .with_evaluator(Arc::new(
            TemperatureRate::builder()
                .temperature(qp(TEMPERATURE))
                .rate(qp(TEMPERATURE_DOT))
                .build()?,
        ))
        .with_evaluator(Arc::new(
            ConstantField::builder()
                .output(qp(RHO_CP))
                .value(4.0e6)
                .build()?,
        ))
        .with_evaluator(Arc::new(
            ConstantField::builder()
                .output(qp(THERMAL_CONDUCTIVITY))
                .value(20.0)
                .build()?,
        ))
        .with_evaluator(Arc::new(
            EnergyRate::builder()
                .heat_capacity(qp(RHO_CP))
                .temperature_rate(qp(TEMPERATURE_DOT))
                .energy_rate(qp(ENERGY_DOT))
                .build()?,
        ))
        .with_evaluator(Arc::new(
            PhaseResidual::builder()
                .weighted_basis(FieldTag::new(WEIGHTED_BF, dl.node_qp_scalar.clone()))
                .weighted_grad_basis(FieldTag::new(WEIGHTED_GRAD_BF, dl.node_qp_gradient.clone()))
                .gradient(grad)
                .conductivity(qp(THERMAL_CONDUCTIVITY))
                .energy_rate(qp(ENERGY_DOT))
                .residual(residual(&dl))
                .build()?,
        )))
}

/// Trilinear basis values and gradients on the unit cube at the 2x2x2
/// Gauss points, repeated for every cell of the workset.
///
/// Returns `BF`, `wBF`, `GradBF` and `wGradBF` with their tags.
pub fn heat_roots(workset_size: usize) -> Vec<(FieldTag, Vec<f64>)> {
    let dl = heat_layouts(workset_size);
    let offset = 0.5 / 3.0f64.sqrt();
    let gauss = [0.5 - offset, 0.5 + offset];
    let weight = 1.0 / QPS as f64;
    let points: Vec<[f64; 3]> = gauss
        .iter()
        .flat_map(|&z| {
            gauss
                .iter()
                .flat_map(move |&y| gauss.into_iter().map(move |x| [x, y, z]))
        })
        .collect();

    // 1-D linear factor of a node coordinate and its derivative.
    let factor = |node: f64, x: f64| if node > 0.5 { x } else { 1.0 - x };
    let slope = |node: f64| if node > 0.5 { 1.0 } else { -1.0 };

    let mut bf = Vec::with_capacity(NODES * QPS);
    let mut gbf = Vec::with_capacity(NODES * QPS * DIMS);
    for node in &HEX_NODES {
        for p in &points {
            let f: [f64; 3] = std::array::from_fn(|d| factor(node[d], p[d]));
            bf.push(f[0] * f[1] * f[2]);
            for d in 0..DIMS {
                let mut g = slope(node[d]);
                for (e, fe) in f.iter().enumerate() {
                    if e != d {
                        g *= fe;
                    }
                }
                gbf.push(g);
            }
        }
    }

    let repeat = |cell: &[f64], scale: f64| -> Vec<f64> {
        (0..workset_size)
            .flat_map(|_| cell.iter().map(move |v| v * scale))
            .collect()
    };
    vec![
        (FieldTag::new(BF, dl.node_qp_scalar.clone()), repeat(&bf, 1.0)),
        (FieldTag::new(WEIGHTED_BF, dl.node_qp_scalar.clone()), repeat(&bf, weight)),
        (FieldTag::new(GRAD_BF, dl.node_qp_gradient.clone()), repeat(&gbf, 1.0)),
        (
            FieldTag::new(WEIGHTED_GRAD_BF, dl.node_qp_gradient.clone()),
            repeat(&gbf, weight),
        ),
    ]
}

/// A state store of `worksets` worksets whose previous temperature is
/// `old` everywhere.
pub fn heat_state(workset_size: usize, worksets: usize, old: f64) -> Result<StateStore, StateError> {
    let dl = heat_layouts(workset_size);
    let mut store = StateStore::new(worksets);
    store.register(StateVarSpec::new(TEMPERATURE, dl.qp_scalar.clone()).keep_old())?;
    let values = vec![old; dl.qp_scalar.size()];
    for ws in 0..worksets {
        store.stage(ws, TEMPERATURE, &values)?;
    }
    store.advance_time_step();
    Ok(store)
}

/// A smooth nodal temperature for `workset_size` cells.
pub fn initial_temperature(workset_size: usize) -> Vec<f64> {
    (0..workset_size * NODES)
        .map(|i| 300.0 + (i as f64 * 0.37).sin())
        .collect()
}
