//! Strata: dependency-driven evaluation of finite-element fields.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Strata sub-crates. Evaluators declare the fields they read and
//! write; the engine orders them, allocates storage and runs them over
//! batches of cells, once per scalar kind (plain residual values or
//! forward-mode derivatives).
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use strata::prelude::*;
//!
//! let dl = Layouts::new(LayoutExtents {
//!     workset_size: 4,
//!     vertices: 2,
//!     nodes: 2,
//!     qps: 2,
//!     dims: 1,
//!     vec_dim: None,
//!     faces: 2,
//! });
//! let k = FieldTag::new("k", dl.qp_scalar.clone());
//! let config = EngineConfig::new(4)
//!     .with_kinds(&[ScalarKind::Residual, ScalarKind::Jacobian])
//!     .with_required(k.clone())
//!     .with_evaluator(Arc::new(
//!         ConstantField::builder().output(k.clone()).value(2.0).build()?,
//!     ));
//! let mut modes = EvaluationModes::new(config)?;
//! modes.post_registration_setup()?;
//!
//! // A partial batch of three cells.
//! let state = StateArrays::default();
//! modes.evaluate(ScalarKind::Residual, &Workset::new(3, &state))?;
//! let values = modes.residual()?.field(&k).unwrap_or_default();
//! assert_eq!(values[..6], [2.0; 6]);
//! assert_eq!(values[6..], [0.0; 2]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `strata-core` | Tags, layouts, scalars, worksets, state, errors |
//! | [`evaluator`] | `strata-evaluator` | Evaluator trait, context, graph builder |
//! | [`engine`] | `strata-engine` | Field manager, mode dispatch, batched evaluation |
//! | [`evaluators`] | `strata-evaluators` | Heat transfer and phase-change evaluators |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, traits and errors (`strata-core`).
///
/// Field tags and layouts, the [`types::EvalScalar`] trait with its
/// [`types::Fad`] implementation, worksets and the state store.
pub use strata_core as types;

/// The evaluator trait and dependency graph (`strata-evaluator`).
///
/// [`evaluator::Evaluator`] is the main extension point for user-defined
/// physics.
pub use strata_evaluator as evaluator;

/// Field managers and evaluation modes (`strata-engine`).
///
/// [`engine::EvaluationModes`] drives one [`engine::FieldManager`] per
/// scalar kind; [`engine::evaluate_parallel`] spreads worksets over a
/// thread pool.
pub use strata_engine as engine;

/// Reference physics evaluators (`strata-evaluators`).
pub use strata_evaluators as evaluators;

/// Common imports for typical Strata usage.
///
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use strata_core::{
        CellTopology, Dim, EvalScalar, Fad, FieldLayout, FieldTag, LayoutExtents, Layouts,
        ScalarKind, SideLayouts, SideRef, StateArrays, StateStore, StateVarSpec, Workset,
    };

    // Errors
    pub use strata_core::{ConfigError, EvaluatorError, StepError};

    // Evaluator authoring
    pub use strata_evaluator::{
        EvalContext, Evaluator, EvaluatorFactory, EvaluatorTemplate, FieldBindings, FieldHandle,
    };

    // Engine
    pub use strata_engine::{
        evaluate_parallel, evaluate_parallel_with, EngineConfig, EvaluationModes, FieldManager,
        FieldStorage, SetupError,
    };

    // Evaluators
    pub use strata_evaluators::{
        ConstantField, DiffusionCoefficient, DofGradInterpolation, DofInterpolation, EnergyRate,
        HeatFlux, PhaseResidual, TemperatureRate,
    };
}
