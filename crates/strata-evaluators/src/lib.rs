//! Heat transfer and phase-change evaluators for Strata.
//!
//! Every evaluator here is generic over the scalar type, so one
//! registration serves residual, Jacobian and tangent evaluation alike.
//! Each is configured through a builder whose `build()` validates the
//! declared fields, and doubles as its own
//! [`EvaluatorTemplate`](strata_evaluator::EvaluatorTemplate).
//!
//! # A transient heat problem
//!
//! 1. [`DofInterpolation`] and [`DofGradInterpolation`]: nodal `T` to
//!    quadrature-point `T` and `∇T`.
//! 2. [`TemperatureRate`]: `Ṫ` from `T` and the previous step's state.
//! 3. [`EnergyRate`]: `ė = ρc_p Ṫ`.
//! 4. [`PhaseResidual`]: the nodal residual, or [`HeatFlux`] followed by
//!    [`DiffusionResidual`] for pure conduction.
//!
//! [`GeoFluxHeat`] adds a boundary contribution on a named side set, while
//! [`DiffusionCoefficient`] and [`MixtureSpecificHeat`] supply material
//! properties.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod constant;
pub mod fields;
pub mod geo_flux;
pub mod heat_flux;
pub mod interpolation;
pub mod material;
pub mod phase_residual;
pub mod rate;
mod support;

pub use constant::ConstantField;
pub use geo_flux::{GeoFlux, GeoFluxHeat, DEFAULT_GEO_FLUX, SUPG_SCALE};
pub use heat_flux::{DiffusionResidual, HeatFlux};
pub use interpolation::{DofGradInterpolation, DofInterpolation};
pub use material::{DiffusionCoefficient, MixtureSpecificHeat, GAS_CONSTANT};
pub use phase_residual::PhaseResidual;
pub use rate::{EnergyRate, TemperatureRate};

#[cfg(test)]
pub(crate) mod testing;
