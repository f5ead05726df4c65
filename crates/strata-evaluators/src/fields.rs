//! Conventional field names of a heat problem.
//!
//! The evaluators take full [`FieldTag`](strata_core::FieldTag)s and do not
//! depend on these names; they exist so that independently configured
//! evaluators agree on what to call shared fields.

/// Basis function values at the quadrature points.
pub const BF: &str = "BF";
/// Basis values times integration weights.
pub const WEIGHTED_BF: &str = "wBF";
/// Basis function gradients at the quadrature points.
pub const GRAD_BF: &str = "GradBF";
/// Basis gradients times integration weights.
pub const WEIGHTED_GRAD_BF: &str = "wGradBF";
/// Temperature, nodal or at the quadrature points.
pub const TEMPERATURE: &str = "Temperature";
/// Temperature gradient.
pub const TEMPERATURE_GRADIENT: &str = "Temperature Gradient";
/// Temperature time rate.
pub const TEMPERATURE_DOT: &str = "Temperature Dot";
/// Thermal conductivity.
pub const THERMAL_CONDUCTIVITY: &str = "Thermal Conductivity";
/// Volumetric heat capacity `ρc_p`.
pub const RHO_CP: &str = "Rho Cp";
/// Stored-energy rate.
pub const ENERGY_DOT: &str = "Energy Dot";
/// Conductive heat flux.
pub const HEAT_FLUX: &str = "Heat Flux";
/// Volumetric heat source.
pub const SOURCE: &str = "Source";
/// Laser heat source.
pub const LASER_SOURCE: &str = "Laser Source";
/// Nodal temperature residual.
pub const TEMPERATURE_RESIDUAL: &str = "Temperature Residual";
