//! Scalar types evaluated by the engine.
//!
//! Every evaluator is written once, generically over [`EvalScalar`], and
//! instantiated per [`ScalarKind`]: plain `f64` for residuals and the
//! forward-mode dual number [`Fad`] for Jacobians and parameter tangents.

use num::{One, Zero};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Numeric mode a field manager evaluates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    /// Plain values.
    Residual,
    /// Values plus derivatives with respect to local unknowns.
    Jacobian,
    /// Values plus derivatives with respect to named parameters.
    Tangent,
}

impl ScalarKind {
    /// Every kind, in dispatch order.
    pub const ALL: [ScalarKind; 3] = [Self::Residual, Self::Jacobian, Self::Tangent];

    /// Whether values of this kind carry derivatives.
    pub fn is_derivative(self) -> bool {
        !matches!(self, Self::Residual)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Residual => f.write_str("residual"),
            Self::Jacobian => f.write_str("jacobian"),
            Self::Tangent => f.write_str("tangent"),
        }
    }
}

/// Arithmetic required of every field value.
///
/// Mixed arithmetic with `f64` operands is available for constants that do
/// not depend on any unknown.
pub trait EvalScalar:
    Copy
    + fmt::Debug
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
{
    /// A constant with no derivative content.
    fn from_f64(v: f64) -> Self;

    /// An independent variable seeded in derivative slot `index`, or
    /// `None` when `index` is not below [`derivative_capacity()`](Self::derivative_capacity).
    ///
    /// Plain values carry no derivatives, so for them this is always
    /// `Some(value)`.
    fn try_variable(value: f64, index: usize) -> Option<Self>;

    /// An independent variable seeded in derivative slot `index`.
    ///
    /// For plain values this is just `value`.
    ///
    /// # Panics
    ///
    /// Panics if a derivative type has no slot `index`. Use
    /// [`try_variable()`](Self::try_variable) when the slot comes from
    /// runtime data.
    fn variable(value: f64, index: usize) -> Self;

    /// The value part.
    fn value(&self) -> f64;

    /// The derivative in slot `index` (zero when absent).
    fn derivative(&self, index: usize) -> f64;

    /// Number of derivative slots carried.
    fn derivative_capacity() -> usize;

    /// Natural exponential.
    fn exp(self) -> Self;

    /// Natural logarithm.
    fn ln(self) -> Self;

    /// Power with a constant exponent.
    fn powf(self, p: f64) -> Self;

    /// Square root.
    fn sqrt(self) -> Self;

    /// Whether the value and every derivative are finite.
    fn is_finite(&self) -> bool;
}

impl EvalScalar for f64 {
    fn from_f64(v: f64) -> Self {
        v
    }

    fn try_variable(value: f64, _index: usize) -> Option<Self> {
        Some(value)
    }

    fn variable(value: f64, _index: usize) -> Self {
        value
    }

    fn value(&self) -> f64 {
        *self
    }

    fn derivative(&self, _index: usize) -> f64 {
        0.0
    }

    fn derivative_capacity() -> usize {
        0
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn powf(self, p: f64) -> Self {
        f64::powf(self, p)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn is_finite(&self) -> bool {
        f64::is_finite(*self)
    }
}

// ── Dual numbers ────────────────────────────────────────────────

/// Derivative capacity of [`Fad`].
pub const FAD_CAPACITY: usize = 16;

/// Forward-mode AD scalar used by the derivative modes.
pub type Fad = Dual<FAD_CAPACITY>;

/// Forward-mode dual number with `N` derivative slots.
///
/// Ordering compares values only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dual<const N: usize> {
    val: f64,
    eps: [f64; N],
}

impl<const N: usize> Dual<N> {
    /// A constant.
    pub fn constant(val: f64) -> Self {
        Self { val, eps: [0.0; N] }
    }

    /// Build from a value and an explicit derivative vector.
    pub fn with_derivatives(val: f64, eps: [f64; N]) -> Self {
        Self { val, eps }
    }

    /// All derivative slots.
    pub fn derivatives(&self) -> &[f64; N] {
        &self.eps
    }

    fn map_eps(self, val: f64, scale: f64) -> Self {
        let mut eps = self.eps;
        for e in &mut eps {
            *e *= scale;
        }
        Self { val, eps }
    }
}

impl<const N: usize> Default for Dual<N> {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl<const N: usize> PartialOrd for Dual<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.val.partial_cmp(&other.val)
    }
}

impl<const N: usize> fmt::Display for Dual<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.val)?;
        for (i, e) in self.eps.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{e}")?;
        }
        f.write_str("]")
    }
}

impl<const N: usize> Add for Dual<N> {
    type Output = Self;
    fn add(mut self, rhs: Self) -> Self {
        self.val += rhs.val;
        for (a, b) in self.eps.iter_mut().zip(rhs.eps) {
            *a += b;
        }
        self
    }
}

impl<const N: usize> Sub for Dual<N> {
    type Output = Self;
    fn sub(mut self, rhs: Self) -> Self {
        self.val -= rhs.val;
        for (a, b) in self.eps.iter_mut().zip(rhs.eps) {
            *a -= b;
        }
        self
    }
}

impl<const N: usize> Mul for Dual<N> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let mut eps = [0.0; N];
        for (i, e) in eps.iter_mut().enumerate() {
            *e = self.eps[i] * rhs.val + self.val * rhs.eps[i];
        }
        Self {
            val: self.val * rhs.val,
            eps,
        }
    }
}

impl<const N: usize> Div for Dual<N> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let inv = 1.0 / rhs.val;
        let val = self.val * inv;
        let mut eps = [0.0; N];
        for (i, e) in eps.iter_mut().enumerate() {
            *e = (self.eps[i] - val * rhs.eps[i]) * inv;
        }
        Self { val, eps }
    }
}

impl<const N: usize> Neg for Dual<N> {
    type Output = Self;
    fn neg(self) -> Self {
        self.map_eps(-self.val, -1.0)
    }
}

impl<const N: usize> Add<f64> for Dual<N> {
    type Output = Self;
    fn add(mut self, rhs: f64) -> Self {
        self.val += rhs;
        self
    }
}

impl<const N: usize> Sub<f64> for Dual<N> {
    type Output = Self;
    fn sub(mut self, rhs: f64) -> Self {
        self.val -= rhs;
        self
    }
}

impl<const N: usize> Mul<f64> for Dual<N> {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        self.map_eps(self.val * rhs, rhs)
    }
}

impl<const N: usize> Div<f64> for Dual<N> {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        let inv = 1.0 / rhs;
        self.map_eps(self.val * inv, inv)
    }
}

impl<const N: usize> AddAssign for Dual<N> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<const N: usize> SubAssign for Dual<N> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<const N: usize> MulAssign for Dual<N> {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<const N: usize> DivAssign for Dual<N> {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl<const N: usize> Zero for Dual<N> {
    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps.iter().all(|e| *e == 0.0)
    }
}

impl<const N: usize> One for Dual<N> {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl<const N: usize> EvalScalar for Dual<N> {
    fn from_f64(v: f64) -> Self {
        Self::constant(v)
    }

    fn try_variable(value: f64, index: usize) -> Option<Self> {
        let mut d = Self::constant(value);
        *d.eps.get_mut(index)? = 1.0;
        Some(d)
    }

    fn variable(value: f64, index: usize) -> Self {
        match Self::try_variable(value, index) {
            Some(d) => d,
            None => panic!("derivative slot {index} exceeds capacity {N}"),
        }
    }

    fn value(&self) -> f64 {
        self.val
    }

    fn derivative(&self, index: usize) -> f64 {
        self.eps.get(index).copied().unwrap_or(0.0)
    }

    fn derivative_capacity() -> usize {
        N
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        self.map_eps(e, e)
    }

    fn ln(self) -> Self {
        self.map_eps(self.val.ln(), 1.0 / self.val)
    }

    fn powf(self, p: f64) -> Self {
        let val = self.val.powf(p);
        self.map_eps(val, p * self.val.powf(p - 1.0))
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        self.map_eps(s, 0.5 / s)
    }

    fn is_finite(&self) -> bool {
        self.val.is_finite() && self.eps.iter().all(|e| e.is_finite())
    }
}
