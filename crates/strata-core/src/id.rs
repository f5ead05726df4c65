//! Strongly-typed identifiers.

use std::fmt;

/// Identifies an interned field tag within one compiled evaluation graph.
///
/// Assigned densely by [`FieldRegistry`](crate::FieldRegistry): external
/// roots first, then the fields of each evaluator in registration order.
/// `FieldId(n)` is only meaningful for the registry that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

impl FieldId {
    /// The id as a storage index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for FieldId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Global (partition-independent) index of a mesh entity such as a cell
/// or node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GlobalId(pub u64);

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for GlobalId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Monotonically increasing time-step counter.
///
/// Incremented by the state store each time a step completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TimeStep(pub u64);

impl TimeStep {
    /// The step after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TimeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TimeStep {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_step_next_increments() {
        assert_eq!(TimeStep(0).next(), TimeStep(1));
        assert_eq!(TimeStep(41).next().to_string(), "42");
    }

    #[test]
    fn field_id_index_matches_raw() {
        assert_eq!(FieldId::from(7).index(), 7);
    }
}
