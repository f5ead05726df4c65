//! Cross-step state persisted per workset.
//!
//! The [`StateStore`] owns one [`StateArrays`] set per workset. During a
//! batch, evaluators see the set of their workset read-only through the
//! [`Workset`](crate::Workset). Between batches the persistence
//! collaborator stages new values with [`StateStore::stage`]; once per
//! completed time step, [`StateStore::advance_time_step`] copies every
//! `current` array into its `old` counterpart.

use crate::id::TimeStep;
use crate::layout::FieldLayout;
use indexmap::IndexMap;
use std::fmt;

/// Suffix under which the previous-step value of a state variable is
/// looked up by name.
pub const OLD_SUFFIX: &str = "_old";

/// Initial value of a state variable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StateInit {
    /// All zeros.
    Zero,
    /// A uniform value.
    Value(f64),
}

impl StateInit {
    fn value(self) -> f64 {
        match self {
            Self::Zero => 0.0,
            Self::Value(v) => v,
        }
    }
}

/// Registration of one state variable.
#[derive(Clone, Debug, PartialEq)]
pub struct StateVarSpec {
    /// Name of the state array.
    pub name: String,
    /// Layout of one workset's array.
    pub layout: FieldLayout,
    /// Initial fill.
    pub init: StateInit,
    /// Whether a previous-step copy is kept.
    pub keep_old: bool,
    /// Whether the variable is written to simulation output.
    pub output: bool,
}

impl StateVarSpec {
    /// A state variable without history, initialized to zero.
    pub fn new(name: impl Into<String>, layout: FieldLayout) -> Self {
        Self {
            name: name.into(),
            layout,
            init: StateInit::Zero,
            keep_old: false,
            output: false,
        }
    }

    /// Set the initial value.
    pub fn init(mut self, init: StateInit) -> Self {
        self.init = init;
        self
    }

    /// Keep a previous-step copy.
    pub fn keep_old(mut self) -> Self {
        self.keep_old = true;
        self
    }

    /// Mark for output.
    pub fn output(mut self) -> Self {
        self.output = true;
        self
    }
}

/// Errors raised by state store operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateError {
    /// A variable with this name is already registered.
    DuplicateVariable {
        /// State name.
        name: String,
    },
    /// No variable of this name is registered.
    UnknownVariable {
        /// State name.
        name: String,
    },
    /// The workset index is out of range.
    UnknownWorkset {
        /// Requested index.
        index: usize,
        /// Number of worksets.
        count: usize,
    },
    /// Staged values do not match the array length.
    LengthMismatch {
        /// State name.
        name: String,
        /// Expected length.
        expected: usize,
        /// Supplied length.
        found: usize,
    },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateVariable { name } => write!(f, "state '{name}' already registered"),
            Self::UnknownVariable { name } => write!(f, "state '{name}' is not registered"),
            Self::UnknownWorkset { index, count } => {
                write!(f, "workset {index} out of range ({count} worksets)")
            }
            Self::LengthMismatch {
                name,
                expected,
                found,
            } => write!(f, "state '{name}': expected {expected} values, got {found}"),
        }
    }
}

impl std::error::Error for StateError {}

#[derive(Clone, Debug, PartialEq)]
struct StateArray {
    current: Vec<f64>,
    old: Option<Vec<f64>>,
}

/// The state arrays of one workset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateArrays {
    arrays: IndexMap<String, StateArray>,
}

impl StateArrays {
    /// Current values of a state array.
    ///
    /// A name ending in `_old` resolves to the previous-step copy of the
    /// variable without the suffix.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        if let Some(arr) = self.arrays.get(name) {
            return Some(&arr.current);
        }
        name.strip_suffix(OLD_SUFFIX).and_then(|base| self.old(base))
    }

    /// Previous-step values of a state variable registered with history.
    pub fn old(&self, name: &str) -> Option<&[f64]> {
        self.arrays.get(name).and_then(|a| a.old.as_deref())
    }

    /// Names of the arrays in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Number of arrays.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    /// Whether no array is present.
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// Named arrays persisted across worksets and time steps.
#[derive(Clone, Debug, PartialEq)]
pub struct StateStore {
    specs: IndexMap<String, StateVarSpec>,
    worksets: Vec<StateArrays>,
    step: TimeStep,
}

impl StateStore {
    /// Create a store for `workset_count` worksets.
    pub fn new(workset_count: usize) -> Self {
        Self {
            specs: IndexMap::new(),
            worksets: vec![StateArrays::default(); workset_count],
            step: TimeStep::default(),
        }
    }

    /// Register a state variable and allocate its arrays in every workset.
    pub fn register(&mut self, spec: StateVarSpec) -> Result<(), StateError> {
        if self.specs.contains_key(&spec.name) {
            return Err(StateError::DuplicateVariable { name: spec.name });
        }
        let fill = vec![spec.init.value(); spec.layout.size()];
        for ws in &mut self.worksets {
            ws.arrays.insert(
                spec.name.clone(),
                StateArray {
                    current: fill.clone(),
                    old: spec.keep_old.then(|| fill.clone()),
                },
            );
        }
        log::debug!(
            "registered state '{}' {} (old: {})",
            spec.name,
            spec.layout,
            spec.keep_old
        );
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Registered specifications in registration order.
    pub fn specs(&self) -> impl Iterator<Item = &StateVarSpec> {
        self.specs.values()
    }

    /// Number of worksets.
    pub fn workset_count(&self) -> usize {
        self.worksets.len()
    }

    /// Number of completed time steps.
    pub fn time_step(&self) -> TimeStep {
        self.step
    }

    /// The state arrays of one workset.
    pub fn workset(&self, index: usize) -> Option<&StateArrays> {
        self.worksets.get(index)
    }

    /// Stage new current values of a state array for one workset.
    ///
    /// `values` may be shorter than the array (a partial last workset);
    /// the remainder keeps its previous contents.
    pub fn stage(&mut self, workset: usize, name: &str, values: &[f64]) -> Result<(), StateError> {
        let count = self.worksets.len();
        let arrays = self
            .worksets
            .get_mut(workset)
            .ok_or(StateError::UnknownWorkset {
                index: workset,
                count,
            })?;
        let arr = arrays
            .arrays
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownVariable {
                name: name.to_string(),
            })?;
        if values.len() > arr.current.len() {
            return Err(StateError::LengthMismatch {
                name: name.to_string(),
                expected: arr.current.len(),
                found: values.len(),
            });
        }
        arr.current[..values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Close the current time step: copy `current` into `old` for every
    /// variable that keeps history, in every workset.
    pub fn advance_time_step(&mut self) -> TimeStep {
        for ws in &mut self.worksets {
            for arr in ws.arrays.values_mut() {
                if let Some(old) = arr.old.as_mut() {
                    old.copy_from_slice(&arr.current);
                }
            }
        }
        self.step = self.step.next();
        log::debug!("state advanced to time step {}", self.step);
        self.step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Dim;

    fn layout() -> FieldLayout {
        FieldLayout::new(&[(Dim::Cell, 2), (Dim::QuadPoint, 2)])
    }

    #[test]
    fn registration_fills_every_workset() {
        let mut store = StateStore::new(3);
        store
            .register(
                StateVarSpec::new("T", layout())
                    .init(StateInit::Value(300.0))
                    .keep_old(),
            )
            .unwrap();
        for i in 0..3 {
            let ws = store.workset(i).unwrap();
            assert_eq!(ws.get("T"), Some(&[300.0; 4][..]));
            assert_eq!(ws.old("T"), Some(&[300.0; 4][..]));
            assert_eq!(ws.get("T_old"), Some(&[300.0; 4][..]));
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut store = StateStore::new(1);
        store.register(StateVarSpec::new("T", layout())).unwrap();
        let err = store.register(StateVarSpec::new("T", layout())).unwrap_err();
        assert_eq!(err, StateError::DuplicateVariable { name: "T".into() });
    }

    #[test]
    fn old_lags_current_until_advance() {
        let mut store = StateStore::new(1);
        store
            .register(StateVarSpec::new("T", layout()).keep_old())
            .unwrap();
        store.stage(0, "T", &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let ws = store.workset(0).unwrap();
        assert_eq!(ws.get("T"), Some(&[1.0, 2.0, 3.0, 4.0][..]));
        assert_eq!(ws.old("T"), Some(&[0.0; 4][..]));

        assert_eq!(store.advance_time_step(), TimeStep(1));
        let ws = store.workset(0).unwrap();
        assert_eq!(ws.old("T"), Some(&[1.0, 2.0, 3.0, 4.0][..]));
    }

    #[test]
    fn variables_without_history_have_no_old() {
        let mut store = StateStore::new(1);
        store.register(StateVarSpec::new("eps", layout())).unwrap();
        let ws = store.workset(0).unwrap();
        assert!(ws.old("eps").is_none());
        assert!(ws.get("eps_old").is_none());
    }

    #[test]
    fn partial_stage_keeps_tail() {
        let mut store = StateStore::new(1);
        store
            .register(StateVarSpec::new("T", layout()).init(StateInit::Value(9.0)))
            .unwrap();
        store.stage(0, "T", &[1.0, 2.0]).unwrap();
        assert_eq!(
            store.workset(0).unwrap().get("T"),
            Some(&[1.0, 2.0, 9.0, 9.0][..])
        );
    }

    #[test]
    fn stage_errors_name_the_problem() {
        let mut store = StateStore::new(1);
        store.register(StateVarSpec::new("T", layout())).unwrap();
        assert_eq!(
            store.stage(3, "T", &[]).unwrap_err(),
            StateError::UnknownWorkset { index: 3, count: 1 }
        );
        assert_eq!(
            store.stage(0, "U", &[]).unwrap_err(),
            StateError::UnknownVariable { name: "U".into() }
        );
        assert!(matches!(
            store.stage(0, "T", &[0.0; 5]),
            Err(StateError::LengthMismatch { expected: 4, found: 5, .. })
        ));
    }
}
