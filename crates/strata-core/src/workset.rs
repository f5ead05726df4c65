//! Worksets: the batch of mesh cells evaluated together.

use crate::id::{GlobalId, TimeStep};
use crate::state::StateArrays;
use indexmap::IndexMap;

/// Step size substituted when a workset reports a step size of exactly
/// zero, so that rates computed by division stay finite.
pub const MIN_STEP_SIZE: f64 = 1.0e-15;

/// A boundary side: a workset-local cell and one of its local sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SideRef {
    /// Workset-local cell index.
    pub cell: usize,
    /// Local side index within the cell topology.
    pub side: usize,
}

/// One batch of cells plus the metadata evaluators may consult.
///
/// The state arrays are borrowed read-only for the lifetime of the
/// workset, so the state store cannot be advanced mid-batch.
#[derive(Clone, Debug)]
pub struct Workset<'s> {
    index: usize,
    cell_count: usize,
    global_cells: Vec<GlobalId>,
    global_nodes: Vec<GlobalId>,
    time: f64,
    step_size: f64,
    time_step: TimeStep,
    side_sets: IndexMap<String, Vec<SideRef>>,
    state: &'s StateArrays,
}

impl<'s> Workset<'s> {
    /// A workset of `cell_count` cells reading the given state arrays.
    pub fn new(cell_count: usize, state: &'s StateArrays) -> Self {
        Self {
            index: 0,
            cell_count,
            global_cells: Vec::new(),
            global_nodes: Vec::new(),
            time: 0.0,
            step_size: 0.0,
            time_step: TimeStep::default(),
            side_sets: IndexMap::new(),
            state,
        }
    }

    /// Set the workset's ordinal within the partition.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Set the global ids of the cells.
    pub fn with_global_cells(mut self, ids: Vec<GlobalId>) -> Self {
        self.global_cells = ids;
        self
    }

    /// Set the global ids of the cell nodes, cell-major.
    pub fn with_global_nodes(mut self, ids: Vec<GlobalId>) -> Self {
        self.global_nodes = ids;
        self
    }

    /// Set the current time and step size.
    pub fn with_time(mut self, time: f64, step_size: f64) -> Self {
        self.time = time;
        self.step_size = step_size;
        self
    }

    /// Set the time-step counter.
    pub fn with_time_step(mut self, step: TimeStep) -> Self {
        self.time_step = step;
        self
    }

    /// Attach a named side set.
    pub fn with_side_set(mut self, name: impl Into<String>, sides: Vec<SideRef>) -> Self {
        self.side_sets.insert(name.into(), sides);
        self
    }

    /// Ordinal within the partition.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of valid cells.
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Global ids of the cells (may be empty if not supplied).
    pub fn global_cells(&self) -> &[GlobalId] {
        &self.global_cells
    }

    /// Global ids of the cell nodes, cell-major.
    pub fn global_nodes(&self) -> &[GlobalId] {
        &self.global_nodes
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Step size as supplied.
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// Step size for use as a divisor: [`MIN_STEP_SIZE`] replaces an exact
    /// zero.
    pub fn effective_step_size(&self) -> f64 {
        if self.step_size == 0.0 {
            MIN_STEP_SIZE
        } else {
            self.step_size
        }
    }

    /// Time-step counter.
    pub fn time_step(&self) -> TimeStep {
        self.time_step
    }

    /// The sides of a named side set, or `None` if the set does not touch
    /// this workset.
    pub fn side_set(&self, name: &str) -> Option<&[SideRef]> {
        self.side_sets.get(name).map(Vec::as_slice)
    }

    /// Read-only state arrays of this workset.
    pub fn state(&self) -> &'s StateArrays {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_step_size_is_floored() {
        let state = StateArrays::default();
        let ws = Workset::new(1, &state).with_time(0.0, 0.0);
        assert_eq!(ws.step_size(), 0.0);
        assert_eq!(ws.effective_step_size(), MIN_STEP_SIZE);
        assert!((1.0 / ws.effective_step_size()).is_finite());
    }

    #[test]
    fn non_zero_step_size_is_kept() {
        let state = StateArrays::default();
        let ws = Workset::new(1, &state).with_time(2.0, -0.5);
        assert_eq!(ws.effective_step_size(), -0.5);
        assert_eq!(ws.time(), 2.0);
    }

    #[test]
    fn side_sets_are_looked_up_by_name() {
        let state = StateArrays::default();
        let sides = vec![SideRef { cell: 0, side: 2 }];
        let ws = Workset::new(3, &state)
            .with_index(4)
            .with_side_set("top", sides.clone());
        assert_eq!(ws.side_set("top"), Some(sides.as_slice()));
        assert_eq!(ws.side_set("bottom"), None);
        assert_eq!(ws.index(), 4);
        assert_eq!(ws.cell_count(), 3);
    }
}
