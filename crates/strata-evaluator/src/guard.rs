//! Coverage checking for outputs that must be fully overwritten.
//!
//! The engine never clears storage between worksets, so an evaluator that
//! forgets part of its output silently leaks values from the previous
//! batch. [`FullWriteGuard`] wraps the valid range of such an output and,
//! in debug builds, records every entry written through it. Dropping a
//! guard with unwritten entries logs a warning naming the evaluator, the
//! field and the first cell left stale. Release builds keep only the
//! slice.

use strata_core::FieldId;

/// Write access to an output's valid range with debug coverage tracking.
///
/// Obtained from [`EvalContext::output_guarded`](crate::EvalContext::output_guarded).
pub struct FullWriteGuard<'a, S> {
    data: &'a mut [S],
    per_cell: usize,
    #[cfg(debug_assertions)]
    written: Vec<bool>,
    #[cfg(debug_assertions)]
    evaluator: &'a str,
    #[cfg(debug_assertions)]
    field: FieldId,
}

impl<'a, S: Copy> FullWriteGuard<'a, S> {
    /// Wrap `data`, whose entries are grouped `per_cell` to a cell.
    pub fn new(
        data: &'a mut [S],
        per_cell: usize,
        #[cfg_attr(not(debug_assertions), allow(unused_variables))] evaluator: &'a str,
        #[cfg_attr(not(debug_assertions), allow(unused_variables))] field: FieldId,
    ) -> Self {
        Self {
            #[cfg(debug_assertions)]
            written: vec![false; data.len()],
            #[cfg(debug_assertions)]
            evaluator,
            #[cfg(debug_assertions)]
            field,
            per_cell: per_cell.max(1),
            data,
        }
    }

    /// Store `value` at flat index `index`.
    pub fn set(&mut self, index: usize, value: S) {
        self.data[index] = value;
        #[cfg(debug_assertions)]
        {
            self.written[index] = true;
        }
    }

    /// The entries of `cell`, all counted as written.
    pub fn cell_mut(&mut self, cell: usize) -> &mut [S] {
        let range = cell * self.per_cell..(cell + 1) * self.per_cell;
        #[cfg(debug_assertions)]
        {
            self.written[range.clone()].fill(true);
        }
        &mut self.data[range]
    }

    /// Overwrite every entry with `value`.
    pub fn fill(&mut self, value: S) {
        self.data.fill(value);
        self.mark_complete();
    }

    /// Number of cells in the guarded range.
    pub fn cells(&self) -> usize {
        self.data.len() / self.per_cell
    }

    /// Entries in the guarded range.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the guarded range is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries not yet written. Always zero in release builds.
    pub fn missing(&self) -> usize {
        #[cfg(debug_assertions)]
        {
            self.written.iter().filter(|w| !**w).count()
        }
        #[cfg(not(debug_assertions))]
        {
            0
        }
    }

    /// The lowest cell with an unwritten entry.
    pub fn first_stale_cell(&self) -> Option<usize> {
        #[cfg(debug_assertions)]
        {
            self.written.iter().position(|w| !*w).map(|i| i / self.per_cell)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    }

    /// Count everything as written, e.g. after writing through a
    /// different path.
    pub fn mark_complete(&mut self) {
        #[cfg(debug_assertions)]
        {
            self.written.fill(true);
        }
    }
}

#[cfg(debug_assertions)]
impl<S> Drop for FullWriteGuard<'_, S> {
    fn drop(&mut self) {
        let missing = self.written.iter().filter(|w| !**w).count();
        if missing == 0 {
            return;
        }
        let cell = self.written.iter().position(|w| !*w).map_or(0, |i| i / self.per_cell);
        log::warn!(
            "evaluator '{}' left {missing} of {} entries of field {} unwritten (first stale cell {cell})",
            self.evaluator,
            self.written.len(),
            self.field,
        );
    }
}
