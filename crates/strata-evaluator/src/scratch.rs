//! Pre-allocated scratch memory for evaluators.
//!
//! Each evaluator declares [`scratch_len()`](crate::Evaluator::scratch_len)
//! after setup. The field manager pre-allocates the maximum across all
//! evaluators and resets the bump pointer between each `evaluate()` call.

use strata_core::EvalScalar;

/// Bump-allocated scratch region reset between evaluators.
///
/// Prevents heap allocation in the per-workset loop. Slots have the scalar
/// type of the evaluation mode, so temporaries carry derivatives too.
#[derive(Clone, Debug)]
pub struct ScratchRegion<S> {
    buf: Vec<S>,
    offset: usize,
}

impl<S: EvalScalar> ScratchRegion<S> {
    /// Create a scratch region with room for `capacity` scalars.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![S::zero(); capacity],
            offset: 0,
        }
    }

    /// Allocate `count` contiguous scalars, zero-initialized.
    ///
    /// Returns `None` if insufficient capacity remains.
    pub fn alloc(&mut self, count: usize) -> Option<&mut [S]> {
        let new_offset = self.offset.checked_add(count)?;
        if new_offset > self.buf.len() {
            return None;
        }
        let start = self.offset;
        self.offset = new_offset;
        let slice = &mut self.buf[start..new_offset];
        slice.fill(S::zero());
        Some(slice)
    }

    /// Reset the bump pointer. Called between evaluators.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Total capacity in scalars.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Scalars used since last reset.
    pub fn used(&self) -> usize {
        self.offset
    }

    /// Remaining available scalars.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::Fad;

    #[test]
    fn alloc_and_reset() {
        let mut s = ScratchRegion::<f64>::new(10);
        assert_eq!(s.capacity(), 10);
        assert_eq!(s.remaining(), 10);

        let a = s.alloc(4).unwrap();
        assert_eq!(a.len(), 4);
        assert!(a.iter().all(|&v| v == 0.0));
        assert_eq!(s.used(), 4);
        assert_eq!(s.remaining(), 6);

        let b = s.alloc(6).unwrap();
        assert_eq!(b.len(), 6);
        assert_eq!(s.remaining(), 0);

        assert!(s.alloc(1).is_none());

        s.reset();
        assert_eq!(s.used(), 0);
        assert_eq!(s.remaining(), 10);
    }

    #[test]
    fn zero_capacity() {
        let mut s = ScratchRegion::<f64>::new(0);
        assert!(s.alloc(1).is_none());
        assert!(s.alloc(0).is_some_and(|a| a.is_empty()));
    }

    #[test]
    fn realloc_after_reset_is_zeroed() {
        let mut s = ScratchRegion::<Fad>::new(2);
        let a = s.alloc(2).unwrap();
        a[0] = Fad::variable(3.0, 1);
        s.reset();
        let b = s.alloc(2).unwrap();
        assert_eq!(b[0], Fad::constant(0.0));
    }
}
