//! Per-workset performance metrics for the field manager.
//!
//! [`EvalMetrics`] captures timing data for a single `evaluate_fields`
//! call, enabling profiling of individual evaluators.

/// Timing and sizing metrics collected while evaluating one workset.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvalMetrics {
    /// Wall-clock time for the whole workset, in microseconds.
    pub total_us: u64,
    /// Per-evaluator execution times in execution order: `(name, microseconds)`.
    pub evaluator_us: Vec<(String, u64)>,
    /// Ordinal of the evaluated workset.
    pub workset: usize,
    /// Valid cells in the evaluated workset.
    pub cell_count: usize,
    /// Bytes held by the field storage the workset was evaluated into.
    pub memory_bytes: usize,
}

impl EvalMetrics {
    /// Time spent in the named evaluator, if it ran.
    pub fn evaluator(&self, name: &str) -> Option<u64> {
        self.evaluator_us
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, us)| us)
    }
}
