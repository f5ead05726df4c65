//! Evaluation of many independent worksets.
//!
//! Worksets of one partition share no field storage, so they can be
//! evaluated concurrently. [`evaluate_parallel`] hands each `rayon`
//! worker its own copy of the manager's storage and scratch region, while
//! the evaluators themselves are shared by reference (`&self` during
//! evaluation). [`evaluate_sequential`] runs the same loop on the calling
//! thread and produces identical results.
//!
//! The caller extracts what it needs from each evaluated workset through
//! a closure, typically the residual contributions to scatter into a
//! global vector. The `_with` variants also take a `prepare` closure that
//! fills the worker's storage before each workset, so every workset can
//! gather its own roots.

use rayon::prelude::*;
use strata_core::{EvalScalar, StepError, Workset};

use crate::manager::FieldManager;
use crate::storage::FieldStorage;

// ── Error type ─────────────────────────────────────────────────────

/// Error from a batched operation, annotated with the failing workset.
#[derive(Debug, PartialEq, Eq)]
pub enum BatchError {
    /// Evaluating a workset failed.
    Step {
        /// Position of the workset in the input slice (0-based).
        workset_index: usize,
        /// The underlying error.
        error: StepError,
    },
    /// The manager has not been set up.
    NotSetUp,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchError::Step {
                workset_index,
                error,
            } => write!(f, "workset {workset_index}: {error}"),
            BatchError::NotSetUp => write!(f, "field manager is not set up"),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BatchError::Step { error, .. } => Some(error),
            BatchError::NotSetUp => None,
        }
    }
}

// ── Drivers ────────────────────────────────────────────────────────

/// Evaluate every workset on the `rayon` pool and collect `extract`'s
/// result for each, in input order.
///
/// Each worker starts from a copy of the manager's storage, so roots set
/// on the manager are visible to every workset. If several worksets fail,
/// which error is returned is unspecified.
pub fn evaluate_parallel<S, T, F>(
    manager: &FieldManager<S>,
    worksets: &[Workset<'_>],
    extract: F,
) -> Result<Vec<T>, BatchError>
where
    S: EvalScalar,
    T: Send,
    F: Fn(&Workset<'_>, &FieldStorage<S>) -> T + Sync + Send,
{
    evaluate_parallel_with(manager, worksets, |_, _| Ok(()), extract)
}

/// [`evaluate_parallel`] with a per-workset hook.
///
/// `prepare` runs on the worker's storage before each workset is
/// evaluated, typically to gather that workset's roots (nodal unknowns,
/// coordinates) from global arrays. A `prepare` error is reported like an
/// evaluation error for the same workset.
pub fn evaluate_parallel_with<S, T, P, F>(
    manager: &FieldManager<S>,
    worksets: &[Workset<'_>],
    prepare: P,
    extract: F,
) -> Result<Vec<T>, BatchError>
where
    S: EvalScalar,
    T: Send,
    P: Fn(&Workset<'_>, &mut FieldStorage<S>) -> Result<(), StepError> + Sync + Send,
    F: Fn(&Workset<'_>, &FieldStorage<S>) -> T + Sync + Send,
{
    let template = manager.new_storage().map_err(|_| BatchError::NotSetUp)?;
    log::debug!(
        "{} parallel evaluation of {} worksets",
        manager.kind(),
        worksets.len()
    );
    worksets
        .par_iter()
        .enumerate()
        .map_init(
            || (template.clone(), manager.new_scratch()),
            |(storage, scratch), (i, ws)| {
                prepare(ws, storage)
                    .and_then(|_| manager.evaluate_with(storage, scratch, ws))
                    .map(|_| extract(ws, storage))
                    .map_err(|error| BatchError::Step {
                        workset_index: i,
                        error,
                    })
            },
        )
        .collect()
}

/// Evaluate every workset on the calling thread with a single storage
/// copy and collect `extract`'s result for each, in input order.
pub fn evaluate_sequential<S, T, F>(
    manager: &FieldManager<S>,
    worksets: &[Workset<'_>],
    extract: F,
) -> Result<Vec<T>, BatchError>
where
    S: EvalScalar,
    F: Fn(&Workset<'_>, &FieldStorage<S>) -> T,
{
    evaluate_sequential_with(manager, worksets, |_, _| Ok(()), extract)
}

/// [`evaluate_sequential`] with the per-workset hook of
/// [`evaluate_parallel_with`].
pub fn evaluate_sequential_with<S, T, P, F>(
    manager: &FieldManager<S>,
    worksets: &[Workset<'_>],
    prepare: P,
    extract: F,
) -> Result<Vec<T>, BatchError>
where
    S: EvalScalar,
    P: Fn(&Workset<'_>, &mut FieldStorage<S>) -> Result<(), StepError>,
    F: Fn(&Workset<'_>, &FieldStorage<S>) -> T,
{
    let mut storage = manager.new_storage().map_err(|_| BatchError::NotSetUp)?;
    let mut scratch = manager.new_scratch();
    let mut results = Vec::with_capacity(worksets.len());
    for (i, ws) in worksets.iter().enumerate() {
        prepare(ws, &mut storage)
            .and_then(|_| manager.evaluate_with(&mut storage, &mut scratch, ws))
            .map_err(|error| BatchError::Step {
                workset_index: i,
                error,
            })?;
        results.push(extract(ws, &storage));
    }
    Ok(results)
}
