//! Field manager and execution engine for Strata.
//!
//! A [`FieldManager`] owns the evaluators of one scalar kind, compiles
//! their dependency graph once per registration change and evaluates
//! worksets in topological order. [`EvaluationModes`] keeps one
//! independent manager per configured [`ScalarKind`](strata_core::ScalarKind),
//! and [`batched`] spreads independent worksets over a `rayon` pool.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod batched;
pub mod config;
pub mod dispatch;
pub mod manager;
pub mod metrics;
pub mod storage;

pub use batched::{
    evaluate_parallel, evaluate_parallel_with, evaluate_sequential, evaluate_sequential_with,
    BatchError,
};
pub use config::{EngineConfig, SetupError};
pub use dispatch::EvaluationModes;
pub use manager::{ExportError, FieldManager};
pub use metrics::EvalMetrics;
pub use storage::{FieldStorage, OutputSet};
