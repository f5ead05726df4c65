//! Evaluator trait, evaluation context and dependency graph builder.
//!
//! The [`Evaluator`] trait is the plugin contract: an evaluator declares
//! the fields it requires and produces, binds handles at setup, and
//! computes its outputs for one workset at a time through an
//! [`EvalContext`]. [`build_graph`] turns a registration list into an
//! [`EvaluationPlan`] with a deterministic execution order.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bindings;
pub mod context;
pub mod evaluator;
pub mod factory;
pub mod graph;
pub mod guard;
pub mod scratch;

pub use bindings::{FieldBindings, FieldHandle};
pub use context::EvalContext;
pub use evaluator::Evaluator;
pub use factory::{EvaluatorFactory, EvaluatorTemplate};
pub use graph::{
    build_graph, build_graph_from_decls, DuplicateProducer, EvaluationPlan, EvaluatorDecl,
    GraphBuildError, MissingDependency,
};
pub use guard::FullWriteGuard;
pub use scratch::ScratchRegion;
