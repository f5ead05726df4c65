//! Core types and traits for the Strata field evaluation engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other crate in the workspace: field
//! tags and layouts, the scalar types evaluated in each mode, worksets,
//! the cross-step state store, error types and the field access traits.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod field;
pub mod id;
pub mod layout;
pub mod scalar;
pub mod state;
pub mod topology;
pub mod traits;
pub mod workset;

pub use error::{ConfigError, EvaluatorError, StepError};
pub use field::{FieldRegistry, FieldSet, FieldSetIter, FieldTag};
pub use id::{FieldId, GlobalId, TimeStep};
pub use layout::{Dim, FieldLayout, LayoutExtents, Layouts, SideLayouts};
pub use scalar::{Dual, EvalScalar, Fad, ScalarKind, FAD_CAPACITY};
pub use state::{StateArrays, StateError, StateInit, StateStore, StateVarSpec, OLD_SUFFIX};
pub use topology::CellTopology;
pub use traits::{FieldReader, FieldWriter};
pub use workset::{SideRef, Workset, MIN_STEP_SIZE};
