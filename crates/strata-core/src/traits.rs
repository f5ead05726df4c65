//! Field access traits used by evaluators.

use crate::id::FieldId;

/// Read-only access to field data during evaluation.
///
/// Implemented by field storage to give evaluators their inputs. Returns
/// `None` if the field is not readable in the current context.
pub trait FieldReader<S> {
    /// Read the data for a field as a flat row-major slice.
    ///
    /// Returns `None` if the field ID is invalid or not readable.
    fn read(&self, field: FieldId) -> Option<&[S]>;
}

/// Mutable access to field data during evaluation.
///
/// Implemented by the per-evaluator write set, which only exposes the
/// fields the running evaluator declared as outputs. Returns `None` for
/// anything else.
pub trait FieldWriter<S> {
    /// Get a mutable slice for writing field data.
    ///
    /// Returns `None` if the field ID is invalid or not writable.
    fn write(&mut self, field: FieldId) -> Option<&mut [S]>;
}
