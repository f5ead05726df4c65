//! Test utilities and mock types for Strata development.
//!
//! Provides mock implementations of the field access traits
//! ([`FieldReader`], [`FieldWriter`]) and reusable fixture evaluators.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{ConstEvaluator, CopyEvaluator, FailingEvaluator};

use std::collections::HashMap;

use strata_core::{Dim, EvalScalar, FieldId, FieldLayout, FieldReader, FieldTag, FieldWriter};

/// Mock implementation of [`FieldReader`].
///
/// Backed by a `HashMap<FieldId, Vec<S>>` for flexible test setup.
/// Pre-populate fields with [`set_field`](MockFieldReader::set_field)
/// before passing to code under test.
pub struct MockFieldReader<S> {
    fields: HashMap<FieldId, Vec<S>>,
}

impl<S> MockFieldReader<S> {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    /// Pre-populate a field with data for testing.
    pub fn set_field(&mut self, field: FieldId, data: Vec<S>) {
        self.fields.insert(field, data);
    }
}

impl<S> Default for MockFieldReader<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> FieldReader<S> for MockFieldReader<S> {
    fn read(&self, field: FieldId) -> Option<&[S]> {
        self.fields.get(&field).map(|v| v.as_slice())
    }
}

/// Mock implementation of [`FieldWriter`].
///
/// Pre-allocate field buffers with [`add_field`](MockFieldWriter::add_field),
/// then pass to code under test. Inspect results with
/// [`get_field`](MockFieldWriter::get_field).
pub struct MockFieldWriter<S> {
    fields: HashMap<FieldId, Vec<S>>,
}

impl<S: EvalScalar> MockFieldWriter<S> {
    /// Pre-allocate a field buffer with the given size, initialized to zero.
    pub fn add_field(&mut self, field: FieldId, size: usize) {
        self.fields.insert(field, vec![S::zero(); size]);
    }
}

impl<S> MockFieldWriter<S> {
    pub fn new() -> Self {
        Self {
            fields: HashMap::new(),
        }
    }

    /// Read back the current field data for test assertions.
    pub fn get_field(&self, field: FieldId) -> Option<&[S]> {
        self.fields.get(&field).map(|v| v.as_slice())
    }
}

impl<S> Default for MockFieldWriter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> FieldWriter<S> for MockFieldWriter<S> {
    fn write(&mut self, field: FieldId) -> Option<&mut [S]> {
        self.fields.get_mut(&field).map(|v| v.as_mut_slice())
    }
}

/// A field tag with one value per cell.
pub fn cell_tag(name: &str, cells: usize) -> FieldTag {
    FieldTag::new(name, FieldLayout::new(&[(Dim::Cell, cells)]))
}

