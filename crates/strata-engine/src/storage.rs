//! Field storage owned by a field manager.
//!
//! [`FieldStorage`] holds one buffer per interned field, sized by the
//! field's layout. While an evaluator runs, its declared outputs are moved
//! into an [`OutputSet`] and moved back afterwards. Moving a `Vec` swaps
//! three words; no values are copied and nothing is reallocated.

use smallvec::SmallVec;
use strata_core::{EvalScalar, FieldId, FieldReader, FieldRegistry, FieldWriter};

/// Dense per-field buffers indexed by [`FieldId`].
#[derive(Clone, Debug)]
pub struct FieldStorage<S> {
    buffers: Vec<Vec<S>>,
}

impl<S: EvalScalar> FieldStorage<S> {
    /// Allocate a zeroed buffer for every field in `registry`.
    pub fn allocate(registry: &FieldRegistry) -> Self {
        let buffers = registry
            .iter()
            .map(|(_, tag)| vec![S::zero(); tag.layout().size()])
            .collect();
        Self { buffers }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no fields are stored.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Full buffer of a field.
    pub fn get(&self, field: FieldId) -> Option<&[S]> {
        self.buffers.get(field.index()).map(Vec::as_slice)
    }

    /// Mutable full buffer of a field.
    pub fn get_mut(&mut self, field: FieldId) -> Option<&mut [S]> {
        self.buffers.get_mut(field.index()).map(Vec::as_mut_slice)
    }

    /// Move the buffers of `fields` out into a write set.
    ///
    /// Until [`restore`](Self::restore) is called, the taken fields read as
    /// empty.
    pub fn take_outputs(&mut self, fields: &[FieldId]) -> OutputSet<S> {
        let mut set = OutputSet {
            fields: SmallVec::new(),
        };
        for &field in fields {
            if let Some(buf) = self.buffers.get_mut(field.index()) {
                set.fields.push((field, std::mem::take(buf)));
            }
        }
        set
    }

    /// Move the buffers of a write set back.
    pub fn restore(&mut self, set: OutputSet<S>) {
        for (field, buf) in set.fields {
            if let Some(slot) = self.buffers.get_mut(field.index()) {
                *slot = buf;
            }
        }
    }

    /// Bytes held by all buffers.
    pub fn memory_bytes(&self) -> usize {
        self.buffers
            .iter()
            .map(|b| b.capacity() * std::mem::size_of::<S>())
            .sum()
    }
}

impl<S> FieldReader<S> for FieldStorage<S> {
    fn read(&self, field: FieldId) -> Option<&[S]> {
        self.buffers.get(field.index()).map(Vec::as_slice)
    }
}

/// Output buffers of the running evaluator, moved out of a [`FieldStorage`].
///
/// Only the fields taken are writable; any other id returns `None`.
#[derive(Debug)]
pub struct OutputSet<S> {
    fields: SmallVec<[(FieldId, Vec<S>); 4]>,
}

impl<S> OutputSet<S> {
    /// Number of writable fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field is writable.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<S> FieldWriter<S> for OutputSet<S> {
    fn write(&mut self, field: FieldId) -> Option<&mut [S]> {
        self.fields
            .iter_mut()
            .find(|(id, _)| *id == field)
            .map(|(_, buf)| buf.as_mut_slice())
    }
}
