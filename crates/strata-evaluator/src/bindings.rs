//! Field handles handed to evaluators at setup.

use strata_core::{ConfigError, Dim, FieldId, FieldLayout, FieldRegistry, FieldTag};

/// Non-owning reference to a field's storage, valid for the compiled
/// graph that issued it.
///
/// Carries enough layout information to compute the valid range of the
/// field for any workset size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldHandle {
    id: FieldId,
    per_cell: usize,
    len: usize,
    batched: bool,
}

impl FieldHandle {
    /// Create a handle for a field with the given id and layout.
    pub fn new(id: FieldId, layout: &FieldLayout) -> Self {
        Self {
            id,
            per_cell: layout.per_cell(),
            len: layout.size(),
            batched: layout.is_batched(),
        }
    }

    /// The storage id.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Scalars per cell.
    pub fn per_cell(&self) -> usize {
        self.per_cell
    }

    /// Full storage length (at the maximum batch size).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the storage is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the leading dimension is the cell batch.
    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// Length of the prefix valid for a workset of `cell_count` cells.
    pub fn valid_len(&self, cell_count: usize) -> usize {
        if self.batched {
            (cell_count * self.per_cell).min(self.len)
        } else {
            self.len
        }
    }
}

/// Resolves an evaluator's declared tags to handles and extents.
pub struct FieldBindings<'a> {
    evaluator: &'a str,
    registry: &'a FieldRegistry,
}

impl<'a> FieldBindings<'a> {
    /// Bindings for `evaluator` over the fields of `registry`.
    pub fn new(evaluator: &'a str, registry: &'a FieldRegistry) -> Self {
        Self {
            evaluator,
            registry,
        }
    }

    /// Name of the evaluator being set up.
    pub fn evaluator(&self) -> &str {
        self.evaluator
    }

    /// Bind a declared field.
    pub fn bind(&self, tag: &FieldTag) -> Result<FieldHandle, ConfigError> {
        let id = self
            .registry
            .get(tag)
            .ok_or_else(|| ConfigError::UnboundField {
                evaluator: self.evaluator.to_string(),
                field: tag.to_string(),
            })?;
        Ok(FieldHandle::new(id, tag.layout()))
    }

    /// Bind an optional field; `None` stays `None`.
    pub fn bind_opt(&self, tag: Option<&FieldTag>) -> Result<Option<FieldHandle>, ConfigError> {
        tag.map(|t| self.bind(t)).transpose()
    }

    /// Extent of the first dimension of kind `dim` in `tag`'s layout.
    pub fn extent(&self, tag: &FieldTag, dim: Dim) -> Result<usize, ConfigError> {
        self.nth_extent(tag, dim, 0)
    }

    /// Extent of the `nth` dimension of kind `dim` in `tag`'s layout.
    pub fn nth_extent(&self, tag: &FieldTag, dim: Dim, nth: usize) -> Result<usize, ConfigError> {
        tag.layout()
            .nth_extent_of(dim, nth)
            .ok_or_else(|| ConfigError::MissingDimension {
                evaluator: self.evaluator.to_string(),
                field: tag.to_string(),
                dim: if nth == 0 {
                    dim.to_string()
                } else {
                    format!("{dim}#{nth}")
                },
            })
    }

    /// Check that `tag` has a `dim` dimension of the expected extent.
    pub fn expect_extent(&self, tag: &FieldTag, dim: Dim, expected: usize) -> Result<(), ConfigError> {
        let found = self.extent(tag, dim)?;
        if found != expected {
            return Err(ConfigError::InconsistentLayout {
                evaluator: self.evaluator.to_string(),
                field: tag.to_string(),
                expected: format!("{dim} extent {expected}"),
                found: format!("{dim} extent {found}"),
            });
        }
        Ok(())
    }

    /// Check that `tag` has exactly the given dimension kinds, in order.
    pub fn expect_kinds(&self, tag: &FieldTag, kinds: &[Dim]) -> Result<(), ConfigError> {
        if tag.layout().kinds().eq(kinds.iter().copied()) {
            return Ok(());
        }
        let expected = kinds
            .iter()
            .map(|d| d.label())
            .collect::<Vec<_>>()
            .join(",");
        Err(ConfigError::InconsistentLayout {
            evaluator: self.evaluator.to_string(),
            field: tag.to_string(),
            expected: format!("<{expected}>"),
            found: tag.layout().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qp_gradient() -> FieldTag {
        FieldTag::new(
            "T_grad",
            FieldLayout::new(&[(Dim::Cell, 4), (Dim::QuadPoint, 2), (Dim::Dim, 3)]),
        )
    }

    #[test]
    fn handle_valid_len_tracks_cell_count() {
        let tag = qp_gradient();
        let h = FieldHandle::new(FieldId(0), tag.layout());
        assert_eq!(h.len(), 24);
        assert_eq!(h.per_cell(), 6);
        assert_eq!(h.valid_len(4), 24);
        assert_eq!(h.valid_len(1), 6);
        assert_eq!(h.valid_len(10), 24);
    }

    #[test]
    fn unbound_field_is_reported() {
        let registry = FieldRegistry::new();
        let b = FieldBindings::new("flux", &registry);
        match b.bind(&qp_gradient()) {
            Err(ConfigError::UnboundField { evaluator, field }) => {
                assert_eq!(evaluator, "flux");
                assert_eq!(field, "T_grad<Cell:4,QuadPoint:2,Dim:3>");
            }
            other => panic!("expected UnboundField, got {other:?}"),
        }
    }

    #[test]
    fn extents_and_missing_dimensions() {
        let mut registry = FieldRegistry::new();
        let tag = qp_gradient();
        registry.intern(&tag);
        let b = FieldBindings::new("flux", &registry);
        assert_eq!(b.bind(&tag).map(|h| h.id()), Ok(FieldId(0)));
        assert_eq!(b.extent(&tag, Dim::Dim), Ok(3));
        assert!(b.expect_extent(&tag, Dim::QuadPoint, 2).is_ok());
        assert!(matches!(
            b.expect_extent(&tag, Dim::QuadPoint, 3),
            Err(ConfigError::InconsistentLayout { .. })
        ));
        assert!(matches!(
            b.extent(&tag, Dim::Node),
            Err(ConfigError::MissingDimension { .. })
        ));
        assert!(b
            .expect_kinds(&tag, &[Dim::Cell, Dim::QuadPoint, Dim::Dim])
            .is_ok());
        assert!(b.expect_kinds(&tag, &[Dim::Cell, Dim::QuadPoint]).is_err());
    }
}
