//! Multidimensional field layouts and the canonical layout factory.
//!
//! A [`FieldLayout`] is an ordered list of `(Dim, extent)` pairs describing
//! a row-major array. When the leading dimension is [`Dim::Cell`] its extent
//! is the configured maximum batch size, and a workset with fewer cells only
//! uses the contiguous prefix `[0, cell_count * per_cell)` of the array.

use indexmap::IndexMap;
use smallvec::SmallVec;
use std::fmt;

/// Kind of a layout dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dim {
    /// Mesh cells in a workset (the batch dimension).
    Cell,
    /// Element nodes (basis functions) per cell.
    Node,
    /// Quadrature points per cell or per side.
    QuadPoint,
    /// Spatial or vector components.
    Dim,
    /// Geometric vertices per cell.
    Vertex,
    /// Local sides of a cell.
    Side,
    /// Faces of a cell.
    Face,
    /// Placeholder dimension for workset-global scalars.
    Dummy,
}

impl Dim {
    /// Short name used when rendering layouts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Cell => "Cell",
            Self::Node => "Node",
            Self::QuadPoint => "QuadPoint",
            Self::Dim => "Dim",
            Self::Vertex => "Vertex",
            Self::Side => "Side",
            Self::Face => "Face",
            Self::Dummy => "Dummy",
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shape of a field array: ordered dimension kinds with their extents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    dims: SmallVec<[(Dim, usize); 5]>,
}

impl FieldLayout {
    /// Create a layout from `(kind, extent)` pairs, outermost first.
    pub fn new(dims: &[(Dim, usize)]) -> Self {
        Self {
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// The `(kind, extent)` pairs, outermost first.
    pub fn dims(&self) -> &[(Dim, usize)] {
        &self.dims
    }

    /// Dimension kinds only, outermost first.
    pub fn kinds(&self) -> impl Iterator<Item = Dim> + '_ {
        self.dims.iter().map(|&(kind, _)| kind)
    }

    /// Extent of the dimension at `axis`, if it exists.
    pub fn extent(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).map(|&(_, n)| n)
    }

    /// Extent of the first dimension of the given kind.
    pub fn extent_of(&self, kind: Dim) -> Option<usize> {
        self.dims.iter().find(|(k, _)| *k == kind).map(|&(_, n)| n)
    }

    /// Extent of the `nth` (zero-based) dimension of the given kind.
    ///
    /// Tensor layouts repeat [`Dim::Dim`]; `nth_extent_of(Dim::Dim, 1)` is
    /// the second tensor index.
    pub fn nth_extent_of(&self, kind: Dim, nth: usize) -> Option<usize> {
        self.dims
            .iter()
            .filter(|(k, _)| *k == kind)
            .nth(nth)
            .map(|&(_, n)| n)
    }

    /// Total number of scalars in the array.
    pub fn size(&self) -> usize {
        self.dims.iter().map(|&(_, n)| n).product()
    }

    /// Whether the leading dimension is the cell batch.
    pub fn is_batched(&self) -> bool {
        matches!(self.dims.first(), Some((Dim::Cell, _)))
    }

    /// Scalars per cell (product of the extents after a leading `Cell`).
    ///
    /// For unbatched layouts this is the full size.
    pub fn per_cell(&self) -> usize {
        if self.is_batched() {
            self.dims[1..].iter().map(|&(_, n)| n).product()
        } else {
            self.size()
        }
    }

    /// Extent of the batch dimension, or `None` for unbatched layouts.
    pub fn batch_extent(&self) -> Option<usize> {
        if self.is_batched() {
            self.extent(0)
        } else {
            None
        }
    }

    /// Length of the prefix that a workset of `cell_count` cells uses.
    ///
    /// Unbatched layouts are always fully valid.
    pub fn valid_len(&self, cell_count: usize) -> usize {
        if self.is_batched() {
            cell_count.min(self.extent(0).unwrap_or(0)) * self.per_cell()
        } else {
            self.size()
        }
    }
}

impl fmt::Display for FieldLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<")?;
        for (i, (kind, n)) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{kind}:{n}")?;
        }
        f.write_str(">")
    }
}

// ── Layout factory ──────────────────────────────────────────────

/// Discretization sizes used to build the canonical [`Layouts`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutExtents {
    /// Maximum cells per workset.
    pub workset_size: usize,
    /// Geometric vertices per cell.
    pub vertices: usize,
    /// Nodes (basis functions) per cell.
    pub nodes: usize,
    /// Quadrature points per cell.
    pub qps: usize,
    /// Spatial dimension.
    pub dims: usize,
    /// Components of vector-valued unknowns; `None` means `dims`.
    pub vec_dim: Option<usize>,
    /// Faces per cell.
    pub faces: usize,
}

/// Canonical layouts shared by the evaluators of one problem.
///
/// `vector` layouts use the vector dimension and `gradient` layouts the
/// spatial dimension; when both agree the two families are identical.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct Layouts {
    pub node_scalar: FieldLayout,
    pub qp_scalar: FieldLayout,
    pub cell_scalar: FieldLayout,
    pub cell_scalar2: FieldLayout,
    pub face_scalar: FieldLayout,

    pub node_vector: FieldLayout,
    pub qp_vector: FieldLayout,
    pub cell_vector: FieldLayout,
    pub face_vector: FieldLayout,

    pub node_gradient: FieldLayout,
    pub qp_gradient: FieldLayout,
    pub cell_gradient: FieldLayout,
    pub face_gradient: FieldLayout,

    pub node_tensor: FieldLayout,
    pub qp_tensor: FieldLayout,
    pub cell_tensor: FieldLayout,
    pub face_tensor: FieldLayout,

    pub node_vecgradient: FieldLayout,
    pub qp_vecgradient: FieldLayout,
    pub cell_vecgradient: FieldLayout,
    pub face_vecgradient: FieldLayout,

    pub vertices_vector: FieldLayout,
    pub node_qp_scalar: FieldLayout,
    pub node_qp_gradient: FieldLayout,
    pub node_qp_vector: FieldLayout,

    pub workset_scalar: FieldLayout,
    pub workset_vector: FieldLayout,
    pub workset_gradient: FieldLayout,
    pub workset_tensor: FieldLayout,
    pub workset_vecgradient: FieldLayout,

    pub shared_param: FieldLayout,
    pub dummy: FieldLayout,

    /// Whether vector and gradient layouts coincide (`vec_dim == dims`).
    pub vector_and_gradient_equivalent: bool,
    /// Layouts of named side sets.
    pub side_sets: IndexMap<String, SideLayouts>,
}

impl Layouts {
    /// Build the canonical layouts for the given discretization sizes.
    pub fn new(ext: LayoutExtents) -> Self {
        use Dim::{Cell, Dummy, Face, Node, QuadPoint, Vertex};
        let ws = ext.workset_size;
        let nd = ext.dims;
        let vd = ext.vec_dim.unwrap_or(nd);
        let l = FieldLayout::new;

        Self {
            node_scalar: l(&[(Cell, ws), (Node, ext.nodes)]),
            qp_scalar: l(&[(Cell, ws), (QuadPoint, ext.qps)]),
            cell_scalar: l(&[(Cell, ws), (QuadPoint, 1)]),
            cell_scalar2: l(&[(Cell, ws)]),
            face_scalar: l(&[(Cell, ws), (Face, ext.faces)]),

            node_vector: l(&[(Cell, ws), (Node, ext.nodes), (Dim::Dim, vd)]),
            qp_vector: l(&[(Cell, ws), (QuadPoint, ext.qps), (Dim::Dim, vd)]),
            cell_vector: l(&[(Cell, ws), (Dim::Dim, vd)]),
            face_vector: l(&[(Cell, ws), (Face, ext.faces), (Dim::Dim, vd)]),

            node_gradient: l(&[(Cell, ws), (Node, ext.nodes), (Dim::Dim, nd)]),
            qp_gradient: l(&[(Cell, ws), (QuadPoint, ext.qps), (Dim::Dim, nd)]),
            cell_gradient: l(&[(Cell, ws), (Dim::Dim, nd)]),
            face_gradient: l(&[(Cell, ws), (Face, ext.faces), (Dim::Dim, nd)]),

            node_tensor: l(&[(Cell, ws), (Node, ext.nodes), (Dim::Dim, nd), (Dim::Dim, nd)]),
            qp_tensor: l(&[(Cell, ws), (QuadPoint, ext.qps), (Dim::Dim, nd), (Dim::Dim, nd)]),
            cell_tensor: l(&[(Cell, ws), (Dim::Dim, nd), (Dim::Dim, nd)]),
            face_tensor: l(&[(Cell, ws), (Face, ext.faces), (Dim::Dim, nd), (Dim::Dim, nd)]),

            node_vecgradient: l(&[(Cell, ws), (Node, ext.nodes), (Dim::Dim, vd), (Dim::Dim, nd)]),
            qp_vecgradient: l(&[(Cell, ws), (QuadPoint, ext.qps), (Dim::Dim, vd), (Dim::Dim, nd)]),
            cell_vecgradient: l(&[(Cell, ws), (Dim::Dim, vd), (Dim::Dim, nd)]),
            face_vecgradient: l(&[(Cell, ws), (Face, ext.faces), (Dim::Dim, vd), (Dim::Dim, nd)]),

            vertices_vector: l(&[(Cell, ws), (Vertex, ext.vertices), (Dim::Dim, nd)]),
            node_qp_scalar: l(&[(Cell, ws), (Node, ext.nodes), (QuadPoint, ext.qps)]),
            node_qp_gradient: l(&[
                (Cell, ws),
                (Node, ext.nodes),
                (QuadPoint, ext.qps),
                (Dim::Dim, nd),
            ]),
            node_qp_vector: l(&[
                (Cell, ws),
                (Node, ext.nodes),
                (QuadPoint, ext.qps),
                (Dim::Dim, nd),
            ]),

            workset_scalar: l(&[(Dummy, 1)]),
            workset_vector: l(&[(Dim::Dim, vd)]),
            workset_gradient: l(&[(Dim::Dim, nd)]),
            workset_tensor: l(&[(Dim::Dim, nd), (Dim::Dim, nd)]),
            workset_vecgradient: l(&[(Dim::Dim, vd), (Dim::Dim, nd)]),

            shared_param: l(&[(Dim::Dim, 1)]),
            dummy: l(&[(Dummy, 0)]),

            vector_and_gradient_equivalent: vd == nd,
            side_sets: IndexMap::new(),
        }
    }

    /// Attach the layouts of a named side set.
    pub fn with_side_set(mut self, name: impl Into<String>, side: SideLayouts) -> Self {
        self.side_sets.insert(name.into(), side);
        self
    }

    /// Layouts of a named side set.
    pub fn side_set(&self, name: &str) -> Option<&SideLayouts> {
        self.side_sets.get(name)
    }
}

/// Layouts of quantities evaluated on the sides of boundary cells.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct SideLayouts {
    pub qp_scalar: FieldLayout,
    pub qp_vector: FieldLayout,
    pub qp_gradient: FieldLayout,
    pub node_qp_scalar: FieldLayout,
    pub node_qp_gradient: FieldLayout,
}

impl SideLayouts {
    /// Build side layouts.
    ///
    /// `side_nodes` is the largest node count over all sides of the cell
    /// topology and `side_dim` the dimension of the side's reference
    /// element gradient (the spatial dimension of the parent cell).
    pub fn new(
        workset_size: usize,
        sides: usize,
        side_nodes: usize,
        side_qps: usize,
        dims: usize,
        vec_dim: Option<usize>,
    ) -> Self {
        use Dim::{Cell, QuadPoint, Side};
        let vd = vec_dim.unwrap_or(dims);
        let l = FieldLayout::new;
        Self {
            qp_scalar: l(&[(Cell, workset_size), (Side, sides), (QuadPoint, side_qps)]),
            qp_vector: l(&[
                (Cell, workset_size),
                (Side, sides),
                (QuadPoint, side_qps),
                (Dim::Dim, vd),
            ]),
            qp_gradient: l(&[
                (Cell, workset_size),
                (Side, sides),
                (QuadPoint, side_qps),
                (Dim::Dim, dims),
            ]),
            node_qp_scalar: l(&[
                (Cell, workset_size),
                (Side, sides),
                (Dim::Node, side_nodes),
                (QuadPoint, side_qps),
            ]),
            node_qp_gradient: l(&[
                (Cell, workset_size),
                (Side, sides),
                (Dim::Node, side_nodes),
                (QuadPoint, side_qps),
                (Dim::Dim, dims),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extents() -> LayoutExtents {
        LayoutExtents {
            workset_size: 4,
            vertices: 8,
            nodes: 8,
            qps: 8,
            dims: 3,
            vec_dim: None,
            faces: 6,
        }
    }

    #[test]
    fn qp_gradient_shape() {
        let l = Layouts::new(extents());
        assert_eq!(
            l.qp_gradient.dims(),
            &[(Dim::Cell, 4), (Dim::QuadPoint, 8), (Dim::Dim, 3)]
        );
        assert_eq!(l.qp_gradient.size(), 96);
        assert_eq!(l.qp_gradient.per_cell(), 24);
        assert_eq!(l.qp_gradient.to_string(), "<Cell:4,QuadPoint:8,Dim:3>");
    }

    #[test]
    fn vec_dim_defaults_to_spatial_dim() {
        let l = Layouts::new(extents());
        assert!(l.vector_and_gradient_equivalent);
        assert_eq!(l.node_vector, l.node_gradient);

        let l = Layouts::new(LayoutExtents {
            vec_dim: Some(2),
            ..extents()
        });
        assert!(!l.vector_and_gradient_equivalent);
        assert_eq!(l.node_vector.extent_of(Dim::Dim), Some(2));
        assert_eq!(l.node_gradient.extent_of(Dim::Dim), Some(3));
    }

    #[test]
    fn tensor_dims_are_addressable_individually() {
        let l = Layouts::new(LayoutExtents {
            vec_dim: Some(2),
            ..extents()
        });
        assert_eq!(l.qp_vecgradient.nth_extent_of(Dim::Dim, 0), Some(2));
        assert_eq!(l.qp_vecgradient.nth_extent_of(Dim::Dim, 1), Some(3));
        assert_eq!(l.qp_vecgradient.nth_extent_of(Dim::Dim, 2), None);
    }

    #[test]
    fn valid_len_covers_partial_batches() {
        let l = Layouts::new(extents());
        assert_eq!(l.node_scalar.valid_len(4), 32);
        assert_eq!(l.node_scalar.valid_len(3), 24);
        assert_eq!(l.node_scalar.valid_len(0), 0);
        assert_eq!(l.node_scalar.valid_len(9), 32);
    }

    #[test]
    fn workset_layouts_are_unbatched() {
        let l = Layouts::new(extents());
        assert!(!l.workset_scalar.is_batched());
        assert_eq!(l.workset_scalar.valid_len(1), 1);
        assert_eq!(l.workset_scalar.batch_extent(), None);
        assert_eq!(l.dummy.size(), 0);
        assert_eq!(l.cell_scalar2.batch_extent(), Some(4));
    }

    #[test]
    fn side_sets_are_attached_by_name() {
        let side = SideLayouts::new(4, 6, 4, 4, 3, None);
        let l = Layouts::new(extents()).with_side_set("basal", side.clone());
        assert_eq!(l.side_set("basal"), Some(&side));
        assert!(l.side_set("lateral").is_none());
        assert_eq!(
            side.node_qp_scalar.dims(),
            &[
                (Dim::Cell, 4),
                (Dim::Side, 6),
                (Dim::Node, 4),
                (Dim::QuadPoint, 4)
            ]
        );
    }
}
