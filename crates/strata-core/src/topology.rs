//! Reference cell topologies and their side-to-node maps.
//!
//! Side node lists follow the usual counter-clockwise (outward normal)
//! ordering of the reference element. Sides of one cell may have
//! different node counts, as on a wedge.

/// Topology of a reference cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CellTopology {
    name: &'static str,
    nodes: usize,
    dimension: usize,
    sides: Vec<Vec<usize>>,
}

impl CellTopology {
    fn new(name: &'static str, nodes: usize, dimension: usize, sides: &[&[usize]]) -> Self {
        Self {
            name,
            nodes,
            dimension,
            sides: sides.iter().map(|s| s.to_vec()).collect(),
        }
    }

    /// Two-node line segment.
    pub fn line2() -> Self {
        Self::new("Line2", 2, 1, &[&[0], &[1]])
    }

    /// Three-node triangle.
    pub fn tri3() -> Self {
        Self::new("Triangle3", 3, 2, &[&[0, 1], &[1, 2], &[2, 0]])
    }

    /// Four-node quadrilateral.
    pub fn quad4() -> Self {
        Self::new("Quadrilateral4", 4, 2, &[&[0, 1], &[1, 2], &[2, 3], &[3, 0]])
    }

    /// Four-node tetrahedron.
    pub fn tet4() -> Self {
        Self::new(
            "Tetrahedron4",
            4,
            3,
            &[&[0, 1, 3], &[1, 2, 3], &[0, 3, 2], &[0, 2, 1]],
        )
    }

    /// Eight-node hexahedron.
    pub fn hex8() -> Self {
        Self::new(
            "Hexahedron8",
            8,
            3,
            &[
                &[0, 1, 5, 4],
                &[1, 2, 6, 5],
                &[2, 3, 7, 6],
                &[0, 4, 7, 3],
                &[0, 3, 2, 1],
                &[4, 5, 6, 7],
            ],
        )
    }

    /// Six-node wedge: three quadrilateral sides, then two triangles.
    pub fn wedge6() -> Self {
        Self::new(
            "Wedge6",
            6,
            3,
            &[
                &[0, 1, 4, 3],
                &[1, 2, 5, 4],
                &[0, 3, 5, 2],
                &[0, 2, 1],
                &[3, 4, 5],
            ],
        )
    }

    /// Topology name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Nodes per cell.
    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Spatial dimension of the cell.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Dimension of the sides.
    pub fn side_dimension(&self) -> usize {
        self.dimension.saturating_sub(1)
    }

    /// Number of sides.
    pub fn side_count(&self) -> usize {
        self.sides.len()
    }

    /// Cell-local node indices of one side, or `None` if out of range.
    pub fn side_nodes(&self, side: usize) -> Option<&[usize]> {
        self.sides.get(side).map(Vec::as_slice)
    }

    /// The largest node count over all sides.
    pub fn max_side_nodes(&self) -> usize {
        self.sides.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// The full side-to-node map.
    pub fn side_node_map(&self) -> &[Vec<usize>] {
        &self.sides
    }
}
