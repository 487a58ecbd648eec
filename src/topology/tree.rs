//! The tree primitives the adaptation algorithms are written against.
//!
//! [`AdaptiveTree`] is the seam between the scheduling algorithms in
//! [`crate::adapt`] and a concrete hierarchical mesh such as
//! [`Forest`](crate::forest::Forest). It exposes topology queries, the two
//! topology mutations (graded refinement and predicate-driven coarsening),
//! the per-cell pinning flags and the field variables the cost export and
//! boundary-condition refresh need.

use crate::mesh_error::MeshAmrError;
use crate::topology::cell::CellId;

/// Decides which cells may be destroyed by [`AdaptiveTree::coarsen`] and is
/// told about every cell right before it is destroyed.
///
/// Both callbacks live on one object so that they can share mutable state
/// (scratch slots, candidate queues, counters).
pub trait CoarsenVisitor<T: ?Sized> {
    /// Returns `true` if `cell` may disappear (as a child) or become a leaf
    /// (as a parent).
    fn coarsenable(&mut self, tree: &T, cell: CellId) -> bool;

    /// Called once for every cell that is about to be destroyed.
    fn cleanup(&mut self, _tree: &T, _cell: CellId) {}
}

/// Hierarchical mesh with `2^D` children per split cell.
///
/// Handles passed to the query methods must be live (see
/// [`contains`](AdaptiveTree::contains)); implementations panic on stale
/// handles.
pub trait AdaptiveTree {
    /// Number of children created by one split (`2^D`).
    const CHILDREN: usize;
    /// Number of face neighbors of a cell (`2D`).
    const FACES: usize;

    /// Returns `true` if `cell` refers to a live cell.
    fn contains(&self, cell: CellId) -> bool;
    fn is_leaf(&self, cell: CellId) -> bool;
    fn level(&self, cell: CellId) -> u32;
    /// Deepest leaf level in the subtree rooted at `cell`.
    fn depth_below(&self, cell: CellId) -> u32;
    fn parent(&self, cell: CellId) -> Option<CellId>;
    fn children(&self, cell: CellId) -> &[CellId];
    /// Face neighbor in `direction` (`2*axis` is `+axis`, `2*axis + 1` is
    /// `-axis`): the same-level cell if it exists, otherwise the coarser leaf
    /// covering that region, or `None` across a non-periodic domain edge.
    fn neighbor(&self, cell: CellId, direction: usize) -> Option<CellId>;
    /// Same-level face neighbors only.
    fn same_level_neighbors(&self, cell: CellId) -> Vec<CellId> {
        let level = self.level(cell);
        (0..Self::FACES)
            .filter_map(|dir| self.neighbor(cell, dir))
            .filter(|n| self.level(*n) == level)
            .collect()
    }
    fn is_boundary(&self, cell: CellId) -> bool;
    fn is_permanent(&self, cell: CellId) -> bool;
    fn set_permanent(&mut self, cell: CellId, permanent: bool);

    /// Roots of the independent spatial partitions (root boxes).
    fn roots(&self) -> Vec<CellId>;
    /// All live cells in pre-order.
    fn cells(&self) -> Vec<CellId>;
    /// Leaves in pre-order.
    fn leaves(&self) -> Vec<CellId> {
        self.cells()
            .into_iter()
            .filter(|c| self.is_leaf(*c))
            .collect()
    }
    /// Cells of one level in pre-order.
    fn cells_at_level(&self, level: u32) -> Vec<CellId> {
        self.cells()
            .into_iter()
            .filter(|c| self.level(*c) == level)
            .collect()
    }
    fn leaf_count(&self) -> usize;
    /// Deepest leaf level of the whole tree.
    fn depth(&self) -> u32;
    /// Upper bound (exclusive) of [`CellId::slot`] for live cells.
    fn slot_capacity(&self) -> usize;

    /// Splits a leaf into `CHILDREN` leaves without any grading pre-pass.
    fn refine_single(&mut self, cell: CellId);
    /// Splits `cell` after splitting every coarser face/corner neighbor leaf
    /// that would otherwise end up two levels apart from the new children.
    /// Returns every split cell, pre-pass splits first.
    fn refine_with_corner_grading(&mut self, cell: CellId) -> Vec<CellId>;
    /// Leaves `refine_with_corner_grading(cell)` would add, cascade included.
    /// Zero for a non-leaf.
    fn refine_growth(&self, cell: CellId) -> usize;
    /// Returns `true` if `cell` is a leaf touching a same-level neighbor whose
    /// children adjacent to `cell` are themselves split.
    fn needs_corner_refinement(&self, cell: CellId) -> bool;
    /// Bottom-up coarsening of the subtree rooted at `root`. A parent is
    /// collapsed when all of its children ended up as coarsenable leaves, the
    /// parent itself is coarsenable and the collapse keeps 2:1 grading.
    /// Returns `true` if `root` is a coarsenable leaf afterwards.
    fn coarsen(&mut self, root: CellId, visitor: &mut dyn CoarsenVisitor<Self>) -> bool;

    /// Names of the registered field variables.
    fn variable_names(&self) -> Vec<String>;
    /// Registers `name` (if missing) as a variable without fine→coarse
    /// transfer, suitable for exporting diagnostics.
    fn ensure_export_variable(&mut self, name: &str, description: &str)
    -> Result<(), MeshAmrError>;
    fn set_value(&mut self, name: &str, cell: CellId, value: f64) -> Result<(), MeshAmrError>;
}
